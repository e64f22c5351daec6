// ABOUTME: Ingest command for the runbase CLI
// ABOUTME: Reads a JSON array of record bundles and stores each one idempotently
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use std::path::Path;

use runbase::database::{Database, IngestOutcome};
use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::RecordBundle;
use tokio::fs;
use tracing::{info, warn};

/// Store every bundle in `file`
pub async fn run(database: &Database, file: &Path) -> AppResult<()> {
    let content = fs::read_to_string(file)
        .await
        .map_err(|e| AppError::invalid_input(format!("Failed to read {}: {e}", file.display())))?;
    let bundles: Vec<RecordBundle> = serde_json::from_str(&content)?;
    info!(file = %file.display(), bundles = bundles.len(), "Ingesting records");

    let (mut inserted, mut updated, mut unchanged) = (0_usize, 0_usize, 0_usize);
    for bundle in &bundles {
        match database.upsert_raw_record(bundle).await? {
            IngestOutcome::Inserted(_) => inserted += 1,
            IngestOutcome::Updated(_) => updated += 1,
            IngestOutcome::Unchanged(id) => {
                warn!(
                    record_id = %id,
                    external_id = %bundle.record.external_id,
                    "Record already linked; re-import ignored"
                );
                unchanged += 1;
            }
        }
    }

    println!(
        "Ingested {} records: {inserted} new, {updated} updated, {unchanged} unchanged",
        bundles.len()
    );
    Ok(())
}
