// ABOUTME: Reconcile command for the runbase CLI
// ABOUTME: Wires the optional HTTP classifier into the pipeline and prints the run report
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use std::sync::Arc;

use chrono::NaiveDate;
use runbase::classifier_http::HttpWorkoutClassifier;
use runbase::config::RunbaseConfig;
use runbase::database::Database;
use runbase::pipeline::{ReconcileOptions, ReconcilePipeline, RunReport};
use runbase_core::errors::{AppError, AppResult};
use tracing::info;

use crate::helpers::display::display_run_report;

/// Run one reconciliation pass over the date window
pub async fn run(
    database: Database,
    config: RunbaseConfig,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    json: bool,
) -> AppResult<RunReport> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::invalid_input(format!(
                "--from {from} is after --to {to}"
            )));
        }
    }

    let classifier = HttpWorkoutClassifier::from_config(&config.classifier)?;
    let mut pipeline = ReconcilePipeline::new(database, config);
    if let Some(classifier) = classifier {
        info!("Fallback workout classifier enabled");
        pipeline = pipeline.with_classifier(Arc::new(classifier));
    }

    let report = pipeline.run(ReconcileOptions { from, to }).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_run_report(&report);
    }
    Ok(report)
}
