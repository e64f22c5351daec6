// ABOUTME: Store management commands for the runbase CLI
// ABOUTME: Schema initialization and the status overview
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase::database::Database;
use runbase::review::ReviewService;
use runbase_core::errors::AppResult;
use tracing::info;

use crate::helpers::display::display_status;

/// Create the schema
///
/// Opening the store already runs the migrations; running them again is a no-op.
pub async fn init(database: &Database) -> AppResult<()> {
    database.migrate().await?;
    info!("Database initialized");
    println!("Database schema is up to date");
    Ok(())
}

/// Print counts of records, activities, conflicts, and tracks
pub async fn status(review: &ReviewService) -> AppResult<()> {
    let status = review.status().await?;
    display_status(&status);
    Ok(())
}
