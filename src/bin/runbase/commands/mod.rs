// ABOUTME: Command handlers for the runbase CLI
// ABOUTME: Store management, ingestion, reconciliation runs, reviewer actions, and effort rankings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

pub mod conflicts;
pub mod db;
pub mod fastest;
pub mod ingest;
pub mod overrides;
pub mod reconcile;
pub mod vdot;

use runbase::config::RunbaseConfig;
use runbase::database::Database;
use runbase::review::ReviewService;

/// Review service over the opened store
pub fn review_service(database: Database, config: RunbaseConfig) -> ReviewService {
    ReviewService::new(database, config)
}
