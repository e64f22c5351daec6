// ABOUTME: Main library entry point for the RunBase reconciliation engine
// ABOUTME: Matches multi-source run records, resolves canonical fields, and enriches intervals
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

#![deny(unsafe_code)]

//! # RunBase
//!
//! Consolidates workout records from a wearable file feed, a social fitness
//! API, and a hand-kept training log into one deduplicated timeline of
//! canonical activities, then derives per-repetition intervals from laps and
//! telemetry.
//!
//! ## Architecture
//!
//! - **Matcher**: links raw records to activities by date and distance
//! - **Resolver**: one value per field by configured source priority, with
//!   conflicts when sources disagree beyond tolerance
//! - **Enrichment**: ordered stages turning laps and GPS into interval rows
//! - **Pipeline**: one retried transaction per activity, non-fatal issues
//!   collected in a run report
//! - **Review**: overrides, interval corrections, conflict resolution
//!
//! Pure algorithms (name parsing, VDOT, geometry) live in
//! `runbase-intelligence`; errors and models in `runbase-core`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use runbase::config::RunbaseConfig;
//! use runbase::database::Database;
//! use runbase::pipeline::{ReconcileOptions, ReconcilePipeline};
//! use runbase_core::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = RunbaseConfig::load(None)?;
//!     let db = Database::new(&config.database_url).await?;
//!     let report = ReconcilePipeline::new(db, config)
//!         .run(ReconcileOptions::default())
//!         .await?;
//!     println!("{} activities processed", report.activities_processed);
//!     Ok(())
//! }
//! ```

/// HTTP fallback workout classifier
pub mod classifier_http;

/// YAML configuration with environment overrides
pub mod config;

/// `SQLite` store
pub mod database;

/// Enrichment stages and interval persistence
pub mod enrichment;

/// Non-fatal reconciliation issues
pub mod issues;

/// Structured logging setup
pub mod logging;

/// Record-to-activity matching
pub mod matcher;

/// Reconciliation run driver
pub mod pipeline;

/// Canonical field resolution and conflicts
pub mod resolver;

/// Reviewer reads and corrections
pub mod review;
