// ABOUTME: SQLite store for raw records, canonical activities, conflicts, intervals, and fitness history
// ABOUTME: Connection pool setup, schema migration, and shared row decoding helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Database Management
//!
//! `Database` owns the `SQLx` pool and creates the schema. Queries live in the
//! per-table modules as free functions over `&mut SqliteConnection`, so the
//! same function runs on a pooled connection or inside a
//! [`transactions::SqliteTransactionGuard`].

/// Canonical activities and sticky field overrides
pub mod activities;
/// Field conflicts
pub mod conflicts;
/// VDOT history and the fallback classifier cache
pub mod fitness;
/// Interval rows
pub mod intervals;
/// Raw source records, laps, and telemetry
pub mod records;
/// Detected track registry
pub mod tracks;
/// Transaction guard, lock-aware retry, and `SQLx` error mapping
pub mod transactions;

use std::str::FromStr;
use std::time::Instant;

use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::RecordBundle;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::logging::AppLogger;
pub use records::IngestOutcome;
pub use transactions::{retry_transaction, storage_error, SqliteTransactionGuard};

/// Database manager for the reconciliation store
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if needed) the database and run migrations
    ///
    /// In-memory URLs get a single long-lived connection so every query sees
    /// the same database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the migrations fail
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let connected = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await
        } else {
            // Ensure SQLite creates the database file if it doesn't exist
            let connection_options =
                if database_url.starts_with("sqlite:") && !database_url.contains('?') {
                    format!("{database_url}?mode=rwc")
                } else {
                    database_url.to_owned()
                };
            SqlitePool::connect(&connection_options).await
        };
        let pool = connected
            .map_err(|e| storage_error(&format!("Failed to open database {database_url}"), &e))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Check out a pooled connection
    ///
    /// # Errors
    ///
    /// Returns an error if no connection becomes available
    pub async fn acquire(&self) -> AppResult<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| storage_error("Failed to acquire connection", &e))
    }

    /// Start a transaction that rolls back unless committed
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started
    pub async fn begin(&self) -> AppResult<SqliteTransactionGuard<'static>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", &e))?;
        Ok(SqliteTransactionGuard::new(tx))
    }

    /// Store one ingested record with its laps and telemetry
    ///
    /// Re-ingesting an unlinked record replaces it in place; a record already
    /// linked to an activity is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; nothing is stored in that case
    pub async fn upsert_raw_record(&self, bundle: &RecordBundle) -> AppResult<IngestOutcome> {
        let started = Instant::now();
        let mut guard = self.begin().await?;
        let outcome = records::upsert_bundle(guard.executor()?, bundle).await?;
        guard.commit().await?;
        AppLogger::log_database_operation(
            outcome.as_str(),
            "raw_records",
            true,
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        );
        Ok(outcome)
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any schema statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_records().await?;
        self.migrate_activities().await?;
        self.migrate_intervals().await?;
        self.migrate_fitness().await?;
        info!("Database schema ready");
        Ok(())
    }

    async fn execute_schema(&self, statements: &[&str]) -> AppResult<()> {
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("Migration failed", &e))?;
        }
        Ok(())
    }

    async fn migrate_records(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS raw_records (
                id TEXT PRIMARY KEY,
                origin TEXT NOT NULL,
                external_id TEXT NOT NULL,
                activity_id TEXT REFERENCES activities(id),
                date TEXT,
                start_time TEXT,
                distance_m REAL,
                duration_s REAL,
                avg_hr REAL,
                max_hr REAL,
                avg_cadence REAL,
                total_ascent_m REAL,
                calories REAL,
                workout_name TEXT,
                workout_type TEXT,
                notes TEXT,
                shoe_ref TEXT,
                telemetry_ref TEXT,
                imported_at TEXT NOT NULL,
                UNIQUE(origin, external_id)
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_raw_records_activity ON raw_records(activity_id)",
            r"
            CREATE TABLE IF NOT EXISTS source_laps (
                record_id TEXT NOT NULL REFERENCES raw_records(id) ON DELETE CASCADE,
                lap_index INTEGER NOT NULL,
                distance_m REAL,
                duration_s REAL,
                avg_hr REAL,
                max_hr REAL,
                avg_cadence REAL,
                start_offset_s REAL,
                end_offset_s REAL,
                is_rest INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (record_id, lap_index)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS telemetry (
                record_id TEXT NOT NULL REFERENCES raw_records(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                offset_s REAL NOT NULL,
                lat REAL,
                lon REAL,
                distance_m REAL,
                heart_rate REAL,
                cadence REAL,
                speed_mps REAL,
                PRIMARY KEY (record_id, seq)
            )
            ",
        ])
        .await
    }

    async fn migrate_activities(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                start_time TEXT,
                distance_m REAL,
                duration_s REAL,
                pace_s_per_km REAL,
                avg_hr REAL,
                max_hr REAL,
                avg_cadence REAL,
                total_ascent_m REAL,
                calories REAL,
                workout_type TEXT,
                workout_name TEXT,
                notes TEXT,
                shoe_ref TEXT,
                adjusted_distance_m REAL,
                vdot_snapshot REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_activities_date ON activities(date)",
            r"
            CREATE TABLE IF NOT EXISTS activity_overrides (
                activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (activity_id, field)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS conflicts (
                id TEXT PRIMARY KEY,
                activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
                field TEXT NOT NULL,
                source_values TEXT NOT NULL,
                status TEXT NOT NULL,
                winning_origin TEXT,
                winning_value TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(activity_id, field)
            )
            ",
        ])
        .await
    }

    async fn migrate_intervals(&self) -> AppResult<()> {
        self.execute_schema(&[r"
            CREATE TABLE IF NOT EXISTS intervals (
                activity_id TEXT NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
                rep_number INTEGER NOT NULL,
                set_number INTEGER,
                provenance TEXT NOT NULL,
                source_record_id TEXT,
                start_offset_s REAL,
                end_offset_s REAL,
                gps_distance_m REAL,
                prescribed_distance_m REAL,
                canonical_distance_m REAL,
                duration_s REAL,
                pace_s_per_km REAL,
                avg_hr REAL,
                max_hr REAL,
                avg_cadence REAL,
                pace_zone TEXT,
                flags INTEGER NOT NULL DEFAULT 0,
                location_type TEXT NOT NULL DEFAULT 'unknown',
                location_name TEXT,
                PRIMARY KEY (activity_id, rep_number)
            )
            "])
        .await
    }

    async fn migrate_fitness(&self) -> AppResult<()> {
        self.execute_schema(&[
            r"
            CREATE TABLE IF NOT EXISTS detected_tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                orientation_deg REAL NOT NULL,
                fit_score REAL NOT NULL,
                confidence REAL NOT NULL,
                detected_by_activity_id TEXT,
                detected_at TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS vdot_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                effective_date TEXT NOT NULL,
                vdot REAL NOT NULL,
                source TEXT NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_vdot_history_date ON vdot_history(effective_date)",
            r"
            CREATE TABLE IF NOT EXISTS workout_name_cache (
                name_key TEXT PRIMARY KEY,
                verdict TEXT,
                classifier TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        ])
        .await
    }
}

/// Decode a stored UUID
pub(crate) fn parse_uuid(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| AppError::database(format!("Invalid UUID '{raw}' in storage: {e}")))
}

/// Decode a nullable stored UUID
pub(crate) fn parse_optional_uuid(raw: Option<String>) -> AppResult<Option<Uuid>> {
    raw.as_deref().map(parse_uuid).transpose()
}

/// Decode a stored enum tag
pub(crate) fn parse_tag<T>(raw: &str) -> AppResult<T>
where
    T: FromStr<Err = AppError>,
{
    raw.parse::<T>()
        .map_err(|e| AppError::database(format!("Corrupt value in storage: {}", e.message)))
}

/// Decode a stored non-negative integer
pub(crate) fn to_u32(raw: i64, column: &str) -> AppResult<u32> {
    u32::try_from(raw)
        .map_err(|_| AppError::database(format!("Column {column} out of range: {raw}")))
}
