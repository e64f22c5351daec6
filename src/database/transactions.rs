// ABOUTME: Per-activity transaction guard and lock-contention retry for the SQLite store
// ABOUTME: Uncommitted guards roll back on drop; only SQLITE_BUSY / SQLITE_LOCKED failures are retried
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! Transaction management with RAII guards and retry patterns
//!
//! Each canonical activity is matched, resolved, and enriched inside one
//! transaction. If any step fails the guard is dropped without a commit and
//! the activity's writes are rolled back, leaving earlier activities intact.
//!
//! ```text
//! let mut guard = db.begin().await?;
//! records::link_record(guard.executor()?, record_id, activity_id).await?;
//! intervals::upsert_interval(guard.executor()?, &row).await?;
//! guard.commit().await?;
//! ```

use std::future::Future;
use std::time::Duration;

use runbase_core::errors::{AppError, AppResult, ErrorCode};
use sqlx::{Error as SqlxError, Sqlite, SqliteConnection, Transaction};
use tokio::time::sleep;
use tracing::{debug, warn};

/// `SQLITE_BUSY`
const SQLITE_BUSY: i32 = 5;
/// `SQLITE_LOCKED`
const SQLITE_LOCKED: i32 = 6;
const BASE_BACKOFF_MS: u64 = 20;

/// Convert a `SQLx` failure into an `AppError`
///
/// Lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED` and their extended codes)
/// and pool timeouts become `ResourceLocked`; everything else is a
/// `DatabaseError`.
pub fn storage_error(context: &str, e: &SqlxError) -> AppError {
    let message = format!("{context}: {e}");
    if is_lock_contention(e) {
        AppError::new(ErrorCode::ResourceLocked, message)
    } else {
        AppError::database(message)
    }
}

fn is_lock_contention(e: &SqlxError) -> bool {
    match e {
        SqlxError::PoolTimedOut => true,
        SqlxError::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    }
}

/// Run `f`, retrying while it fails with `ResourceLocked`
///
/// Backoff doubles from 20ms. Any other error is returned at once.
///
/// # Errors
///
/// Returns the first non-lock error, or the last lock error once
/// `max_attempts` attempts have been made
pub async fn retry_transaction<F, Fut, T>(mut f: F, max_attempts: u32) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Err(e) if e.code == ErrorCode::ResourceLocked && attempt < max_attempts => {
                let backoff_ms = BASE_BACKOFF_MS << (attempt - 1);
                warn!(attempt, max_attempts, backoff_ms, error = %e, "Store busy, retrying");
                sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Transaction that rolls back unless [`commit`](Self::commit) is called
///
/// `SQLx` issues the rollback when the inner `Transaction` drops.
pub struct SqliteTransactionGuard<'c> {
    transaction: Option<Transaction<'c, Sqlite>>,
}

impl<'c> SqliteTransactionGuard<'c> {
    /// Wrap a transaction obtained from `pool.begin()`
    #[must_use]
    pub fn new(transaction: Transaction<'c, Sqlite>) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }

    /// Commit the transaction and consume the guard
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails
    pub async fn commit(mut self) -> AppResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;
        tx.commit()
            .await
            .map_err(|e| storage_error("Transaction commit failed", &e))?;
        debug!("Transaction committed");
        Ok(())
    }

    /// Connection to run queries on inside the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the guard was already committed
    pub fn executor(&mut self) -> AppResult<&mut SqliteConnection> {
        self.transaction
            .as_deref_mut()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))
    }
}

impl Drop for SqliteTransactionGuard<'_> {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            debug!("Transaction dropped without commit, rolling back");
        }
    }
}
