// ABOUTME: Dated VDOT history and the fallback classifier verdict cache
// ABOUTME: Effective-VDOT lookup by date and name-keyed verdict reuse across runs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use chrono::{NaiveDate, Utc};
use runbase_core::errors::AppResult;
use runbase_core::models::VdotEntry;
use runbase_intelligence::ClassifierVerdict;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::storage_error;

fn row_to_entry(row: &SqliteRow) -> VdotEntry {
    VdotEntry {
        effective_date: row.get("effective_date"),
        vdot: row.get("vdot"),
        source: row.get("source"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

/// Append a VDOT entry
///
/// # Errors
///
/// Returns an error if the insert fails
pub async fn insert_vdot(conn: &mut SqliteConnection, entry: &VdotEntry) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO vdot_history (effective_date, vdot, source, notes, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )
    .bind(entry.effective_date)
    .bind(entry.vdot)
    .bind(&entry.source)
    .bind(&entry.notes)
    .bind(entry.created_at)
    .execute(conn)
    .await
    .map_err(|e| storage_error("Failed to store VDOT entry", &e))?;
    Ok(())
}

/// Latest entry effective on or before `date`
///
/// Entries sharing an effective date resolve to the most recently stored one.
///
/// # Errors
///
/// Returns an error if the query fails
pub async fn vdot_on(conn: &mut SqliteConnection, date: NaiveDate) -> AppResult<Option<VdotEntry>> {
    let row = sqlx::query(
        r"
        SELECT effective_date, vdot, source, notes, created_at
        FROM vdot_history WHERE effective_date <= ?1
        ORDER BY effective_date DESC, id DESC LIMIT 1
        ",
    )
    .bind(date)
    .fetch_optional(conn)
    .await
    .map_err(|e| storage_error("Failed to look up VDOT", &e))?;
    Ok(row.as_ref().map(row_to_entry))
}

/// Full history, oldest first
///
/// # Errors
///
/// Returns an error if the query fails
pub async fn vdot_history(conn: &mut SqliteConnection) -> AppResult<Vec<VdotEntry>> {
    let rows = sqlx::query(
        "SELECT effective_date, vdot, source, notes, created_at FROM vdot_history ORDER BY effective_date, id",
    )
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list VDOT history", &e))?;
    Ok(rows.iter().map(row_to_entry).collect())
}

/// Cache key for a workout title: lowercase with collapsed whitespace
#[must_use]
pub fn name_cache_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cached classifier verdict for a title
///
/// The outer `Option` is whether the title was ever classified; the inner one
/// is the verdict (the classifier may have had no answer).
///
/// # Errors
///
/// Returns an error if the query fails or the stored verdict is corrupt
pub async fn cached_verdict(
    conn: &mut SqliteConnection,
    name: &str,
) -> AppResult<Option<Option<ClassifierVerdict>>> {
    let row = sqlx::query("SELECT verdict FROM workout_name_cache WHERE name_key = ?1")
        .bind(name_cache_key(name))
        .fetch_optional(conn)
        .await
        .map_err(|e| storage_error("Failed to read classifier cache", &e))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let verdict: Option<String> = row.get("verdict");
    Ok(Some(
        verdict
            .as_deref()
            .map(serde_json::from_str::<ClassifierVerdict>)
            .transpose()?,
    ))
}

/// Remember a classifier verdict for a title
///
/// An existing entry is kept so every later run sees the first verdict.
///
/// # Errors
///
/// Returns an error if serialization or the write fails
pub async fn store_verdict(
    conn: &mut SqliteConnection,
    name: &str,
    verdict: Option<&ClassifierVerdict>,
    classifier: &str,
) -> AppResult<()> {
    let verdict = verdict.map(serde_json::to_string).transpose()?;
    sqlx::query(
        r"
        INSERT INTO workout_name_cache (name_key, verdict, classifier, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(name_key) DO NOTHING
        ",
    )
    .bind(name_cache_key(name))
    .bind(verdict)
    .bind(classifier)
    .bind(Utc::now())
    .execute(conn)
    .await
    .map_err(|e| storage_error("Failed to store classifier verdict", &e))?;
    Ok(())
}
