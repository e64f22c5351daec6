// ABOUTME: Field conflict rows keyed by activity and field
// ABOUTME: In-place upsert so re-runs never duplicate a conflict, plus review queries and resolution
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use chrono::Utc;
use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::{ActivityField, Conflict, ConflictStatus, FieldValue, SourceOrigin, SourceValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_tag, parse_uuid, storage_error};

const CONFLICT_COLUMNS: &str = "id, activity_id, field, source_values, status, winning_origin, \
     winning_value, created_at, updated_at";

fn row_to_conflict(row: &SqliteRow) -> AppResult<Conflict> {
    let id: String = row.get("id");
    let activity_id: String = row.get("activity_id");
    let field: String = row.get("field");
    let values: String = row.get("source_values");
    let status: String = row.get("status");
    let winning_origin: Option<String> = row.get("winning_origin");
    let winning_value: Option<String> = row.get("winning_value");
    Ok(Conflict {
        id: parse_uuid(&id)?,
        activity_id: parse_uuid(&activity_id)?,
        field: parse_tag(&field)?,
        values: serde_json::from_str::<Vec<SourceValue>>(&values)?,
        status: parse_tag(&status)?,
        winning_origin: winning_origin.as_deref().map(parse_tag).transpose()?,
        winning_value: winning_value
            .as_deref()
            .map(serde_json::from_str::<FieldValue>)
            .transpose()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Insert a conflict or update the existing one for the same activity and field
///
/// The stored id and creation time of an existing conflict are kept.
///
/// # Errors
///
/// Returns an error if serialization or the write fails
pub async fn upsert_conflict(conn: &mut SqliteConnection, conflict: &Conflict) -> AppResult<()> {
    let values = serde_json::to_string(&conflict.values)?;
    let winning_value = conflict
        .winning_value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    sqlx::query(&format!(
        "INSERT INTO conflicts ({CONFLICT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         ON CONFLICT(activity_id, field) DO UPDATE SET \
             source_values = excluded.source_values, \
             status = excluded.status, \
             winning_origin = excluded.winning_origin, \
             winning_value = excluded.winning_value, \
             updated_at = excluded.updated_at"
    ))
    .bind(conflict.id.to_string())
    .bind(conflict.activity_id.to_string())
    .bind(conflict.field.as_str())
    .bind(values)
    .bind(conflict.status.as_str())
    .bind(conflict.winning_origin.map(|o| o.as_str()))
    .bind(winning_value)
    .bind(conflict.created_at)
    .bind(conflict.updated_at)
    .execute(conn)
    .await
    .map_err(|e| storage_error("Failed to store conflict", &e))?;
    Ok(())
}

/// Conflict recorded for one field of one activity
///
/// # Errors
///
/// Returns an error if the query fails or the row is corrupt
pub async fn conflict_for_field(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
    field: ActivityField,
) -> AppResult<Option<Conflict>> {
    let row = sqlx::query(&format!(
        "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE activity_id = ?1 AND field = ?2"
    ))
    .bind(activity_id.to_string())
    .bind(field.as_str())
    .fetch_optional(conn)
    .await
    .map_err(|e| storage_error("Failed to get conflict", &e))?;
    row.as_ref().map(row_to_conflict).transpose()
}

/// Fetch a conflict by id
///
/// # Errors
///
/// Returns an error if the query fails or the row is corrupt
pub async fn get_conflict(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Option<Conflict>> {
    let row = sqlx::query(&format!("SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await
        .map_err(|e| storage_error("Failed to get conflict", &e))?;
    row.as_ref().map(row_to_conflict).transpose()
}

/// Conflicts, optionally filtered by status, oldest first
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn list_conflicts(
    conn: &mut SqliteConnection,
    status: Option<ConflictStatus>,
) -> AppResult<Vec<Conflict>> {
    let rows = sqlx::query(&format!(
        "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE (?1 IS NULL OR status = ?1) \
         ORDER BY created_at, activity_id, field"
    ))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list conflicts", &e))?;
    rows.iter().map(row_to_conflict).collect()
}

/// Conflicts of one activity
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn conflicts_for_activity(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
) -> AppResult<Vec<Conflict>> {
    let rows = sqlx::query(&format!(
        "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE activity_id = ?1 ORDER BY field"
    ))
    .bind(activity_id.to_string())
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list activity conflicts", &e))?;
    rows.iter().map(row_to_conflict).collect()
}

/// Drop an unresolved conflict whose sources now agree
///
/// Conflicts resolved by a reviewer are kept as history.
///
/// # Errors
///
/// Returns an error if the delete fails
pub async fn delete_unresolved(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
    field: ActivityField,
) -> AppResult<bool> {
    let result = sqlx::query(
        "DELETE FROM conflicts WHERE activity_id = ?1 AND field = ?2 AND status != 'resolved'",
    )
    .bind(activity_id.to_string())
    .bind(field.as_str())
    .execute(conn)
    .await
    .map_err(|e| storage_error("Failed to delete conflict", &e))?;
    Ok(result.rows_affected() > 0)
}

/// Mark a conflict resolved with the chosen winner
///
/// # Errors
///
/// Returns an error if the value cannot be serialized, the write fails, or the
/// conflict does not exist
pub async fn mark_resolved(
    conn: &mut SqliteConnection,
    id: Uuid,
    winning_origin: Option<SourceOrigin>,
    winning_value: &FieldValue,
) -> AppResult<()> {
    let value = serde_json::to_string(winning_value)?;
    let result = sqlx::query(
        r"
        UPDATE conflicts
        SET status = ?2, winning_origin = ?3, winning_value = ?4, updated_at = ?5
        WHERE id = ?1
        ",
    )
    .bind(id.to_string())
    .bind(ConflictStatus::Resolved.as_str())
    .bind(winning_origin.map(|o| o.as_str()))
    .bind(value)
    .bind(Utc::now())
    .execute(conn)
    .await
    .map_err(|e| storage_error("Failed to resolve conflict", &e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("Conflict {id}")));
    }
    Ok(())
}
