// ABOUTME: Canonical activity rows and sticky manual field overrides
// ABOUTME: Insert, update, window queries, and override upsert / clear
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use chrono::{DateTime, NaiveDate, Utc};
use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::{ActivityField, ActivityOverride, CanonicalActivity, FieldValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_tag, parse_uuid, storage_error};

const ACTIVITY_COLUMNS: &str = "id, date, start_time, distance_m, duration_s, pace_s_per_km, \
     avg_hr, max_hr, avg_cadence, total_ascent_m, calories, workout_type, workout_name, notes, \
     shoe_ref, adjusted_distance_m, vdot_snapshot, created_at, updated_at";

fn row_to_activity(row: &SqliteRow) -> AppResult<CanonicalActivity> {
    let id: String = row.get("id");
    let workout_type: Option<String> = row.get("workout_type");
    Ok(CanonicalActivity {
        id: parse_uuid(&id)?,
        date: row.get::<NaiveDate, _>("date"),
        start_time: row.get::<Option<DateTime<Utc>>, _>("start_time"),
        distance_m: row.get("distance_m"),
        duration_s: row.get("duration_s"),
        pace_s_per_km: row.get("pace_s_per_km"),
        avg_hr: row.get("avg_hr"),
        max_hr: row.get("max_hr"),
        avg_cadence: row.get("avg_cadence"),
        total_ascent_m: row.get("total_ascent_m"),
        calories: row.get("calories"),
        workout_type: workout_type.as_deref().map(parse_tag).transpose()?,
        workout_name: row.get("workout_name"),
        notes: row.get("notes"),
        shoe_ref: row.get("shoe_ref"),
        adjusted_distance_m: row.get("adjusted_distance_m"),
        vdot_snapshot: row.get("vdot_snapshot"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Insert a new activity
///
/// # Errors
///
/// Returns an error if the insert fails
pub async fn insert_activity(conn: &mut SqliteConnection, activity: &CanonicalActivity) -> AppResult<()> {
    sqlx::query(&format!(
        "INSERT INTO activities ({ACTIVITY_COLUMNS}) VALUES \
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
    ))
    .bind(activity.id.to_string())
    .bind(activity.date)
    .bind(activity.start_time)
    .bind(activity.distance_m)
    .bind(activity.duration_s)
    .bind(activity.pace_s_per_km)
    .bind(activity.avg_hr)
    .bind(activity.max_hr)
    .bind(activity.avg_cadence)
    .bind(activity.total_ascent_m)
    .bind(activity.calories)
    .bind(activity.workout_type.map(|t| t.as_str()))
    .bind(&activity.workout_name)
    .bind(&activity.notes)
    .bind(&activity.shoe_ref)
    .bind(activity.adjusted_distance_m)
    .bind(activity.vdot_snapshot)
    .bind(activity.created_at)
    .bind(activity.updated_at)
    .execute(conn)
    .await
    .map_err(|e| storage_error(&format!("Failed to insert activity {}", activity.id), &e))?;
    Ok(())
}

/// Overwrite every mutable column of an activity
///
/// # Errors
///
/// Returns an error if the update fails or the activity does not exist
pub async fn update_activity(conn: &mut SqliteConnection, activity: &CanonicalActivity) -> AppResult<()> {
    let result = sqlx::query(
        r"
        UPDATE activities SET
            date = ?2, start_time = ?3, distance_m = ?4, duration_s = ?5, pace_s_per_km = ?6,
            avg_hr = ?7, max_hr = ?8, avg_cadence = ?9, total_ascent_m = ?10, calories = ?11,
            workout_type = ?12, workout_name = ?13, notes = ?14, shoe_ref = ?15,
            adjusted_distance_m = ?16, vdot_snapshot = ?17, updated_at = ?18
        WHERE id = ?1
        ",
    )
    .bind(activity.id.to_string())
    .bind(activity.date)
    .bind(activity.start_time)
    .bind(activity.distance_m)
    .bind(activity.duration_s)
    .bind(activity.pace_s_per_km)
    .bind(activity.avg_hr)
    .bind(activity.max_hr)
    .bind(activity.avg_cadence)
    .bind(activity.total_ascent_m)
    .bind(activity.calories)
    .bind(activity.workout_type.map(|t| t.as_str()))
    .bind(&activity.workout_name)
    .bind(&activity.notes)
    .bind(&activity.shoe_ref)
    .bind(activity.adjusted_distance_m)
    .bind(activity.vdot_snapshot)
    .bind(activity.updated_at)
    .execute(conn)
    .await
    .map_err(|e| storage_error(&format!("Failed to update activity {}", activity.id), &e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!("Activity {}", activity.id)));
    }
    Ok(())
}

/// Fetch one activity
///
/// # Errors
///
/// Returns an error if the query fails or the row is corrupt
pub async fn get_activity(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Option<CanonicalActivity>> {
    let row = sqlx::query(&format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await
        .map_err(|e| storage_error("Failed to get activity", &e))?;
    row.as_ref().map(row_to_activity).transpose()
}

/// Activities dated inside an inclusive window, in timeline order
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn list_activities(
    conn: &mut SqliteConnection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> AppResult<Vec<CanonicalActivity>> {
    let rows = sqlx::query(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities \
         WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2) \
         ORDER BY date, start_time, id"
    ))
    .bind(from)
    .bind(to)
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list activities", &e))?;
    rows.iter().map(row_to_activity).collect()
}

/// Total number of activities
///
/// # Errors
///
/// Returns an error if the query fails
pub async fn count_activities(conn: &mut SqliteConnection) -> AppResult<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM activities")
        .fetch_one(conn)
        .await
        .map_err(|e| storage_error("Failed to count activities", &e))
}

/// Create or replace the override for one field
///
/// # Errors
///
/// Returns an error if the value cannot be serialized or the write fails
pub async fn upsert_override(conn: &mut SqliteConnection, entry: &ActivityOverride) -> AppResult<()> {
    let value = serde_json::to_string(&entry.value)?;
    sqlx::query(
        r"
        INSERT INTO activity_overrides (activity_id, field, value, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(activity_id, field) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        ",
    )
    .bind(entry.activity_id.to_string())
    .bind(entry.field.as_str())
    .bind(value)
    .bind(entry.updated_at)
    .execute(conn)
    .await
    .map_err(|e| storage_error("Failed to store override", &e))?;
    Ok(())
}

/// Remove the override for one field, returning whether one existed
///
/// # Errors
///
/// Returns an error if the delete fails
pub async fn delete_override(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
    field: ActivityField,
) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM activity_overrides WHERE activity_id = ?1 AND field = ?2")
        .bind(activity_id.to_string())
        .bind(field.as_str())
        .execute(conn)
        .await
        .map_err(|e| storage_error("Failed to clear override", &e))?;
    Ok(result.rows_affected() > 0)
}

/// All overrides of one activity
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn overrides_for_activity(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
) -> AppResult<Vec<ActivityOverride>> {
    let rows = sqlx::query(
        "SELECT field, value, updated_at FROM activity_overrides WHERE activity_id = ?1 ORDER BY field",
    )
    .bind(activity_id.to_string())
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list overrides", &e))?;

    rows.iter()
        .map(|row| {
            let field: String = row.get("field");
            let value: String = row.get("value");
            Ok(ActivityOverride {
                activity_id,
                field: parse_tag(&field)?,
                value: serde_json::from_str::<FieldValue>(&value)?,
                updated_at: row.get("updated_at"),
            })
        })
        .collect()
}
