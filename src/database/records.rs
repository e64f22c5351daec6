// ABOUTME: Raw source record storage with laps and telemetry streams
// ABOUTME: Idempotent ingestion upserts, unlinked-record queries, and the guarded one-time activity link
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use chrono::{DateTime, NaiveDate, Utc};
use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::{RawSourceRecord, RecordBundle, SourceLap, SourceOrigin, TelemetryPoint};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_optional_uuid, parse_tag, parse_uuid, storage_error, to_u32};

/// Result of storing one ingested record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New record
    Inserted(Uuid),
    /// Existing unlinked record replaced
    Updated(Uuid),
    /// Existing record already linked; nothing written
    Unchanged(Uuid),
}

impl IngestOutcome {
    /// Identifier of the stored record
    #[must_use]
    pub const fn record_id(&self) -> Uuid {
        match self {
            Self::Inserted(id) | Self::Updated(id) | Self::Unchanged(id) => *id,
        }
    }

    /// Operation label for logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "insert",
            Self::Updated(_) => "update",
            Self::Unchanged(_) => "unchanged",
        }
    }
}

const RECORD_COLUMNS: &str = "id, origin, external_id, activity_id, date, start_time, distance_m, \
     duration_s, avg_hr, max_hr, avg_cadence, total_ascent_m, calories, workout_name, \
     workout_type, notes, shoe_ref, telemetry_ref, imported_at";

fn row_to_record(row: &SqliteRow) -> AppResult<RawSourceRecord> {
    let id: String = row.get("id");
    let origin: String = row.get("origin");
    let workout_type: Option<String> = row.get("workout_type");
    Ok(RawSourceRecord {
        id: parse_uuid(&id)?,
        origin: parse_tag(&origin)?,
        external_id: row.get("external_id"),
        activity_id: parse_optional_uuid(row.get("activity_id"))?,
        date: row.get::<Option<NaiveDate>, _>("date"),
        start_time: row.get::<Option<DateTime<Utc>>, _>("start_time"),
        distance_m: row.get("distance_m"),
        duration_s: row.get("duration_s"),
        avg_hr: row.get("avg_hr"),
        max_hr: row.get("max_hr"),
        avg_cadence: row.get("avg_cadence"),
        total_ascent_m: row.get("total_ascent_m"),
        calories: row.get("calories"),
        workout_name: row.get("workout_name"),
        workout_type: workout_type.as_deref().map(parse_tag).transpose()?,
        notes: row.get("notes"),
        shoe_ref: row.get("shoe_ref"),
        telemetry_ref: row.get("telemetry_ref"),
        imported_at: row.get("imported_at"),
    })
}

/// Store a record bundle, replacing an unlinked record with the same origin and external id
///
/// # Errors
///
/// Returns an error if a query fails
pub async fn upsert_bundle(
    conn: &mut SqliteConnection,
    bundle: &RecordBundle,
) -> AppResult<IngestOutcome> {
    let record = &bundle.record;
    if record.external_id.trim().is_empty() {
        return Err(AppError::invalid_input("Record external_id must not be empty"));
    }

    let existing = sqlx::query(
        "SELECT id, activity_id FROM raw_records WHERE origin = ?1 AND external_id = ?2",
    )
    .bind(record.origin.as_str())
    .bind(&record.external_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| storage_error("Failed to look up raw record", &e))?;

    let (record_id, outcome) = if let Some(row) = existing {
        let id = parse_uuid(&row.get::<String, _>("id"))?;
        if row.get::<Option<String>, _>("activity_id").is_some() {
            return Ok(IngestOutcome::Unchanged(id));
        }
        sqlx::query(
            r"
            UPDATE raw_records SET
                date = ?2, start_time = ?3, distance_m = ?4, duration_s = ?5, avg_hr = ?6,
                max_hr = ?7, avg_cadence = ?8, total_ascent_m = ?9, calories = ?10,
                workout_name = ?11, workout_type = ?12, notes = ?13, shoe_ref = ?14,
                telemetry_ref = ?15
            WHERE id = ?1 AND activity_id IS NULL
            ",
        )
        .bind(id.to_string())
        .bind(record.date)
        .bind(record.start_time)
        .bind(record.distance_m)
        .bind(record.duration_s)
        .bind(record.avg_hr)
        .bind(record.max_hr)
        .bind(record.avg_cadence)
        .bind(record.total_ascent_m)
        .bind(record.calories)
        .bind(&record.workout_name)
        .bind(record.workout_type.map(|t| t.as_str()))
        .bind(&record.notes)
        .bind(&record.shoe_ref)
        .bind(&record.telemetry_ref)
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to update raw record", &e))?;
        (id, IngestOutcome::Updated(id))
    } else {
        sqlx::query(&format!(
            "INSERT INTO raw_records ({RECORD_COLUMNS}) VALUES \
             (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ))
        .bind(record.id.to_string())
        .bind(record.origin.as_str())
        .bind(&record.external_id)
        .bind(record.date)
        .bind(record.start_time)
        .bind(record.distance_m)
        .bind(record.duration_s)
        .bind(record.avg_hr)
        .bind(record.max_hr)
        .bind(record.avg_cadence)
        .bind(record.total_ascent_m)
        .bind(record.calories)
        .bind(&record.workout_name)
        .bind(record.workout_type.map(|t| t.as_str()))
        .bind(&record.notes)
        .bind(&record.shoe_ref)
        .bind(&record.telemetry_ref)
        .bind(record.imported_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to insert raw record", &e))?;
        (record.id, IngestOutcome::Inserted(record.id))
    };

    replace_laps(conn, record_id, &bundle.laps).await?;
    replace_telemetry(conn, record_id, &bundle.telemetry).await?;
    Ok(outcome)
}

async fn replace_laps(conn: &mut SqliteConnection, record_id: Uuid, laps: &[SourceLap]) -> AppResult<()> {
    sqlx::query("DELETE FROM source_laps WHERE record_id = ?1")
        .bind(record_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to clear laps", &e))?;

    for lap in laps {
        sqlx::query(
            r"
            INSERT INTO source_laps (record_id, lap_index, distance_m, duration_s, avg_hr,
                max_hr, avg_cadence, start_offset_s, end_offset_s, is_rest)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(record_id.to_string())
        .bind(i64::from(lap.lap_index))
        .bind(lap.distance_m)
        .bind(lap.duration_s)
        .bind(lap.avg_hr)
        .bind(lap.max_hr)
        .bind(lap.avg_cadence)
        .bind(lap.start_offset_s)
        .bind(lap.end_offset_s)
        .bind(lap.is_rest)
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to insert lap", &e))?;
    }
    Ok(())
}

async fn replace_telemetry(
    conn: &mut SqliteConnection,
    record_id: Uuid,
    points: &[TelemetryPoint],
) -> AppResult<()> {
    sqlx::query("DELETE FROM telemetry WHERE record_id = ?1")
        .bind(record_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to clear telemetry", &e))?;

    for (seq, point) in points.iter().enumerate() {
        sqlx::query(
            r"
            INSERT INTO telemetry (record_id, seq, offset_s, lat, lon, distance_m, heart_rate,
                cadence, speed_mps)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(record_id.to_string())
        .bind(i64::try_from(seq).unwrap_or(i64::MAX))
        .bind(point.offset_s)
        .bind(point.lat)
        .bind(point.lon)
        .bind(point.distance_m)
        .bind(point.heart_rate)
        .bind(point.cadence)
        .bind(point.speed_mps)
        .execute(&mut *conn)
        .await
        .map_err(|e| storage_error("Failed to insert telemetry", &e))?;
    }
    Ok(())
}

/// Fetch one record
///
/// # Errors
///
/// Returns an error if the query fails or the row is corrupt
pub async fn get_record(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Option<RawSourceRecord>> {
    let row = sqlx::query(&format!("SELECT {RECORD_COLUMNS} FROM raw_records WHERE id = ?1"))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await
        .map_err(|e| storage_error("Failed to get raw record", &e))?;
    row.as_ref().map(row_to_record).transpose()
}

/// Records not yet linked to an activity, oldest import first
///
/// The optional window applies to the record's calendar date, falling back to
/// its start time and then its import time.
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn list_unlinked(
    conn: &mut SqliteConnection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> AppResult<Vec<RawSourceRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM raw_records WHERE activity_id IS NULL \
         ORDER BY imported_at, origin, external_id"
    ))
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list unlinked records", &e))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let record = row_to_record(row)?;
        let date = record
            .effective_date()
            .unwrap_or_else(|| record.imported_at.date_naive());
        if from.is_some_and(|f| date < f) || to.is_some_and(|t| date > t) {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

/// Records linked to one activity
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn records_for_activity(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
) -> AppResult<Vec<RawSourceRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM raw_records WHERE activity_id = ?1 \
         ORDER BY origin, imported_at, external_id"
    ))
    .bind(activity_id.to_string())
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list activity records", &e))?;
    rows.iter().map(row_to_record).collect()
}

/// Origins linked to activities dated inside a window
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn linked_origins(
    conn: &mut SqliteConnection,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<(Uuid, SourceOrigin)>> {
    let rows = sqlx::query(
        r"
        SELECT DISTINCT r.activity_id AS activity_id, r.origin AS origin
        FROM raw_records r JOIN activities a ON a.id = r.activity_id
        WHERE a.date >= ?1 AND a.date <= ?2
        ",
    )
    .bind(from)
    .bind(to)
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list linked origins", &e))?;

    rows.iter()
        .map(|row| {
            let activity_id: String = row.get("activity_id");
            let origin: String = row.get("origin");
            Ok((parse_uuid(&activity_id)?, parse_tag(&origin)?))
        })
        .collect()
}

/// Link a record to an activity if it is not linked yet
///
/// Returns `false` when the record was already linked (or does not exist), which
/// keeps every record attached to at most one activity.
///
/// # Errors
///
/// Returns an error if the update fails
pub async fn link_record(
    conn: &mut SqliteConnection,
    record_id: Uuid,
    activity_id: Uuid,
) -> AppResult<bool> {
    let result = sqlx::query("UPDATE raw_records SET activity_id = ?2 WHERE id = ?1 AND activity_id IS NULL")
        .bind(record_id.to_string())
        .bind(activity_id.to_string())
        .execute(conn)
        .await
        .map_err(|e| storage_error("Failed to link record", &e))?;
    Ok(result.rows_affected() == 1)
}

/// Native laps of a record in lap order
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn laps_for_record(conn: &mut SqliteConnection, record_id: Uuid) -> AppResult<Vec<SourceLap>> {
    let rows = sqlx::query(
        r"
        SELECT lap_index, distance_m, duration_s, avg_hr, max_hr, avg_cadence,
               start_offset_s, end_offset_s, is_rest
        FROM source_laps WHERE record_id = ?1 ORDER BY lap_index
        ",
    )
    .bind(record_id.to_string())
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list laps", &e))?;

    rows.iter()
        .map(|row| {
            Ok(SourceLap {
                lap_index: to_u32(row.get("lap_index"), "lap_index")?,
                distance_m: row.get("distance_m"),
                duration_s: row.get("duration_s"),
                avg_hr: row.get("avg_hr"),
                max_hr: row.get("max_hr"),
                avg_cadence: row.get("avg_cadence"),
                start_offset_s: row.get("start_offset_s"),
                end_offset_s: row.get("end_offset_s"),
                is_rest: row.get("is_rest"),
            })
        })
        .collect()
}

/// Telemetry of a record ordered by offset
///
/// # Errors
///
/// Returns an error if the query fails
pub async fn telemetry_for_record(
    conn: &mut SqliteConnection,
    record_id: Uuid,
) -> AppResult<Vec<TelemetryPoint>> {
    let rows = sqlx::query(
        r"
        SELECT offset_s, lat, lon, distance_m, heart_rate, cadence, speed_mps
        FROM telemetry WHERE record_id = ?1 ORDER BY offset_s, seq
        ",
    )
    .bind(record_id.to_string())
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to load telemetry", &e))?;

    Ok(rows
        .iter()
        .map(|row| TelemetryPoint {
            offset_s: row.get("offset_s"),
            lat: row.get("lat"),
            lon: row.get("lon"),
            distance_m: row.get("distance_m"),
            heart_rate: row.get("heart_rate"),
            cadence: row.get("cadence"),
            speed_mps: row.get("speed_mps"),
        })
        .collect())
}

/// Per-origin record totals as `(origin, total, linked)`
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn origin_counts(conn: &mut SqliteConnection) -> AppResult<Vec<(SourceOrigin, i64, i64)>> {
    let rows = sqlx::query(
        r"
        SELECT origin, COUNT(*) AS total, COUNT(activity_id) AS linked
        FROM raw_records GROUP BY origin ORDER BY origin
        ",
    )
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to count records", &e))?;

    rows.iter()
        .map(|row| {
            let origin: String = row.get("origin");
            Ok((parse_tag(&origin)?, row.get("total"), row.get("linked")))
        })
        .collect()
}
