// ABOUTME: Interval rows keyed by activity and repetition number
// ABOUTME: Upsert, targeted deletes, and ordered reads for enrichment and review
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::errors::AppResult;
use runbase_core::models::{Interval, IntervalFlags, PaceZone};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_optional_uuid, parse_tag, parse_uuid, storage_error, to_u32};

const INTERVAL_COLUMNS: &str = "activity_id, rep_number, set_number, provenance, source_record_id, \
     start_offset_s, end_offset_s, gps_distance_m, prescribed_distance_m, canonical_distance_m, \
     duration_s, pace_s_per_km, avg_hr, max_hr, avg_cadence, pace_zone, flags, location_type, \
     location_name";

fn row_to_interval(row: &SqliteRow) -> AppResult<Interval> {
    let activity_id: String = row.get("activity_id");
    let provenance: String = row.get("provenance");
    let pace_zone: Option<String> = row.get("pace_zone");
    let location_type: String = row.get("location_type");
    let set_number: Option<i64> = row.get("set_number");
    let flags: i64 = row.get("flags");
    Ok(Interval {
        activity_id: parse_uuid(&activity_id)?,
        rep_number: to_u32(row.get("rep_number"), "rep_number")?,
        set_number: set_number.map(|s| to_u32(s, "set_number")).transpose()?,
        provenance: parse_tag(&provenance)?,
        source_record_id: parse_optional_uuid(row.get("source_record_id"))?,
        start_offset_s: row.get("start_offset_s"),
        end_offset_s: row.get("end_offset_s"),
        gps_distance_m: row.get("gps_distance_m"),
        prescribed_distance_m: row.get("prescribed_distance_m"),
        canonical_distance_m: row.get("canonical_distance_m"),
        duration_s: row.get("duration_s"),
        pace_s_per_km: row.get("pace_s_per_km"),
        avg_hr: row.get("avg_hr"),
        max_hr: row.get("max_hr"),
        avg_cadence: row.get("avg_cadence"),
        pace_zone: pace_zone.as_deref().map(parse_tag::<PaceZone>).transpose()?,
        flags: IntervalFlags::from_bits_truncate(u8::try_from(flags).unwrap_or(0)),
        location_type: parse_tag(&location_type)?,
        location_name: row.get("location_name"),
    })
}

/// Intervals of one activity ordered by repetition number
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn intervals_for_activity(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
) -> AppResult<Vec<Interval>> {
    let rows = sqlx::query(&format!(
        "SELECT {INTERVAL_COLUMNS} FROM intervals WHERE activity_id = ?1 ORDER BY rep_number"
    ))
    .bind(activity_id.to_string())
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list intervals", &e))?;
    rows.iter().map(row_to_interval).collect()
}

/// Fetch one interval
///
/// # Errors
///
/// Returns an error if the query fails or the row is corrupt
pub async fn get_interval(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
    rep_number: u32,
) -> AppResult<Option<Interval>> {
    let row = sqlx::query(&format!(
        "SELECT {INTERVAL_COLUMNS} FROM intervals WHERE activity_id = ?1 AND rep_number = ?2"
    ))
    .bind(activity_id.to_string())
    .bind(i64::from(rep_number))
    .fetch_optional(conn)
    .await
    .map_err(|e| storage_error("Failed to get interval", &e))?;
    row.as_ref().map(row_to_interval).transpose()
}

/// Insert an interval or overwrite the row with the same repetition number
///
/// # Errors
///
/// Returns an error if the write fails
pub async fn upsert_interval(conn: &mut SqliteConnection, interval: &Interval) -> AppResult<()> {
    sqlx::query(&format!(
        "INSERT INTO intervals ({INTERVAL_COLUMNS}) VALUES \
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19) \
         ON CONFLICT(activity_id, rep_number) DO UPDATE SET \
             set_number = excluded.set_number, \
             provenance = excluded.provenance, \
             source_record_id = excluded.source_record_id, \
             start_offset_s = excluded.start_offset_s, \
             end_offset_s = excluded.end_offset_s, \
             gps_distance_m = excluded.gps_distance_m, \
             prescribed_distance_m = excluded.prescribed_distance_m, \
             canonical_distance_m = excluded.canonical_distance_m, \
             duration_s = excluded.duration_s, \
             pace_s_per_km = excluded.pace_s_per_km, \
             avg_hr = excluded.avg_hr, \
             max_hr = excluded.max_hr, \
             avg_cadence = excluded.avg_cadence, \
             pace_zone = excluded.pace_zone, \
             flags = excluded.flags, \
             location_type = excluded.location_type, \
             location_name = excluded.location_name"
    ))
    .bind(interval.activity_id.to_string())
    .bind(i64::from(interval.rep_number))
    .bind(interval.set_number.map(i64::from))
    .bind(interval.provenance.as_str())
    .bind(interval.source_record_id.map(|id| id.to_string()))
    .bind(interval.start_offset_s)
    .bind(interval.end_offset_s)
    .bind(interval.gps_distance_m)
    .bind(interval.prescribed_distance_m)
    .bind(interval.canonical_distance_m)
    .bind(interval.duration_s)
    .bind(interval.pace_s_per_km)
    .bind(interval.avg_hr)
    .bind(interval.max_hr)
    .bind(interval.avg_cadence)
    .bind(interval.pace_zone.map(|z| z.as_str()))
    .bind(i64::from(interval.flags.bits()))
    .bind(interval.location_type.as_str())
    .bind(&interval.location_name)
    .execute(conn)
    .await
    .map_err(|e| {
        storage_error(
            &format!(
                "Failed to store interval {} of activity {}",
                interval.rep_number, interval.activity_id
            ),
            &e,
        )
    })?;
    Ok(())
}

/// Delete one interval, returning whether it existed
///
/// # Errors
///
/// Returns an error if the delete fails
pub async fn delete_interval(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
    rep_number: u32,
) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM intervals WHERE activity_id = ?1 AND rep_number = ?2")
        .bind(activity_id.to_string())
        .bind(i64::from(rep_number))
        .execute(conn)
        .await
        .map_err(|e| storage_error("Failed to delete interval", &e))?;
    Ok(result.rows_affected() > 0)
}
