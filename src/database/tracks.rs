// ABOUTME: Append-only registry of detected running tracks
// ABOUTME: Loads the cached tracks handed to the detector and persists newly detected ones
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::errors::AppResult;
use runbase_core::models::DetectedTrack;
use sqlx::{Row, SqliteConnection};

use super::{parse_optional_uuid, storage_error};

/// Every cached track in detection order
///
/// # Errors
///
/// Returns an error if the query fails or a row is corrupt
pub async fn list_tracks(conn: &mut SqliteConnection) -> AppResult<Vec<DetectedTrack>> {
    let rows = sqlx::query(
        r"
        SELECT id, lat, lon, orientation_deg, fit_score, confidence,
               detected_by_activity_id, detected_at
        FROM detected_tracks ORDER BY id
        ",
    )
    .fetch_all(conn)
    .await
    .map_err(|e| storage_error("Failed to list detected tracks", &e))?;

    rows.iter()
        .map(|row| {
            Ok(DetectedTrack {
                id: row.get("id"),
                lat: row.get("lat"),
                lon: row.get("lon"),
                orientation_deg: row.get("orientation_deg"),
                fit_score: row.get("fit_score"),
                confidence: row.get("confidence"),
                detected_by_activity_id: parse_optional_uuid(row.get("detected_by_activity_id"))?,
                detected_at: row.get("detected_at"),
            })
        })
        .collect()
}

/// Persist a newly detected track and return it with its assigned id
///
/// # Errors
///
/// Returns an error if the insert fails
pub async fn insert_track(conn: &mut SqliteConnection, track: &DetectedTrack) -> AppResult<DetectedTrack> {
    let result = sqlx::query(
        r"
        INSERT INTO detected_tracks (lat, lon, orientation_deg, fit_score, confidence,
            detected_by_activity_id, detected_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
    )
    .bind(track.lat)
    .bind(track.lon)
    .bind(track.orientation_deg)
    .bind(track.fit_score)
    .bind(track.confidence)
    .bind(track.detected_by_activity_id.map(|id| id.to_string()))
    .bind(track.detected_at)
    .execute(conn)
    .await
    .map_err(|e| storage_error("Failed to store detected track", &e))?;

    Ok(DetectedTrack {
        id: result.last_insert_rowid(),
        ..track.clone()
    })
}
