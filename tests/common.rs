// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: In-memory store, record and lap builders, and synthetic track / road telemetry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors
#![allow(
    dead_code,
    missing_docs,
    clippy::unwrap_used,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
//! Shared test utilities for `runbase`
//!
//! This module provides common test setup functions to reduce duplication
//! across integration tests.

use std::env;
use std::sync::Once;

use anyhow::Result;
use chrono::{NaiveDate, TimeZone, Utc};
use runbase::config::RunbaseConfig;
use runbase::database::Database;
use runbase::pipeline::{ReconcileOptions, ReconcilePipeline, RunReport};
use runbase_core::models::{RawSourceRecord, RecordBundle, SourceLap, SourceOrigin, TelemetryPoint};
use runbase_intelligence::geometry::local::LocalFrame;
use runbase_intelligence::geometry::track::track_template;

static INIT_LOGGER: Once = Once::new();

/// Centre of the synthetic track
pub const TRACK_CENTRE: (f64, f64) = (40.0, -75.0);

/// Centre of the synthetic measured course, well away from the track
pub const COURSE_CENTRE: (f64, f64) = (40.05, -75.0);

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        // Check for TEST_LOG environment variable to control test logging level
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Configuration pointing at an in-memory store
pub fn test_config() -> RunbaseConfig {
    RunbaseConfig {
        database_url: "sqlite::memory:".to_owned(),
        ..RunbaseConfig::default()
    }
}

/// Standard test database setup
pub async fn create_test_database() -> Result<Database> {
    init_test_logging();
    Ok(Database::new("sqlite::memory:").await?)
}

/// A day in April 2024
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
}

/// Summary record with a date, distance, and duration
pub fn record(
    origin: SourceOrigin,
    external_id: &str,
    date: NaiveDate,
    distance_m: f64,
    duration_s: f64,
) -> RawSourceRecord {
    let mut r = RawSourceRecord::new(origin, external_id);
    r.date = Some(date);
    r.distance_m = Some(distance_m);
    r.duration_s = Some(duration_s);
    r.imported_at = Utc.with_ymd_and_hms(2024, 4, 20, 7, 0, 0).unwrap();
    r
}

/// Bundle without laps or telemetry
pub fn bundle(record: RawSourceRecord) -> RecordBundle {
    RecordBundle {
        record,
        laps: Vec::new(),
        telemetry: Vec::new(),
    }
}

/// Laps laid end to end from `(distance_m, duration_s, is_rest)` triples
pub fn laps(spec: &[(f64, f64, bool)]) -> Vec<SourceLap> {
    let mut offset = 0.0;
    spec.iter()
        .enumerate()
        .map(|(idx, &(distance_m, duration_s, is_rest))| {
            let lap = SourceLap {
                lap_index: u32::try_from(idx).unwrap(),
                distance_m: Some(distance_m),
                duration_s: Some(duration_s),
                avg_hr: None,
                max_hr: None,
                avg_cadence: None,
                start_offset_s: Some(offset),
                end_offset_s: Some(offset + duration_s),
                is_rest,
            };
            offset += duration_s;
            lap
        })
        .collect()
}

/// Total distance and duration of a lap list
pub fn lap_totals(laps: &[SourceLap]) -> (f64, f64) {
    laps.iter().fold((0.0, 0.0), |(d, t), lap| {
        (
            d + lap.distance_m.unwrap_or(0.0),
            t + lap.duration_s.unwrap_or(0.0),
        )
    })
}

/// Cumulative distance at second `t` when running the laps at constant pace each
fn distance_at(laps: &[SourceLap], t: f64) -> (f64, f64) {
    let mut covered = 0.0;
    for lap in laps {
        let (Some(start), Some(end), Some(distance)) =
            (lap.start_offset_s, lap.end_offset_s, lap.distance_m)
        else {
            continue;
        };
        let speed = distance / (end - start);
        if t <= end {
            return (covered + (t - start).max(0.0) * speed, speed);
        }
        covered += distance;
    }
    (covered, 0.0)
}

/// 1 Hz telemetry of the laps run around a 400 m oval
pub fn track_telemetry(laps: &[SourceLap]) -> Vec<TelemetryPoint> {
    let frame = LocalFrame::new(TRACK_CENTRE.0, TRACK_CENTRE.1);
    let template = track_template();
    let perimeter: f64 = template
        .iter()
        .zip(template.iter().cycle().skip(1))
        .map(|(a, b)| (b.0 - a.0).hypot(b.1 - a.1))
        .sum();
    let (_, total_s) = lap_totals(laps);

    (0..total_s as usize)
        .map(|t| {
            let (distance, speed) = distance_at(laps, t as f64);
            let along = distance % perimeter;
            let idx = ((along / perimeter) * template.len() as f64) as usize % template.len();
            let (x, y) = template[idx];
            let (lat, lon) = frame.unproject(x, y);
            TelemetryPoint {
                offset_s: t as f64,
                lat: Some(lat),
                lon: Some(lon),
                distance_m: Some(distance),
                heart_rate: None,
                cadence: None,
                speed_mps: Some(speed),
            }
        })
        .collect()
}

/// Telemetry every `step_s` seconds of an out-and-back along a 300 m road segment
pub fn out_and_back_telemetry(laps: &[SourceLap], centre: (f64, f64), step_s: usize) -> Vec<TelemetryPoint> {
    let frame = LocalFrame::new(centre.0, centre.1);
    let (_, total_s) = lap_totals(laps);

    (0..total_s as usize)
        .step_by(step_s.max(1))
        .map(|t| {
            let (distance, speed) = distance_at(laps, t as f64);
            let phase = distance % 600.0;
            let east = if phase <= 300.0 { phase - 150.0 } else { 450.0 - phase };
            let (lat, lon) = frame.unproject(east, 0.0);
            TelemetryPoint {
                offset_s: t as f64,
                lat: Some(lat),
                lon: Some(lon),
                distance_m: Some(distance),
                heart_rate: None,
                cadence: None,
                speed_mps: Some(speed),
            }
        })
        .collect()
}

/// Store bundles as ingestion would
pub async fn ingest(db: &Database, bundles: &[RecordBundle]) -> Result<()> {
    for bundle in bundles {
        db.upsert_raw_record(bundle).await?;
    }
    Ok(())
}

/// Run the pipeline over every date
pub async fn reconcile(db: &Database, config: &RunbaseConfig) -> Result<RunReport> {
    let report = ReconcilePipeline::new(db.clone(), config.clone())
        .run(ReconcileOptions::default())
        .await?;
    Ok(report)
}
