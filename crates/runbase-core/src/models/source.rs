// ABOUTME: Per-source observation types as written by ingestion
// ABOUTME: SourceOrigin tag, RawSourceRecord, native laps, and telemetry samples
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use crate::errors::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::workout::WorkoutType;

/// Where a raw record came from
///
/// The engine never inspects source-specific payloads; the origin tag is the only
/// thing priority rules and matching exclusions key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    /// Wearable device file feed (FIT-style exports)
    WearableFile,
    /// Social fitness API
    SocialApi,
    /// Hand-maintained historical training log
    ManualLog,
}

impl SourceOrigin {
    /// All origins in default precedence order
    pub const ALL: [Self; 3] = [Self::WearableFile, Self::SocialApi, Self::ManualLog];

    /// Stable storage identifier
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WearableFile => "wearable_file",
            Self::SocialApi => "social_api",
            Self::ManualLog => "manual_log",
        }
    }
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceOrigin {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wearable_file" | "wearable" | "fit" => Ok(Self::WearableFile),
            "social_api" | "social" | "api" => Ok(Self::SocialApi),
            "manual_log" | "manual" | "log" => Ok(Self::ManualLog),
            other => Err(AppError::invalid_input(format!(
                "Unknown source origin '{other}'. Valid: wearable_file, social_api, manual_log"
            ))),
        }
    }
}

/// One observation of an activity from one source
///
/// Immutable once stored, except for the `activity_id` link which is set exactly
/// once by the matcher (or by a manual link from the review surface).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSourceRecord {
    /// Storage identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Source tag
    pub origin: SourceOrigin,
    /// Identifier assigned by the source (file name, API id, log row key)
    pub external_id: String,
    /// Canonical activity this record is linked to
    #[serde(default, skip_deserializing)]
    pub activity_id: Option<Uuid>,
    /// Local calendar date of the run
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Start timestamp as reported by the source
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Reported distance in meters
    #[serde(default)]
    pub distance_m: Option<f64>,
    /// Reported moving / elapsed duration in seconds
    #[serde(default)]
    pub duration_s: Option<f64>,
    /// Average heart rate (bpm)
    #[serde(default)]
    pub avg_hr: Option<f64>,
    /// Maximum heart rate (bpm)
    #[serde(default)]
    pub max_hr: Option<f64>,
    /// Average cadence (steps per minute)
    #[serde(default)]
    pub avg_cadence: Option<f64>,
    /// Total ascent in meters
    #[serde(default)]
    pub total_ascent_m: Option<f64>,
    /// Energy in kilocalories
    #[serde(default)]
    pub calories: Option<f64>,
    /// Free-text title
    #[serde(default)]
    pub workout_name: Option<String>,
    /// Source-declared classification
    #[serde(default)]
    pub workout_type: Option<WorkoutType>,
    /// Free-text notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Shoe / gear reference
    #[serde(default)]
    pub shoe_ref: Option<String>,
    /// Opaque pointer to the original telemetry payload
    #[serde(default)]
    pub telemetry_ref: Option<String>,
    /// When the record was first stored
    #[serde(default = "Utc::now")]
    pub imported_at: DateTime<Utc>,
}

impl RawSourceRecord {
    /// Create an empty record for the given origin and external identifier
    #[must_use]
    pub fn new(origin: SourceOrigin, external_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            external_id: external_id.into(),
            activity_id: None,
            date: None,
            start_time: None,
            distance_m: None,
            duration_s: None,
            avg_hr: None,
            max_hr: None,
            avg_cadence: None,
            total_ascent_m: None,
            calories: None,
            workout_name: None,
            workout_type: None,
            notes: None,
            shoe_ref: None,
            telemetry_ref: None,
            imported_at: Utc::now(),
        }
    }

    /// Calendar date, falling back to the start timestamp
    #[must_use]
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.date
            .or_else(|| self.start_time.map(|ts| ts.date_naive()))
    }

    /// Positive reported distance
    #[must_use]
    pub fn usable_distance(&self) -> Option<f64> {
        self.distance_m.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Whether the matcher can compare this record with anything
    ///
    /// Records without a date or a positive distance skip matching and are promoted.
    #[must_use]
    pub fn is_matchable(&self) -> bool {
        self.effective_date().is_some() && self.usable_distance().is_some()
    }
}

/// A native lap or split reported by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLap {
    /// Zero-based lap index within the record
    pub lap_index: u32,
    /// Lap distance in meters
    #[serde(default)]
    pub distance_m: Option<f64>,
    /// Lap duration in seconds
    #[serde(default)]
    pub duration_s: Option<f64>,
    /// Average heart rate
    #[serde(default)]
    pub avg_hr: Option<f64>,
    /// Maximum heart rate
    #[serde(default)]
    pub max_hr: Option<f64>,
    /// Average cadence
    #[serde(default)]
    pub avg_cadence: Option<f64>,
    /// Seconds from record start to lap start
    #[serde(default)]
    pub start_offset_s: Option<f64>,
    /// Seconds from record start to lap end
    #[serde(default)]
    pub end_offset_s: Option<f64>,
    /// Source marked the lap as a rest / recovery lap
    #[serde(default)]
    pub is_rest: bool,
}

/// One telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Seconds since record start
    pub offset_s: f64,
    /// Latitude in degrees
    #[serde(default)]
    pub lat: Option<f64>,
    /// Longitude in degrees
    #[serde(default)]
    pub lon: Option<f64>,
    /// Cumulative distance in meters
    #[serde(default)]
    pub distance_m: Option<f64>,
    /// Heart rate (bpm)
    #[serde(default)]
    pub heart_rate: Option<f64>,
    /// Cadence (spm)
    #[serde(default)]
    pub cadence: Option<f64>,
    /// Instantaneous speed in m/s
    #[serde(default)]
    pub speed_mps: Option<f64>,
}

impl TelemetryPoint {
    /// Coordinate pair when both components are present
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }

    /// Instantaneous pace in seconds per kilometer
    #[must_use]
    pub fn pace_s_per_km(&self) -> Option<f64> {
        self.speed_mps
            .filter(|v| *v > 0.0)
            .map(|v| 1_000.0 / v)
    }
}

/// Ingestion payload: a record with its laps and telemetry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordBundle {
    /// Summary record
    #[serde(flatten)]
    pub record: RawSourceRecord,
    /// Native laps / splits
    #[serde(default)]
    pub laps: Vec<SourceLap>,
    /// Telemetry samples ordered by offset
    #[serde(default)]
    pub telemetry: Vec<TelemetryPoint>,
}
