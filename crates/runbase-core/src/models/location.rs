// ABOUTME: Known-location models used by the geometry matchers
// ABOUTME: Cached DetectedTrack registry entries and configured MeasuredCourse geofences
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A track location learned from an earlier activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedTrack {
    /// Storage identifier (0 until persisted)
    pub id: i64,
    /// Centroid latitude
    pub lat: f64,
    /// Centroid longitude
    pub lon: f64,
    /// Long-axis bearing in degrees, `[0, 180)`
    pub orientation_deg: f64,
    /// Shape distance of the detecting window (lower is better)
    pub fit_score: f64,
    /// Detection confidence in `[0, 1]`
    pub confidence: f64,
    /// Activity whose telemetry produced the detection
    pub detected_by_activity_id: Option<Uuid>,
    /// Detection timestamp
    pub detected_at: DateTime<Utc>,
}

/// A configured geofence with an exactly known distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredCourse {
    /// Display name
    pub name: String,
    /// Centre latitude
    pub lat: f64,
    /// Centre longitude
    pub lon: f64,
    /// Geofence radius in meters
    #[serde(default = "default_course_radius_m")]
    pub radius_m: f64,
    /// Exact distance intervals on this course snap to
    pub snap_distance_m: f64,
}

const fn default_course_radius_m() -> f64 {
    500.0
}
