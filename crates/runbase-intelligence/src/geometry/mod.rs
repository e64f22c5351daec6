// ABOUTME: Geometry matchers that infer physical context from GPS telemetry
// ABOUTME: Track detection, measured-course geofences, distance snapping, and shared coordinate helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

/// Measured-course matcher
pub mod course;
/// Local meter frames and haversine distance
pub mod local;
/// Polygon Hu moments
pub mod moments;
/// Distance snapping inside a track window
pub mod snapping;
/// Sliding-window track detector
pub mod track;

pub use course::{work_pace_centroid, CourseMatcher, DEFAULT_COURSE_TOLERANCE_PCT};
pub use snapping::{estimate_interval_offsets, snap_track_intervals, SnapPolicy};
pub use track::{KnownTracks, TrackDetectionConfig, TrackDetector, TrackMatch, TrackScan};
