// ABOUTME: Domain model re-exports for sources, activities, conflicts, intervals, and locations
// ABOUTME: Shared by the intelligence crate and the storage / pipeline layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

/// Canonical activity and resolvable fields
pub mod activity;
/// Field conflicts
pub mod conflict;
/// Intervals, zones, and markers
pub mod interval;
/// Known tracks and measured courses
pub mod location;
/// Raw per-source observations
pub mod source;
/// Workout classification and fitness history
pub mod workout;

pub use activity::{ActivityField, ActivityOverride, CanonicalActivity, FieldKind, FieldValue};
pub use conflict::{Conflict, ConflictStatus, SourceValue};
pub use interval::{Interval, IntervalFlags, IntervalProvenance, LocationType, PaceZone};
pub use location::{DetectedTrack, MeasuredCourse};
pub use source::{RawSourceRecord, RecordBundle, SourceLap, SourceOrigin, TelemetryPoint};
pub use workout::{VdotEntry, WorkoutType};
