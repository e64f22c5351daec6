// ABOUTME: Pure algorithms behind RunBase interval enrichment
// ABOUTME: Workout name parsing, VDOT pace zones, telemetry segmentation, tagging, GPS geometry, fastest efforts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # RunBase Intelligence
//!
//! Storage-free building blocks used by the enrichment pipeline. Everything here
//! is deterministic for a given input, so re-running enrichment over unchanged
//! data produces unchanged intervals.
//!
//! - [`workout_parser`]: title grammar (`6x400m`, `tempo 4mi`, `5k race 18:45`)
//! - [`classifier`]: async fallback classifier trait and verdict validation
//! - [`vdot`]: VDOT from race results, training paces, zone boundaries
//! - [`pace_segments`]: work / recovery segments from raw telemetry
//! - [`workout_tagger`]: sets, recoveries, walking, strides, zones
//! - [`geometry`]: track detection, measured courses, distance snapping
//! - [`fastest`]: top efforts at a distance from intervals and telemetry

/// Fallback workout classifier
pub mod classifier;
/// Fastest efforts at a target distance
pub mod fastest;
/// GPS geometry matchers
pub mod geometry;
/// Telemetry pace segmentation
pub mod pace_segments;
/// VDOT and pace zones
pub mod vdot;
/// Workout name grammar
pub mod workout_parser;
/// Interval structure heuristics
pub mod workout_tagger;

pub use classifier::{ClassifierVerdict, NoopClassifier, WorkoutClassifier};
pub use fastest::{find_fastest, ActivityEfforts, EffortSource, FastestEffort};
pub use vdot::{TrainingPaces, VdotAlgorithm, ZoneBoundaries};
pub use workout_parser::{ParseOutcome, ParsedWorkout, WorkoutNameParser};
