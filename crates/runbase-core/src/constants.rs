// ABOUTME: Physical constants, standard distances, and validation bounds shared across crates
// ABOUTME: Track geometry, race distances, unit conversions, and parser plausibility limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

/// Unit conversions
pub mod units {
    /// Meters in one statute mile
    pub const METERS_PER_MILE: f64 = 1_609.344;
    /// Meters per degree of latitude (spherical approximation used for local frames)
    pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
    /// Seconds per minute
    pub const SECONDS_PER_MINUTE: f64 = 60.0;
}

/// Standard 400 m track geometry (lane 1 measured 0.3 m from the kerb)
pub mod track {
    /// Length of one straight in meters
    pub const STRAIGHT_LENGTH_M: f64 = 84.39;
    /// Radius of a turn in meters
    pub const TURN_RADIUS_M: f64 = 36.5;
    /// Template points per straight / turn segment
    pub const TEMPLATE_POINTS_PER_SEGMENT: usize = 50;
    /// Intervals shorter than this are treated as strides when no workout context exists
    pub const GENERIC_SNAP_MIN_M: f64 = 180.0;
    /// Intervals longer than this are treated as warm-up / cool-down when no workout context exists
    pub const GENERIC_SNAP_MAX_M: f64 = 1_300.0;
}

/// Race distances in meters
pub mod race {
    use super::units::METERS_PER_MILE;

    /// Half marathon
    pub const HALF_MARATHON_M: f64 = 21_097.5;
    /// Marathon
    pub const MARATHON_M: f64 = 42_195.0;
    /// Two miles
    pub const TWO_MILE_M: f64 = 2.0 * METERS_PER_MILE;

    /// Distances commonly raced, ascending
    pub const COMMON_DISTANCES_M: [f64; 14] = [
        200.0,
        400.0,
        800.0,
        1_500.0,
        METERS_PER_MILE,
        3_000.0,
        3_200.0,
        TWO_MILE_M,
        5_000.0,
        8_000.0,
        10_000.0,
        15_000.0,
        HALF_MARATHON_M,
        MARATHON_M,
    ];
}

/// Plausibility bounds applied to parsed and classified workouts
pub mod limits {
    /// Shortest plausible prescribed distance
    pub const MIN_PRESCRIBED_DISTANCE_M: f64 = 50.0;
    /// Longest plausible prescribed distance
    pub const MAX_PRESCRIBED_DISTANCE_M: f64 = 100_000.0;
    /// Upper bound on repetitions in one set
    pub const MAX_REP_COUNT: u32 = 50;
    /// Walking boundary when no configuration overrides it (11:00 / mile)
    pub const DEFAULT_WALKING_THRESHOLD_S_PER_KM: f64 = 660.0 / 1.609_344;
    /// Laps shorter than this (and not recoveries) are strides
    pub const DEFAULT_STRIDE_MAX_DURATION_S: f64 = 30.0;
    /// Telemetry efforts faster than 3:00 / mile are GPS glitches
    pub const MIN_PLAUSIBLE_PACE_S_PER_KM: f64 = 180.0 / 1.609_344;
    /// Interval distance tolerance when ranking efforts at a target distance
    pub const EFFORT_DISTANCE_TOLERANCE: f64 = 0.03;
}

/// Workout names that sources emit when the athlete did not title the run
pub const GENERIC_WORKOUT_NAMES: &[&str] = &[
    "running",
    "outdoor running",
    "run",
    "morning run",
    "lunch run",
    "afternoon run",
    "evening run",
    "night run",
];

/// Service name used in structured logs
pub const SERVICE_NAME: &str = "runbase";
