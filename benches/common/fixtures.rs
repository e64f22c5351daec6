// ABOUTME: Benchmark fixtures generating synthetic GPS telemetry
// ABOUTME: Deterministic oval and road streams for reproducible geometry measurements
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! Benchmark fixtures generating synthetic GPS telemetry.
//!
//! Streams are deterministic so runs are comparable across machines.

use runbase_core::models::TelemetryPoint;
use runbase_intelligence::geometry::local::LocalFrame;
use runbase_intelligence::geometry::track::track_template;

/// Predefined stream lengths for benchmark scenarios
#[derive(Debug, Clone, Copy)]
pub enum StreamLength {
    /// Ten minutes at 1 Hz
    Short,
    /// Forty minutes at 1 Hz
    Medium,
    /// Two hours at 1 Hz
    Long,
}

impl StreamLength {
    #[must_use]
    pub const fn seconds(self) -> usize {
        match self {
            Self::Short => 600,
            Self::Medium => 2_400,
            Self::Long => 7_200,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Short => "10min",
            Self::Medium => "40min",
            Self::Long => "2h",
        }
    }
}

const CENTRE: (f64, f64) = (40.0, -75.0);

/// Alternating fast and slow speed so pace segmentation has work to do
const fn speed_at(t: usize) -> f64 {
    if (t / 90) % 2 == 0 {
        5.0
    } else {
        3.0
    }
}

fn point(t: usize, lat: f64, lon: f64, distance: f64) -> TelemetryPoint {
    #[allow(clippy::cast_precision_loss)]
    let offset_s = t as f64;
    TelemetryPoint {
        offset_s,
        lat: Some(lat),
        lon: Some(lon),
        distance_m: Some(distance),
        heart_rate: Some(150.0),
        cadence: Some(176.0),
        speed_mps: Some(speed_at(t)),
    }
}

/// 1 Hz laps of a 400 m oval
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn oval_stream(length: StreamLength) -> Vec<TelemetryPoint> {
    let frame = LocalFrame::new(CENTRE.0, CENTRE.1);
    let template = track_template();
    let mut distance = 0.0;

    (0..length.seconds())
        .map(|t| {
            distance += speed_at(t);
            let along = (distance % 400.0) / 400.0;
            let (x, y) = template[(along * template.len() as f64) as usize % template.len()];
            let (lat, lon) = frame.unproject(x, y);
            point(t, lat, lon, distance)
        })
        .collect()
}

/// 1 Hz run along a gently curving road that never closes on itself
#[must_use]
pub fn road_stream(length: StreamLength) -> Vec<TelemetryPoint> {
    let frame = LocalFrame::new(CENTRE.0, CENTRE.1);
    let mut distance = 0.0;

    (0..length.seconds())
        .map(|t| {
            distance += speed_at(t);
            let north = 200.0 * (distance / 1_500.0).sin();
            let (lat, lon) = frame.unproject(distance, north);
            point(t, lat, lon, distance)
        })
        .collect()
}
