// ABOUTME: Detects running-track laps in GPS telemetry by shape matching sliding windows
// ABOUTME: Convex hull vs 400m oval template via Hu moments, physical bounds, and a known-track cache
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Track Detection
//!
//! Telemetry is cut into overlapping windows. A window is accepted as "on a
//! track" when either its centroid is near a previously detected track, or the
//! convex hull of its positions has the shape and size of a standard 400 m oval:
//!
//! - bounding box no larger than `max_bbox_m` in either direction
//! - I1 Hu-moment distance to the oval template at most `match_score_max`
//! - minimum rotated rectangle with short / long axis and aspect ratio in range
//! - hull area filling at least `min_fill_ratio` of that rectangle
//!
//! Windows are scored in parallel; the choice of winner only depends on window
//! order, never on scheduling.

use std::f64::consts::PI;
use std::sync::LazyLock;

use chrono::Utc;
use geo::{Area, ConvexHull, MinimumRotatedRect, MultiPoint, Point, Polygon};
use rayon::prelude::*;
use runbase_core::constants::track::{
    STRAIGHT_LENGTH_M, TEMPLATE_POINTS_PER_SEGMENT, TURN_RADIUS_M,
};
use runbase_core::models::{DetectedTrack, TelemetryPoint};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::local::{centroid, haversine_m, LocalFrame};
use super::moments::{hu_moments, i1_distance};

/// Tuning for the track detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDetectionConfig {
    /// Positions per window
    pub window_size: usize,
    /// Positions between window starts
    pub window_step: usize,
    /// Largest bounding-box extent in meters
    pub max_bbox_m: f64,
    /// Radius within which a cached track is reused
    pub known_track_radius_m: f64,
    /// Largest acceptable I1 distance to the template
    pub match_score_max: f64,
    /// Fewest hull vertices for a meaningful shape
    pub min_hull_points: usize,
    /// Accepted short-axis range of the rotated rectangle
    pub short_axis_m: (f64, f64),
    /// Accepted long-axis range of the rotated rectangle
    pub long_axis_m: (f64, f64),
    /// Accepted long / short ratio range
    pub aspect_ratio: (f64, f64),
    /// Minimum hull area / rectangle area
    pub min_fill_ratio: f64,
}

impl Default for TrackDetectionConfig {
    fn default() -> Self {
        Self {
            window_size: 300,
            window_step: 50,
            max_bbox_m: 300.0,
            known_track_radius_m: 200.0,
            match_score_max: 0.15,
            min_hull_points: 5,
            short_axis_m: (50.0, 120.0),
            long_axis_m: (120.0, 220.0),
            aspect_ratio: (1.5, 3.0),
            min_fill_ratio: 0.75,
        }
    }
}

/// Registry of tracks detected on earlier runs
#[derive(Debug, Clone, Default)]
pub struct KnownTracks {
    tracks: Vec<DetectedTrack>,
}

impl KnownTracks {
    /// Registry over existing tracks
    #[must_use]
    pub const fn new(tracks: Vec<DetectedTrack>) -> Self {
        Self { tracks }
    }

    /// Closest cached track within `radius_m` of a position
    #[must_use]
    pub fn nearest_within(&self, lat: f64, lon: f64, radius_m: f64) -> Option<&DetectedTrack> {
        self.nearest_index(lat, lon, radius_m)
            .and_then(|idx| self.tracks.get(idx))
    }

    fn nearest_index(&self, lat: f64, lon: f64, radius_m: f64) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(idx, t)| (idx, haversine_m((lat, lon), (t.lat, t.lon))))
            .filter(|(_, d)| *d <= radius_m)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }

    /// Add a newly persisted track so later activities in the run reuse it
    pub fn register(&mut self, track: DetectedTrack) {
        self.tracks.push(track);
    }

    /// Cached tracks
    #[must_use]
    pub fn tracks(&self) -> &[DetectedTrack] {
        &self.tracks
    }
}

/// A detected track segment of one record's telemetry
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMatch {
    /// First second of the on-track range
    pub start_offset_s: f64,
    /// Last second of the on-track range
    pub end_offset_s: f64,
    /// The cached track, or a new one to persist
    pub track: DetectedTrack,
    /// Whether `track` came from the registry
    pub cached: bool,
}

/// Outcome of scanning one telemetry stream
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackScan {
    /// Accepted track range, if any
    pub matched: Option<TrackMatch>,
    /// Windows evaluated
    pub windows: usize,
    /// Windows that passed the size pre-filter but failed shape or bounds checks
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WindowVerdict {
    /// Too large to be a track
    OutOfBounds,
    /// Centroid near a cached track
    Known(usize),
    /// Shape or proportions wrong
    Rejected,
    /// Oval-shaped
    Accepted {
        score: f64,
        lat: f64,
        lon: f64,
        orientation_deg: f64,
    },
}

impl WindowVerdict {
    const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

static TEMPLATE_HU: LazyLock<Option<[f64; 7]>> =
    LazyLock::new(|| hu_moments(&track_template()));

/// Outline of a standard 400 m track centred on the origin, long axis east-west
#[must_use]
pub fn track_template() -> Vec<(f64, f64)> {
    let half = STRAIGHT_LENGTH_M / 2.0;
    let n = TEMPLATE_POINTS_PER_SEGMENT;
    let step = |i: usize| i as f64 / n as f64;
    let mut outline = Vec::with_capacity(4 * n);

    outline.extend((0..n).map(|i| (-half + STRAIGHT_LENGTH_M * step(i), -TURN_RADIUS_M)));
    outline.extend((0..n).map(|i| {
        let angle = -PI / 2.0 + PI * step(i);
        (half + TURN_RADIUS_M * angle.cos(), TURN_RADIUS_M * angle.sin())
    }));
    outline.extend((0..n).map(|i| (half - STRAIGHT_LENGTH_M * step(i), TURN_RADIUS_M)));
    outline.extend((0..n).map(|i| {
        let angle = PI / 2.0 + PI * step(i);
        (-half + TURN_RADIUS_M * angle.cos(), TURN_RADIUS_M * angle.sin())
    }));
    outline
}

/// Sliding-window track detector
#[derive(Debug, Clone, Default)]
pub struct TrackDetector {
    config: TrackDetectionConfig,
}

impl TrackDetector {
    /// Create a detector
    #[must_use]
    pub const fn new(config: TrackDetectionConfig) -> Self {
        Self { config }
    }

    /// Detector configuration
    #[must_use]
    pub const fn config(&self) -> &TrackDetectionConfig {
        &self.config
    }

    /// Scan one record's telemetry for a track segment
    #[must_use]
    pub fn detect(
        &self,
        telemetry: &[TelemetryPoint],
        known: &KnownTracks,
        activity_id: Option<Uuid>,
    ) -> TrackScan {
        let positioned: Vec<(f64, f64, f64)> = telemetry
            .iter()
            .filter_map(|p| p.position().map(|(lat, lon)| (p.offset_s, lat, lon)))
            .collect();

        let size = self.config.window_size.max(3);
        if positioned.len() < size {
            return TrackScan::default();
        }
        let starts: Vec<usize> = (0..=positioned.len() - size)
            .step_by(self.config.window_step.max(1))
            .collect();

        let verdicts: Vec<WindowVerdict> = starts
            .par_iter()
            .map(|&start| self.evaluate_window(&positioned[start..start + size], known))
            .collect();

        let rejected = verdicts
            .iter()
            .filter(|v| matches!(v, WindowVerdict::Rejected))
            .count();
        let window_range = |first: usize, last: usize| {
            (
                positioned[starts[first]].0,
                positioned[starts[last] + size - 1].0,
            )
        };

        let matched = if let Some(first) = verdicts
            .iter()
            .position(|v| matches!(v, WindowVerdict::Known(_)))
        {
            let last = verdicts[first..]
                .iter()
                .take_while(|v| matches!(v, WindowVerdict::Known(_)))
                .count()
                + first
                - 1;
            let WindowVerdict::Known(track_idx) = verdicts[first] else {
                return TrackScan::default();
            };
            known.tracks().get(track_idx).map(|track| {
                let (start_offset_s, end_offset_s) = window_range(first, last);
                debug!(track_id = track.id, start_offset_s, end_offset_s, "Known track reused");
                TrackMatch {
                    start_offset_s,
                    end_offset_s,
                    track: track.clone(),
                    cached: true,
                }
            })
        } else {
            self.best_accepted(&verdicts, activity_id).map(|(best, track)| {
                let first = verdicts[..best]
                    .iter()
                    .rposition(|v| !v.is_accepted())
                    .map_or(0, |idx| idx + 1);
                let last = verdicts[best..]
                    .iter()
                    .take_while(|v| v.is_accepted())
                    .count()
                    + best
                    - 1;
                let (start_offset_s, end_offset_s) = window_range(first, last);
                debug!(
                    score = track.fit_score,
                    lat = track.lat,
                    lon = track.lon,
                    start_offset_s,
                    end_offset_s,
                    "New track detected"
                );
                TrackMatch {
                    start_offset_s,
                    end_offset_s,
                    track,
                    cached: false,
                }
            })
        };

        TrackScan {
            matched,
            windows: verdicts.len(),
            rejected,
        }
    }

    fn best_accepted(
        &self,
        verdicts: &[WindowVerdict],
        activity_id: Option<Uuid>,
    ) -> Option<(usize, DetectedTrack)> {
        let mut best: Option<(usize, f64, f64, f64, f64)> = None;
        for (idx, verdict) in verdicts.iter().enumerate() {
            if let WindowVerdict::Accepted {
                score,
                lat,
                lon,
                orientation_deg,
            } = *verdict
            {
                if best.is_none_or(|(_, best_score, ..)| score < best_score) {
                    best = Some((idx, score, lat, lon, orientation_deg));
                }
            }
        }

        best.map(|(idx, score, lat, lon, orientation_deg)| {
            let confidence = if self.config.match_score_max > 0.0 {
                (1.0 - score / self.config.match_score_max).clamp(0.0, 1.0)
            } else {
                0.0
            };
            (
                idx,
                DetectedTrack {
                    id: 0,
                    lat,
                    lon,
                    orientation_deg,
                    fit_score: score,
                    confidence,
                    detected_by_activity_id: activity_id,
                    detected_at: Utc::now(),
                },
            )
        })
    }

    fn evaluate_window(&self, window: &[(f64, f64, f64)], known: &KnownTracks) -> WindowVerdict {
        let Some((lat, lon)) = centroid(window.iter().map(|(_, lat, lon)| (*lat, *lon))) else {
            return WindowVerdict::OutOfBounds;
        };
        let frame = LocalFrame::new(lat, lon);
        let local: Vec<(f64, f64)> = window
            .iter()
            .map(|(_, p_lat, p_lon)| frame.project(*p_lat, *p_lon))
            .collect();

        let (min_x, max_x, min_y, max_y) = local.iter().fold(
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
            |(a, b, c, d), (x, y)| (a.min(*x), b.max(*x), c.min(*y), d.max(*y)),
        );
        if max_x - min_x > self.config.max_bbox_m || max_y - min_y > self.config.max_bbox_m {
            return WindowVerdict::OutOfBounds;
        }

        if let Some(idx) = known.nearest_index(lat, lon, self.config.known_track_radius_m) {
            return WindowVerdict::Known(idx);
        }

        self.shape_verdict(&local, &frame)
            .unwrap_or(WindowVerdict::Rejected)
    }

    fn shape_verdict(&self, local: &[(f64, f64)], frame: &LocalFrame) -> Option<WindowVerdict> {
        let cloud: MultiPoint<f64> = local.iter().map(|(x, y)| Point::new(*x, *y)).collect();
        let hull: Polygon<f64> = cloud.convex_hull();
        let ring: Vec<(f64, f64)> = hull.exterior().coords().map(|c| (c.x, c.y)).collect();
        // Closed ring repeats its first vertex
        let vertices = &ring[..ring.len().saturating_sub(1)];
        if vertices.len() < self.config.min_hull_points {
            return None;
        }

        let template = TEMPLATE_HU.as_ref()?;
        let score = i1_distance(&hu_moments(vertices)?, template);
        if score > self.config.match_score_max {
            return None;
        }

        let rect = hull.minimum_rotated_rect()?;
        let corners: Vec<(f64, f64)> = rect.exterior().coords().map(|c| (c.x, c.y)).collect();
        if corners.len() < 3 {
            return None;
        }
        let edge_a = (corners[1].0 - corners[0].0, corners[1].1 - corners[0].1);
        let edge_b = (corners[2].0 - corners[1].0, corners[2].1 - corners[1].1);
        let (len_a, len_b) = (edge_a.0.hypot(edge_a.1), edge_b.0.hypot(edge_b.1));
        let (short, long, long_edge) = if len_a >= len_b {
            (len_b, len_a, edge_a)
        } else {
            (len_a, len_b, edge_b)
        };
        if short <= 0.0 {
            return None;
        }

        let within = |value: f64, (lo, hi): (f64, f64)| (lo..=hi).contains(&value);
        let fill = hull.unsigned_area() / (short * long);
        if !within(short, self.config.short_axis_m)
            || !within(long, self.config.long_axis_m)
            || !within(long / short, self.config.aspect_ratio)
            || fill < self.config.min_fill_ratio
        {
            return None;
        }

        // Bearing of the long axis, clockwise from north, folded into [0, 180)
        let orientation_deg = long_edge.0.atan2(long_edge.1).to_degrees().rem_euclid(180.0);
        let (lat, lon) = frame.unproject(0.0, 0.0);
        Some(WindowVerdict::Accepted {
            score,
            lat,
            lon,
            orientation_deg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: (f64, f64) = (40.0, -75.0);

    /// Positions running laps of a 400 m oval at `speed` m/s, sampled at 1 Hz
    fn track_laps(seconds: usize, speed: f64, rotation_deg: f64) -> Vec<TelemetryPoint> {
        let frame = LocalFrame::new(BASE.0, BASE.1);
        let template = track_template();
        let perimeter: f64 = template
            .iter()
            .zip(template.iter().cycle().skip(1))
            .map(|(a, b)| (b.0 - a.0).hypot(b.1 - a.1))
            .sum();
        let (sin, cos) = rotation_deg.to_radians().sin_cos();
        (0..seconds)
            .map(|t| {
                let along = (t as f64 * speed) % perimeter;
                let idx = ((along / perimeter) * template.len() as f64) as usize % template.len();
                let (x, y) = template[idx];
                let (rx, ry) = (x.mul_add(cos, -y * sin), x.mul_add(sin, y * cos));
                let (lat, lon) = frame.unproject(rx, ry);
                TelemetryPoint {
                    offset_s: t as f64,
                    lat: Some(lat),
                    lon: Some(lon),
                    distance_m: Some(t as f64 * speed),
                    heart_rate: None,
                    cadence: None,
                    speed_mps: Some(speed),
                }
            })
            .collect()
    }

    fn road_run(seconds: usize) -> Vec<TelemetryPoint> {
        let frame = LocalFrame::new(BASE.0, BASE.1);
        (0..seconds)
            .map(|t| {
                let (lat, lon) = frame.unproject(t as f64 * 3.0, (t as f64 / 40.0).sin() * 20.0);
                TelemetryPoint {
                    offset_s: t as f64,
                    lat: Some(lat),
                    lon: Some(lon),
                    distance_m: Some(t as f64 * 3.0),
                    heart_rate: None,
                    cadence: None,
                    speed_mps: Some(3.0),
                }
            })
            .collect()
    }

    #[test]
    fn test_template_is_a_400m_oval() {
        let template = track_template();
        assert_eq!(template.len(), 4 * TEMPLATE_POINTS_PER_SEGMENT);
        let perimeter: f64 = template
            .iter()
            .zip(template.iter().cycle().skip(1))
            .map(|(a, b)| (b.0 - a.0).hypot(b.1 - a.1))
            .sum();
        assert!((perimeter - 398.0).abs() < 5.0);
    }

    #[test]
    fn test_detects_new_track() {
        let telemetry = track_laps(600, 4.0, 25.0);
        let scan = TrackDetector::default().detect(&telemetry, &KnownTracks::default(), None);
        let matched = scan.matched.unwrap();
        assert!(!matched.cached);
        assert!(matched.track.fit_score <= 0.15);
        assert!(matched.track.confidence > 0.0);
        assert!(haversine_m((matched.track.lat, matched.track.lon), BASE) < 30.0);
        assert!((matched.end_offset_s - matched.start_offset_s) >= 299.0);
    }

    #[test]
    fn test_known_track_dominates() {
        let telemetry = track_laps(400, 4.0, 0.0);
        let known = KnownTracks::new(vec![DetectedTrack {
            id: 7,
            lat: BASE.0,
            lon: BASE.1,
            orientation_deg: 90.0,
            fit_score: 0.01,
            confidence: 0.9,
            detected_by_activity_id: None,
            detected_at: Utc::now(),
        }]);
        let scan = TrackDetector::default().detect(&telemetry, &known, None);
        let matched = scan.matched.unwrap();
        assert!(matched.cached);
        assert_eq!(matched.track.id, 7);
        assert!((matched.start_offset_s - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_road_run_not_a_track() {
        let scan = TrackDetector::default().detect(&road_run(900), &KnownTracks::default(), None);
        assert!(scan.matched.is_none());
        assert!(scan.windows > 0);
    }

    #[test]
    fn test_short_stream_skipped() {
        let scan =
            TrackDetector::default().detect(&track_laps(120, 4.0, 0.0), &KnownTracks::default(), None);
        assert_eq!(scan, TrackScan::default());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let telemetry = track_laps(900, 4.0, 60.0);
        let detector = TrackDetector::default();
        let a = detector.detect(&telemetry, &KnownTracks::default(), None).matched.unwrap();
        let b = detector.detect(&telemetry, &KnownTracks::default(), None).matched.unwrap();
        assert!((a.start_offset_s - b.start_offset_s).abs() < f64::EPSILON);
        assert!((a.end_offset_s - b.end_offset_s).abs() < f64::EPSILON);
        assert!((a.track.fit_score - b.track.fit_score).abs() < f64::EPSILON);
    }
}
