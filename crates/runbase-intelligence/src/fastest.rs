// ABOUTME: Ranks the fastest efforts at a target distance across reconciled activities
// ABOUTME: Snapped intervals plus a sliding-window telemetry scan that skips measured reps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Fastest Efforts
//!
//! Two kinds of effort are ranked together by pace:
//!
//! - intervals whose canonical distance is within 3% of the target
//! - for each activity, the quickest telemetry window covering the target
//!   distance
//!
//! A telemetry window whose midpoint falls inside a track rep, a measured
//! course rep, or an interval already at the target distance is skipped, so a
//! measured rep is never counted a second time from GPS. Telemetry efforts
//! faster than 3:00 / mile are GPS glitches and are dropped.

use chrono::NaiveDate;
use rayon::prelude::*;
use runbase_core::constants::limits::{EFFORT_DISTANCE_TOLERANCE, MIN_PLAUSIBLE_PACE_S_PER_KM};
use runbase_core::models::{Interval, LocationType, TelemetryPoint};
use serde::Serialize;
use uuid::Uuid;

/// Where an effort was measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortSource {
    /// A snapped or reviewer-corrected interval
    Interval,
    /// A window of the GPS stream
    Telemetry,
}

impl EffortSource {
    /// Short label for console output
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Telemetry => "telemetry",
        }
    }
}

/// One ranked effort
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FastestEffort {
    /// Activity the effort belongs to
    pub activity_id: Uuid,
    /// Activity date
    pub date: NaiveDate,
    /// Activity title
    pub workout_name: Option<String>,
    /// Time over the distance
    pub duration_s: f64,
    /// Pace in seconds per kilometer
    pub pace_s_per_km: f64,
    /// Interval or telemetry
    pub source: EffortSource,
    /// Rep number for interval efforts
    pub rep_number: Option<u32>,
    /// Seconds from record start, when known
    pub start_offset_s: Option<f64>,
}

/// Search input for one activity
#[derive(Debug, Clone, Copy)]
pub struct ActivityEfforts<'a> {
    /// Activity id
    pub activity_id: Uuid,
    /// Activity date
    pub date: NaiveDate,
    /// Activity title
    pub workout_name: Option<&'a str>,
    /// Stored intervals
    pub intervals: &'a [Interval],
    /// Telemetry of each linked record; streams are never merged
    pub streams: &'a [Vec<TelemetryPoint>],
}

impl ActivityEfforts<'_> {
    fn effort(
        &self,
        source: EffortSource,
        duration_s: f64,
        pace_s_per_km: f64,
        rep_number: Option<u32>,
        start_offset_s: Option<f64>,
    ) -> FastestEffort {
        FastestEffort {
            activity_id: self.activity_id,
            date: self.date,
            workout_name: self.workout_name.map(str::to_owned),
            duration_s,
            pace_s_per_km,
            source,
            rep_number,
            start_offset_s,
        }
    }
}

/// The `top_n` fastest efforts at `target_m`, quickest first
///
/// Every qualifying interval is a candidate; telemetry contributes at most one
/// effort per activity. Ties are broken by date then activity id so repeated
/// searches print the same order.
#[must_use]
pub fn find_fastest(
    target_m: f64,
    top_n: usize,
    activities: &[ActivityEfforts<'_>],
) -> Vec<FastestEffort> {
    if target_m.is_nan() || target_m <= 0.0 || top_n == 0 {
        return Vec::new();
    }
    let tolerance_m = target_m * EFFORT_DISTANCE_TOLERANCE;

    let mut efforts: Vec<FastestEffort> = activities
        .par_iter()
        .flat_map_iter(|activity| {
            interval_efforts(activity, target_m, tolerance_m)
                .into_iter()
                .chain(telemetry_effort(activity, target_m, tolerance_m))
        })
        .collect();

    efforts.sort_by(|a, b| {
        a.pace_s_per_km
            .total_cmp(&b.pace_s_per_km)
            .then(a.date.cmp(&b.date))
            .then(a.activity_id.cmp(&b.activity_id))
    });
    efforts.truncate(top_n);
    efforts
}

fn near_target(interval: &Interval, target_m: f64, tolerance_m: f64) -> bool {
    interval
        .canonical_distance_m
        .is_some_and(|d| (d - target_m).abs() < tolerance_m)
}

fn interval_efforts(
    activity: &ActivityEfforts<'_>,
    target_m: f64,
    tolerance_m: f64,
) -> Vec<FastestEffort> {
    activity
        .intervals
        .iter()
        .filter(|iv| {
            !iv.flags.is_walking() && !iv.flags.is_recovery() && !iv.flags.is_stride()
        })
        .filter(|iv| near_target(iv, target_m, tolerance_m))
        .filter_map(|iv| {
            let duration = iv.duration_s.filter(|t| *t > 0.0)?;
            let distance = iv.canonical_distance_m?;
            Some(activity.effort(
                EffortSource::Interval,
                duration,
                duration / (distance / 1_000.0),
                Some(iv.rep_number),
                iv.start_offset_s,
            ))
        })
        .collect()
}

/// Time ranges a telemetry window must not sit in
fn measured_spans(intervals: &[Interval], target_m: f64, tolerance_m: f64) -> Vec<(f64, f64)> {
    intervals
        .iter()
        .filter(|iv| {
            near_target(iv, target_m, tolerance_m)
                || matches!(
                    iv.location_type,
                    LocationType::Track | LocationType::MeasuredCourse
                )
        })
        .filter_map(Interval::offsets)
        .collect()
}

fn telemetry_effort(
    activity: &ActivityEfforts<'_>,
    target_m: f64,
    tolerance_m: f64,
) -> Option<FastestEffort> {
    let excluded = measured_spans(activity.intervals, target_m, tolerance_m);
    let (start, elapsed) = activity
        .streams
        .iter()
        .filter_map(|stream| {
            let points: Vec<(f64, f64)> = stream
                .iter()
                .filter_map(|p| p.distance_m.map(|d| (p.offset_s, d)))
                .collect();
            fastest_window(&points, target_m, &excluded)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    let pace = elapsed / (target_m / 1_000.0);
    (pace >= MIN_PLAUSIBLE_PACE_S_PER_KM).then(|| {
        activity.effort(EffortSource::Telemetry, elapsed, pace, None, Some(start))
    })
}

/// Quickest span covering `target_m` as `(start_offset_s, elapsed_s)`
///
/// `points` are `(offset_s, cumulative_distance_m)` in time order. The end of
/// each window is interpolated between the two samples straddling the goal
/// distance. Windows whose midpoint lies in an excluded span are skipped.
fn fastest_window(
    points: &[(f64, f64)],
    target_m: f64,
    excluded: &[(f64, f64)],
) -> Option<(f64, f64)> {
    let mut best: Option<(f64, f64)> = None;
    let mut right = 0;

    for (left, &(start, start_distance)) in points.iter().enumerate() {
        let goal = start_distance + target_m;
        right = right.max(left);
        while right + 1 < points.len() && points[right].1 < goal {
            right += 1;
        }
        let (end, end_distance) = points[right];
        if end_distance < goal {
            break;
        }

        let finish = match right.checked_sub(1).map(|i| points[i]) {
            Some((prev, prev_distance)) if end_distance > prev_distance => {
                ((goal - prev_distance) / (end_distance - prev_distance)).mul_add(end - prev, prev)
            }
            _ => end,
        };
        let elapsed = finish - start;
        if elapsed <= 0.0 {
            continue;
        }
        let midpoint = start + elapsed / 2.0;
        if excluded.iter().any(|&(s, e)| s <= midpoint && midpoint <= e) {
            continue;
        }
        if !best.is_some_and(|(_, quickest)| quickest <= elapsed) {
            best = Some((start, elapsed));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use runbase_core::models::{IntervalFlags, IntervalProvenance};

    fn sample(offset_s: f64, distance_m: f64) -> TelemetryPoint {
        TelemetryPoint {
            offset_s,
            lat: None,
            lon: None,
            distance_m: Some(distance_m),
            heart_rate: None,
            cadence: None,
            speed_mps: None,
        }
    }

    /// 1 Hz stream: easy running at 3 m/s with a 400 s block at `fast` m/s
    fn stream_with_block(fast: f64) -> Vec<TelemetryPoint> {
        let mut distance = 0.0;
        (0..1_500)
            .map(|t| {
                let offset = f64::from(t);
                let point = sample(offset, distance);
                distance += if (600..1_000).contains(&t) { fast } else { 3.0 };
                point
            })
            .collect()
    }

    fn track_rep(rep: u32, start: f64, end: f64) -> Interval {
        let mut iv = Interval::new(Uuid::nil(), rep, IntervalProvenance::DeviceLap);
        iv.start_offset_s = Some(start);
        iv.end_offset_s = Some(end);
        iv.duration_s = Some(end - start);
        iv.gps_distance_m = Some(1_590.0);
        iv.canonical_distance_m = Some(1_600.0);
        iv.location_type = LocationType::Track;
        iv.recompute_pace();
        iv
    }

    fn activity<'a>(
        day: u32,
        intervals: &'a [Interval],
        streams: &'a [Vec<TelemetryPoint>],
    ) -> ActivityEfforts<'a> {
        ActivityEfforts {
            activity_id: Uuid::from_u128(u128::from(day)),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            workout_name: Some("mile repeats"),
            intervals,
            streams,
        }
    }

    #[test]
    fn test_window_scan_finds_fast_block() {
        let streams = vec![stream_with_block(4.0)];
        let efforts = find_fastest(1_600.0, 5, &[activity(1, &[], &streams)]);

        assert_eq!(efforts.len(), 1);
        let effort = &efforts[0];
        assert_eq!(effort.source, EffortSource::Telemetry);
        assert!((effort.duration_s - 400.0).abs() < 1e-6);
        assert!((effort.pace_s_per_km - 250.0).abs() < 1e-6);
        assert_eq!(effort.start_offset_s, Some(600.0));
    }

    #[test]
    fn test_measured_rep_is_not_counted_twice() {
        let streams = vec![stream_with_block(4.0)];
        let reps = vec![track_rep(2, 600.0, 1_000.0)];
        let efforts = find_fastest(1_600.0, 5, &[activity(1, &reps, &streams)]);

        assert_eq!(efforts.len(), 2);
        assert_eq!(efforts[0].source, EffortSource::Interval);
        assert_eq!(efforts[0].rep_number, Some(2));
        assert!((efforts[0].pace_s_per_km - 250.0).abs() < 1e-6);

        // The best GPS window left straddles the rep with its midpoint outside it
        let gps = &efforts[1];
        assert_eq!(gps.source, EffortSource::Telemetry);
        let midpoint = gps.start_offset_s.unwrap() + gps.duration_s / 2.0;
        assert!(!(600.0..=1_000.0).contains(&midpoint));
        assert!(gps.duration_s > 400.0);
    }

    #[test]
    fn test_implausible_gps_pace_is_dropped() {
        // 20 m/s is 50 s/km, far beyond any runner
        let glitch = vec![stream_with_block(20.0)];
        assert!(find_fastest(1_600.0, 5, &[activity(1, &[], &glitch)]).is_empty());

        // An interval at the same pace is a reviewer decision and stays
        let mut rep = track_rep(1, 0.0, 80.0);
        rep.provenance = IntervalProvenance::Manual;
        let reps = vec![rep];
        let efforts = find_fastest(1_600.0, 5, &[activity(1, &reps, &[])]);
        assert_eq!(efforts.len(), 1);
        assert_eq!(efforts[0].source, EffortSource::Interval);
    }

    #[test]
    fn test_interval_filters_and_tolerance() {
        let mut walking = track_rep(1, 0.0, 500.0);
        walking.flags.insert(IntervalFlags::WALKING);
        let mut far = track_rep(2, 600.0, 1_000.0);
        far.canonical_distance_m = Some(1_500.0);
        let mut near = track_rep(3, 1_100.0, 1_480.0);
        near.canonical_distance_m = Some(1_609.0);
        let reps = vec![walking, far, near];

        let efforts = find_fastest(1_600.0, 5, &[activity(1, &reps, &[])]);

        assert_eq!(efforts.len(), 1);
        assert_eq!(efforts[0].rep_number, Some(3));
    }

    #[test]
    fn test_ranked_by_pace_and_capped() {
        let slow = vec![stream_with_block(3.5)];
        let quick = vec![stream_with_block(4.5)];
        let middle = vec![stream_with_block(4.0)];
        let activities = [
            activity(1, &[], &slow),
            activity(2, &[], &quick),
            activity(3, &[], &middle),
        ];

        let efforts = find_fastest(1_600.0, 2, &activities);

        assert_eq!(efforts.len(), 2);
        assert_eq!(efforts[0].date.day(), 2);
        assert_eq!(efforts[1].date.day(), 3);
    }

    #[test]
    fn test_short_stream_and_bad_target() {
        let short: Vec<Vec<TelemetryPoint>> =
            vec![(0..10).map(|t| sample(f64::from(t), f64::from(t) * 3.0)).collect()];
        assert!(find_fastest(1_600.0, 5, &[activity(1, &[], &short)]).is_empty());
        let streams = vec![stream_with_block(4.0)];
        assert!(find_fastest(0.0, 5, &[activity(1, &[], &streams)]).is_empty());
        assert!(find_fastest(1_600.0, 0, &[activity(1, &[], &streams)]).is_empty());
    }
}
