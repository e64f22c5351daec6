// ABOUTME: Derives work / recovery segments from telemetry when a source reported no useful laps
// ABOUTME: Rolling-average pace, zone classification, short-segment merging, and per-segment stats
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::models::{Interval, IntervalFlags, IntervalProvenance, PaceZone, TelemetryPoint};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vdot::ZoneBoundaries;

/// Tuning for telemetry segmentation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceSegmentConfig {
    /// Samples in the trailing speed average
    pub smoothing_window: usize,
    /// Segments shorter than this are folded into a neighbour
    pub min_segment_duration_s: f64,
}

impl Default for PaceSegmentConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 30,
            min_segment_duration_s: 10.0,
        }
    }
}

/// A contiguous stretch of telemetry in one pace zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceSegment {
    /// Zone of the smoothed pace
    pub zone: PaceZone,
    /// Seconds from record start
    pub start_offset_s: f64,
    /// Seconds from record start
    pub end_offset_s: f64,
    /// Distance covered, when telemetry carries cumulative distance
    pub distance_m: Option<f64>,
    /// Mean heart rate
    pub avg_hr: Option<f64>,
    /// Peak heart rate
    pub max_hr: Option<f64>,
    /// Mean cadence
    pub avg_cadence: Option<f64>,
    /// Easy or walking stretch between two other segments
    pub is_recovery: bool,
}

impl PaceSegment {
    /// Elapsed time of the segment
    #[must_use]
    pub fn duration_s(&self) -> f64 {
        self.end_offset_s - self.start_offset_s
    }

    /// Convert into an interval row
    #[must_use]
    pub fn to_interval(&self, activity_id: Uuid, rep_number: u32, record_id: Uuid) -> Interval {
        let mut interval = Interval::new(activity_id, rep_number, IntervalProvenance::PaceSegment);
        interval.source_record_id = Some(record_id);
        interval.start_offset_s = Some(self.start_offset_s);
        interval.end_offset_s = Some(self.end_offset_s);
        interval.gps_distance_m = self.distance_m;
        interval.duration_s = Some(self.duration_s());
        interval.avg_hr = self.avg_hr;
        interval.max_hr = self.max_hr;
        interval.avg_cadence = self.avg_cadence;
        interval.pace_zone = Some(self.zone);
        interval.flags.set(IntervalFlags::RECOVERY, self.is_recovery);
        interval.recompute_pace();
        interval
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    zone: PaceZone,
    start: usize,
    end: usize,
}

/// Instantaneous speed per sample, from the device when reported, else from distance deltas
fn sample_speeds(points: &[TelemetryPoint]) -> Vec<Option<f64>> {
    points
        .iter()
        .enumerate()
        .map(|(idx, point)| {
            point.speed_mps.filter(|v| *v >= 0.0).or_else(|| {
                let prev = points.get(idx.checked_sub(1)?)?;
                let dt = point.offset_s - prev.offset_s;
                let dd = point.distance_m? - prev.distance_m?;
                (dt > 0.0).then(|| dd.max(0.0) / dt)
            })
        })
        .collect()
}

/// Trailing mean over the last `window` available samples
fn trailing_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    (0..values.len())
        .map(|idx| {
            let from = (idx + 1).saturating_sub(window);
            let (sum, count) = values[from..=idx]
                .iter()
                .flatten()
                .fold((0.0, 0_u32), |(s, c), v| (s + v, c + 1));
            (count > 0).then(|| sum / f64::from(count))
        })
        .collect()
}

/// Split telemetry into pace-zone segments
///
/// Returns an empty list when fewer than two samples are available.
#[must_use]
pub fn segment_by_pace(
    points: &[TelemetryPoint],
    zones: &ZoneBoundaries,
    config: &PaceSegmentConfig,
) -> Vec<PaceSegment> {
    if points.len() < 2 {
        return Vec::new();
    }

    let smoothed = trailing_mean(&sample_speeds(points), config.smoothing_window);
    let sample_zones: Vec<PaceZone> = smoothed
        .iter()
        .map(|speed| match speed {
            Some(v) if *v > 0.0 => zones.classify(1_000.0 / v),
            _ => PaceZone::Walk,
        })
        .collect();

    let spans = merge_short_spans(
        group_runs(&sample_zones),
        points,
        config.min_segment_duration_s,
    );

    let last = spans.len().saturating_sub(1);
    spans
        .iter()
        .enumerate()
        .map(|(idx, span)| {
            let inner = &points[span.start..=span.end];
            let stats_points = if span.end > span.start {
                &points[span.start..span.end]
            } else {
                inner
            };
            let distance_m = points[span.end]
                .distance_m
                .zip(points[span.start].distance_m)
                .map(|(end, start)| (end - start).max(0.0));
            PaceSegment {
                zone: span.zone,
                start_offset_s: points[span.start].offset_s,
                end_offset_s: points[span.end].offset_s,
                distance_m,
                avg_hr: mean(stats_points.iter().filter_map(|p| p.heart_rate)),
                max_hr: stats_points
                    .iter()
                    .filter_map(|p| p.heart_rate)
                    .reduce(f64::max),
                avg_cadence: mean(stats_points.iter().filter_map(|p| p.cadence)),
                is_recovery: idx != 0
                    && idx != last
                    && matches!(span.zone, PaceZone::Walk | PaceZone::Easy),
            }
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_u32), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / f64::from(count))
}

/// Group consecutive samples of the same zone; each span ends on the first sample of the next
fn group_runs(sample_zones: &[PaceZone]) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    for (idx, zone) in sample_zones.iter().enumerate() {
        match spans.last_mut() {
            Some(span) if span.zone == *zone => span.end = idx,
            Some(span) => {
                span.end = idx;
                spans.push(Span {
                    zone: *zone,
                    start: idx,
                    end: idx,
                });
            }
            None => spans.push(Span {
                zone: *zone,
                start: idx,
                end: idx,
            }),
        }
    }
    spans
}

/// Fold spans shorter than `min_duration_s` into the previous span (or the next, for a leading one)
fn merge_short_spans(spans: Vec<Span>, points: &[TelemetryPoint], min_duration_s: f64) -> Vec<Span> {
    let total = spans.len();
    let mut merged: Vec<Span> = Vec::with_capacity(total);
    let mut carried_start: Option<usize> = None;

    for (idx, mut span) in spans.into_iter().enumerate() {
        if let Some(start) = carried_start.take() {
            span.start = start;
        }
        let duration = points[span.end].offset_s - points[span.start].offset_s;
        if duration < min_duration_s {
            if let Some(prev) = merged.last_mut() {
                prev.end = span.end;
                continue;
            }
            if idx + 1 < total {
                carried_start = Some(span.start);
                continue;
            }
        }
        match merged.last_mut() {
            Some(prev) if prev.zone == span.zone => prev.end = span.end,
            _ => merged.push(span),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry(phases: &[(u32, f64)]) -> Vec<TelemetryPoint> {
        let mut points = Vec::new();
        let mut offset = 0.0;
        let mut distance = 0.0;
        for (seconds, speed) in phases {
            for _ in 0..*seconds {
                points.push(TelemetryPoint {
                    offset_s: offset,
                    lat: None,
                    lon: None,
                    distance_m: Some(distance),
                    heart_rate: Some(if *speed > 3.0 { 170.0 } else { 130.0 }),
                    cadence: None,
                    speed_mps: Some(*speed),
                });
                offset += 1.0;
                distance += speed;
            }
        }
        points
    }

    fn zones() -> ZoneBoundaries {
        ZoneBoundaries::from_vdot(50.0, 410.0).unwrap()
    }

    #[test]
    fn test_work_recovery_work() {
        let points = telemetry(&[(300, 4.0), (120, 2.5), (300, 4.0)]);
        let segments = segment_by_pace(&points, &zones(), &PaceSegmentConfig::default());

        let kinds: Vec<PaceZone> = segments.iter().map(|s| s.zone).collect();
        assert_eq!(
            kinds,
            vec![PaceZone::Threshold, PaceZone::Easy, PaceZone::Threshold]
        );
        assert!(!segments[0].is_recovery);
        assert!(segments[1].is_recovery);
        assert!(!segments[2].is_recovery);

        let covered: f64 = segments.iter().map(PaceSegment::duration_s).sum();
        assert!((covered - 719.0).abs() < 1e-9);
    }

    #[test]
    fn test_steady_run_is_one_segment() {
        let points = telemetry(&[(600, 3.0)]);
        let segments = segment_by_pace(&points, &zones(), &PaceSegmentConfig::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].zone, PaceZone::Easy);
        assert!(!segments[0].is_recovery);
        assert!((segments[0].distance_m.unwrap() - 599.0 * 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_speed_derived_from_distance_when_missing() {
        let mut points = telemetry(&[(200, 4.0)]);
        for p in &mut points {
            p.speed_mps = None;
        }
        let segments = segment_by_pace(&points, &zones(), &PaceSegmentConfig::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].zone, PaceZone::Threshold);
    }

    #[test]
    fn test_interval_conversion_marks_recovery() {
        let points = telemetry(&[(300, 4.0), (120, 2.5), (300, 4.0)]);
        let segments = segment_by_pace(&points, &zones(), &PaceSegmentConfig::default());
        let activity = Uuid::new_v4();
        let interval = segments[1].to_interval(activity, 2, Uuid::new_v4());
        assert_eq!(interval.provenance, IntervalProvenance::PaceSegment);
        assert!(interval.flags.is_recovery());
        assert_eq!(interval.pace_zone, Some(PaceZone::Easy));
    }

    #[test]
    fn test_too_few_points() {
        let points = telemetry(&[(1, 4.0)]);
        assert!(segment_by_pace(&points, &zones(), &PaceSegmentConfig::default()).is_empty());
    }
}
