// ABOUTME: Snaps intervals run on configured measured courses to their exact surveyed distance
// ABOUTME: Geofence lookup by interval telemetry centroid, closest-distance course choice within tolerance
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::models::{Interval, IntervalProvenance, LocationType, MeasuredCourse, TelemetryPoint};
use tracing::debug;

use super::local::{centroid, haversine_m};
use crate::vdot::ZoneBoundaries;

/// Default allowed distance mismatch between an interval and a course, percent
pub const DEFAULT_COURSE_TOLERANCE_PCT: f64 = 20.0;

/// Matches intervals against configured measured courses
#[derive(Debug, Clone)]
pub struct CourseMatcher<'a> {
    courses: &'a [MeasuredCourse],
    tolerance_pct: f64,
}

impl<'a> CourseMatcher<'a> {
    /// Matcher over a set of courses
    #[must_use]
    pub const fn new(courses: &'a [MeasuredCourse], tolerance_pct: f64) -> Self {
        Self {
            courses,
            tolerance_pct,
        }
    }

    /// Courses whose geofence contains a position
    #[must_use]
    pub fn find_matching_courses(&self, lat: f64, lon: f64) -> Vec<&'a MeasuredCourse> {
        self.courses
            .iter()
            .filter(|c| haversine_m((lat, lon), (c.lat, c.lon)) <= c.radius_m)
            .collect()
    }

    /// Candidate whose snap distance is closest to `distance_m`, within tolerance
    #[must_use]
    pub fn best_course(
        &self,
        candidates: &[&'a MeasuredCourse],
        distance_m: f64,
    ) -> Option<&'a MeasuredCourse> {
        candidates
            .iter()
            .filter(|c| c.snap_distance_m > 0.0)
            .map(|c| {
                let pct = (distance_m - c.snap_distance_m).abs() / c.snap_distance_m * 100.0;
                (*c, pct)
            })
            .filter(|(_, pct)| *pct <= self.tolerance_pct)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
    }

    /// Snap eligible intervals to course distances
    ///
    /// Recovery, manual, pace-segment, and already-located intervals are left
    /// alone. An interval's position is the centroid of its own telemetry when
    /// its offsets came from a device or API; otherwise `fallback_centroid`.
    /// Returns the number of intervals snapped.
    pub fn apply(
        &self,
        intervals: &mut [Interval],
        telemetry: &[TelemetryPoint],
        fallback_centroid: Option<(f64, f64)>,
    ) -> usize {
        if self.courses.is_empty() {
            return 0;
        }

        let mut snapped = 0;
        for interval in intervals.iter_mut() {
            if interval.is_manual()
                || interval.flags.is_recovery()
                || interval.provenance == IntervalProvenance::PaceSegment
                || interval.location_type != LocationType::Unknown
            {
                continue;
            }
            let Some(distance_m) = interval.gps_distance_m.filter(|d| *d > 0.0) else {
                continue;
            };

            let position = if interval.provenance.has_trusted_offsets() {
                interval
                    .offsets()
                    .and_then(|(start, end)| telemetry_centroid(telemetry, start, end))
                    .or(fallback_centroid)
            } else {
                fallback_centroid
            };
            let Some((lat, lon)) = position else {
                continue;
            };

            let candidates = self.find_matching_courses(lat, lon);
            if let Some(course) = self.best_course(&candidates, distance_m) {
                debug!(
                    rep = interval.rep_number,
                    course = %course.name,
                    gps_distance_m = distance_m,
                    snap_distance_m = course.snap_distance_m,
                    "Interval matched measured course"
                );
                interval.canonical_distance_m = Some(course.snap_distance_m);
                interval.location_type = LocationType::MeasuredCourse;
                interval.location_name = Some(course.name.clone());
                interval.recompute_pace();
                snapped += 1;
            }
        }
        snapped
    }
}

/// Centroid of the positioned samples between two offsets
#[must_use]
pub fn telemetry_centroid(telemetry: &[TelemetryPoint], start_s: f64, end_s: f64) -> Option<(f64, f64)> {
    centroid(
        telemetry
            .iter()
            .filter(|p| p.offset_s >= start_s && p.offset_s <= end_s)
            .filter_map(TelemetryPoint::position),
    )
}

/// Centroid of samples run at work pace
///
/// With zone boundaries, work pace is threshold or faster; without them, any
/// sample faster than the stream's median pace.
#[must_use]
pub fn work_pace_centroid(
    telemetry: &[TelemetryPoint],
    zones: Option<&ZoneBoundaries>,
) -> Option<(f64, f64)> {
    let paced: Vec<(f64, (f64, f64))> = telemetry
        .iter()
        .filter_map(|p| Some((p.pace_s_per_km()?, p.position()?)))
        .collect();
    if paced.is_empty() {
        return None;
    }

    let cutoff = if let Some(zones) = zones {
        zones.marathon_threshold
    } else {
        let mut paces: Vec<f64> = paced.iter().map(|(pace, _)| *pace).collect();
        paces.sort_by(f64::total_cmp);
        paces[paces.len() / 2]
    };
    centroid(
        paced
            .iter()
            .filter(|(pace, _)| *pace < cutoff)
            .map(|(_, pos)| *pos),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::local::LocalFrame;
    use runbase_core::models::IntervalFlags;
    use uuid::Uuid;

    fn course(name: &str, lat: f64, lon: f64, snap: f64) -> MeasuredCourse {
        MeasuredCourse {
            name: name.to_owned(),
            lat,
            lon,
            radius_m: 500.0,
            snap_distance_m: snap,
        }
    }

    fn lap(rep: u32, distance: f64, start: f64, end: f64) -> Interval {
        let mut iv = Interval::new(Uuid::new_v4(), rep, IntervalProvenance::DeviceLap);
        iv.gps_distance_m = Some(distance);
        iv.start_offset_s = Some(start);
        iv.end_offset_s = Some(end);
        iv.duration_s = Some(end - start);
        iv
    }

    fn stream_at(lat: f64, lon: f64, seconds: usize) -> Vec<TelemetryPoint> {
        let frame = LocalFrame::new(lat, lon);
        (0..seconds)
            .map(|t| {
                let (p_lat, p_lon) = frame.unproject((t % 50) as f64, 0.0);
                TelemetryPoint {
                    offset_s: t as f64,
                    lat: Some(p_lat),
                    lon: Some(p_lon),
                    distance_m: Some(t as f64 * 4.0),
                    heart_rate: None,
                    cadence: None,
                    speed_mps: Some(4.0),
                }
            })
            .collect()
    }

    #[test]
    fn test_best_course_picks_closest_distance() {
        let courses = vec![
            course("Bridge loop", 45.0, 7.0, 1_000.0),
            course("Bridge mile", 45.0, 7.0, 1_609.344),
        ];
        let matcher = CourseMatcher::new(&courses, DEFAULT_COURSE_TOLERANCE_PCT);
        let candidates = matcher.find_matching_courses(45.0005, 7.0);
        assert_eq!(candidates.len(), 2);
        assert_eq!(matcher.best_course(&candidates, 1_580.0).unwrap().name, "Bridge mile");
        assert_eq!(matcher.best_course(&candidates, 1_050.0).unwrap().name, "Bridge loop");
        assert!(matcher.best_course(&candidates, 2_400.0).is_none());
    }

    #[test]
    fn test_apply_snaps_exactly_and_skips_recovery() {
        let courses = vec![course("Canal K", 45.0, 7.0, 1_000.0)];
        let matcher = CourseMatcher::new(&courses, DEFAULT_COURSE_TOLERANCE_PCT);
        let telemetry = stream_at(45.0, 7.0, 600);

        let work = lap(1, 1_043.0, 0.0, 240.0);
        let mut recovery = lap(2, 980.0, 240.0, 480.0);
        recovery.flags.insert(IntervalFlags::RECOVERY);
        let mut intervals = vec![work, recovery];

        let snapped = matcher.apply(&mut intervals, &telemetry, None);
        assert_eq!(snapped, 1);
        assert_eq!(intervals[0].canonical_distance_m, Some(1_000.0));
        assert_eq!(intervals[0].gps_distance_m, Some(1_043.0));
        assert_eq!(intervals[0].location_type, LocationType::MeasuredCourse);
        assert_eq!(intervals[0].location_name.as_deref(), Some("Canal K"));
        assert!((intervals[0].pace_s_per_km.unwrap() - 240.0).abs() < 1e-9);
        assert_eq!(intervals[1].location_type, LocationType::Unknown);
    }

    #[test]
    fn test_outside_geofence_not_snapped() {
        let courses = vec![course("Canal K", 45.0, 7.0, 1_000.0)];
        let matcher = CourseMatcher::new(&courses, DEFAULT_COURSE_TOLERANCE_PCT);
        let telemetry = stream_at(45.1, 7.0, 600);
        let mut intervals = vec![lap(1, 1_000.0, 0.0, 240.0)];
        assert_eq!(matcher.apply(&mut intervals, &telemetry, None), 0);
        assert!(intervals[0].canonical_distance_m.is_none());
    }

    #[test]
    fn test_log_splits_use_fallback_centroid() {
        let courses = vec![course("Canal K", 45.0, 7.0, 1_000.0)];
        let matcher = CourseMatcher::new(&courses, DEFAULT_COURSE_TOLERANCE_PCT);
        let mut split = lap(1, 1_010.0, 0.0, 240.0);
        split.provenance = IntervalProvenance::LogSplit;
        let mut intervals = vec![split];
        assert_eq!(matcher.apply(&mut intervals, &[], Some((45.0, 7.0))), 1);
    }
}
