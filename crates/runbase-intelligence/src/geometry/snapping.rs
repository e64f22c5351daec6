// ABOUTME: Distance snapping for intervals run inside a detected track window
// ABOUTME: Race, workout, and generic policies plus offset estimation from cumulative telemetry distance
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::constants::track::{GENERIC_SNAP_MAX_M, GENERIC_SNAP_MIN_M};
use runbase_core::models::{Interval, IntervalFlags, LocationType, TelemetryPoint, WorkoutType};

use crate::workout_parser::{closest_race_distance_m, ParsedWorkout};

/// How on-track intervals are snapped
#[derive(Debug, Clone, PartialEq)]
pub enum SnapPolicy {
    /// One race effort
    Race {
        /// Race distance named in the title
        distance_m: Option<f64>,
    },
    /// Repeats of prescribed distances
    Workout {
        /// Distinct prescribed rep distances (may be empty)
        rep_distances: Vec<f64>,
    },
    /// No workout context
    Generic,
}

impl SnapPolicy {
    /// Choose a policy from the parsed title and the resolved workout type
    #[must_use]
    pub fn for_workout(parsed: Option<&ParsedWorkout>, workout_type: Option<WorkoutType>) -> Self {
        let kind = parsed.map(|p| p.workout_type).or(workout_type);
        if kind == Some(WorkoutType::Race) {
            return Self::Race {
                distance_m: parsed.and_then(ParsedWorkout::effort_distance_m),
            };
        }
        match parsed {
            Some(p) if p.is_repeat_workout() => Self::Workout {
                rep_distances: p.rep_distances(),
            },
            _ if matches!(kind, Some(WorkoutType::Interval | WorkoutType::Repetition)) => {
                Self::Workout {
                    rep_distances: Vec::new(),
                }
            }
            _ => Self::Generic,
        }
    }
}

fn round_to_100(distance_m: f64) -> f64 {
    (distance_m / 100.0).round() * 100.0
}

fn nearest(targets: &[f64], distance_m: f64) -> Option<f64> {
    targets
        .iter()
        .copied()
        .min_by(|a, b| (a - distance_m).abs().total_cmp(&(b - distance_m).abs()))
}

/// Snap intervals overlapping a track window
///
/// Every eligible interval (not manual, not recovery, with a GPS distance and
/// offsets overlapping the window) is marked as run on the track and has any
/// earlier snap cleared before the policy applies. The GPS distance is never
/// modified. Returns the number of intervals given a canonical distance.
pub fn snap_track_intervals(
    intervals: &mut [Interval],
    window: (f64, f64),
    policy: &SnapPolicy,
) -> usize {
    let average_pace = average_work_pace(intervals);
    let (window_start, window_end) = window;

    let candidates: Vec<usize> = intervals
        .iter()
        .enumerate()
        .filter(|(_, iv)| !iv.is_manual() && !iv.flags.is_recovery())
        .filter(|(_, iv)| iv.gps_distance_m.is_some_and(|d| d > 0.0))
        .filter(|(_, iv)| {
            iv.offsets()
                .is_some_and(|(start, end)| start < window_end && end > window_start)
        })
        .map(|(idx, _)| idx)
        .collect();

    for &idx in &candidates {
        let iv = &mut intervals[idx];
        iv.location_type = LocationType::Track;
        iv.location_name = None;
        iv.canonical_distance_m = None;
        iv.flags.remove(IntervalFlags::RACE);
    }

    let gps = |iv: &Interval| iv.gps_distance_m.unwrap_or(0.0);
    let mut snapped = 0;
    match policy {
        SnapPolicy::Race { distance_m } => {
            let chosen = distance_m.map_or_else(
                || {
                    candidates
                        .iter()
                        .copied()
                        .max_by(|a, b| gps(&intervals[*a]).total_cmp(&gps(&intervals[*b])))
                        .map(|idx| (idx, closest_race_distance_m(gps(&intervals[idx]))))
                },
                |race| {
                    candidates
                        .iter()
                        .copied()
                        .min_by(|a, b| {
                            (gps(&intervals[*a]) - race)
                                .abs()
                                .total_cmp(&(gps(&intervals[*b]) - race).abs())
                        })
                        .map(|idx| (idx, race))
                },
            );
            if let Some((idx, target)) = chosen {
                let iv = &mut intervals[idx];
                iv.canonical_distance_m = Some(target);
                iv.flags.insert(IntervalFlags::RACE);
                iv.recompute_pace();
                snapped += 1;
            }
        }
        SnapPolicy::Workout { rep_distances } => {
            for &idx in &candidates {
                let iv = &mut intervals[idx];
                let (Some(distance), Some(duration)) = (iv.gps_distance_m, iv.duration_s) else {
                    continue;
                };
                let pace = duration / (distance / 1_000.0);
                if average_pace.is_some_and(|avg| pace >= avg) {
                    continue;
                }
                if let Some(target) = nearest(rep_distances, distance) {
                    iv.prescribed_distance_m = Some(target);
                    iv.canonical_distance_m = Some(target);
                } else {
                    iv.canonical_distance_m = Some(round_to_100(distance));
                }
                iv.recompute_pace();
                snapped += 1;
            }
        }
        SnapPolicy::Generic => {
            for &idx in &candidates {
                let iv = &mut intervals[idx];
                let distance = gps(iv);
                if distance > GENERIC_SNAP_MIN_M && distance <= GENERIC_SNAP_MAX_M {
                    iv.canonical_distance_m = Some(round_to_100(distance));
                    iv.recompute_pace();
                    snapped += 1;
                }
            }
        }
    }
    snapped
}

/// Mean of the per-lap paces of all non-recovery intervals
///
/// Each lap counts once whatever its length, so a long easy warm-up does not
/// drag the threshold towards its own pace.
fn average_work_pace(intervals: &[Interval]) -> Option<f64> {
    let paces: Vec<f64> = intervals
        .iter()
        .filter(|iv| !iv.flags.is_recovery())
        .filter_map(|iv| Some((iv.gps_distance_m?, iv.duration_s?)))
        .filter(|(d, t)| *d > 0.0 && *t > 0.0)
        .map(|(d, t)| t / (d / 1_000.0))
        .collect();
    (!paces.is_empty()).then(|| paces.iter().sum::<f64>() / paces.len() as f64)
}

/// Fill in missing offsets from cumulative interval distance
///
/// Intervals are laid end to end by rep order; each missing start / end is set
/// to the offset of the telemetry sample whose cumulative distance is closest.
/// Manual intervals and intervals that already have offsets are untouched.
pub fn estimate_interval_offsets(intervals: &mut [Interval], telemetry: &[TelemetryPoint]) {
    let stream: Vec<(f64, f64)> = telemetry
        .iter()
        .filter_map(|p| p.distance_m.map(|d| (d, p.offset_s)))
        .collect();
    if stream.is_empty() {
        return;
    }
    let offset_at = |target: f64| {
        let idx = stream.partition_point(|(d, _)| *d < target);
        let after = stream.get(idx);
        let before = idx.checked_sub(1).and_then(|i| stream.get(i));
        match (before, after) {
            (Some(b), Some(a)) if (target - b.0).abs() <= (a.0 - target).abs() => b.1,
            (_, Some(a)) => a.1,
            (Some(b), None) => b.1,
            (None, None) => 0.0,
        }
    };

    let mut cumulative = 0.0;
    for iv in intervals.iter_mut() {
        let distance = iv.gps_distance_m.unwrap_or(0.0).max(0.0);
        if !iv.is_manual() && iv.start_offset_s.is_none() {
            iv.start_offset_s = Some(offset_at(cumulative));
            iv.end_offset_s = Some(offset_at(cumulative + distance));
        }
        cumulative += distance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workout_parser::{ParseOutcome, WorkoutNameParser};
    use runbase_core::models::IntervalProvenance;
    use uuid::Uuid;

    fn lap(rep: u32, distance: f64, duration: f64, start: f64) -> Interval {
        let mut iv = Interval::new(Uuid::nil(), rep, IntervalProvenance::DeviceLap);
        iv.gps_distance_m = Some(distance);
        iv.duration_s = Some(duration);
        iv.start_offset_s = Some(start);
        iv.end_offset_s = Some(start + duration);
        iv.recompute_pace();
        iv
    }

    /// Warm-up on the road, 6 x (400 fast + 200 jog) on the track, cool-down on the road
    fn six_by_400() -> Vec<Interval> {
        let mut laps = vec![lap(1, 1_610.0, 480.0, 0.0)];
        let mut t = 480.0;
        for rep in 0..6 {
            laps.push(lap(2 + rep * 2, 408.0 + f64::from(rep), 80.0, t));
            t += 80.0;
            laps.push(lap(3 + rep * 2, 195.0, 80.0, t));
            t += 80.0;
        }
        laps.push(lap(14, 1_605.0, 480.0, t));
        laps
    }

    fn parsed(title: &str) -> ParsedWorkout {
        match WorkoutNameParser::new().parse(title) {
            ParseOutcome::Parsed(p) => p,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_workout_snaps_only_fast_reps() {
        let mut laps = six_by_400();
        let policy = SnapPolicy::for_workout(Some(&parsed("6x400m")), None);
        let snapped = snap_track_intervals(&mut laps, (480.0, 1_440.0), &policy);

        assert_eq!(snapped, 6);
        for iv in &laps[1..13] {
            assert_eq!(iv.location_type, LocationType::Track);
            if iv.rep_number % 2 == 0 {
                assert_eq!(iv.canonical_distance_m, Some(400.0));
                assert_eq!(iv.prescribed_distance_m, Some(400.0));
                assert!((iv.pace_s_per_km.unwrap() - 200.0).abs() < 1e-9);
            } else {
                assert!(iv.canonical_distance_m.is_none());
            }
            assert!(iv.gps_distance_m.is_some());
        }
        assert_eq!(laps[0].location_type, LocationType::Unknown);
        assert_eq!(laps[13].location_type, LocationType::Unknown);
    }

    #[test]
    fn test_long_easy_lap_counts_once_in_work_threshold() {
        // Lap paces 330, 300, 300, 320 s/km average 312.5; the 8 km lap alone
        // would pull a distance-weighted average to about 323.6
        let mut laps = vec![
            lap(1, 8_000.0, 2_640.0, 0.0),
            lap(2, 1_000.0, 300.0, 2_640.0),
            lap(3, 1_000.0, 300.0, 2_940.0),
            lap(4, 1_000.0, 320.0, 3_240.0),
        ];
        let policy = SnapPolicy::for_workout(Some(&parsed("3x1000m")), None);
        let snapped = snap_track_intervals(&mut laps, (2_640.0, 3_560.0), &policy);

        assert_eq!(snapped, 2);
        assert_eq!(laps[1].canonical_distance_m, Some(1_000.0));
        assert_eq!(laps[2].canonical_distance_m, Some(1_000.0));
        assert!(laps[3].canonical_distance_m.is_none());
        assert_eq!(laps[3].location_type, LocationType::Track);
        assert_eq!(laps[0].location_type, LocationType::Unknown);
    }

    #[test]
    fn test_race_snaps_nearest_interval() {
        let mut laps = vec![lap(1, 1_000.0, 300.0, 0.0), lap(2, 1_622.0, 290.0, 300.0)];
        let policy = SnapPolicy::for_workout(Some(&parsed("Mile TT")), None);
        assert_eq!(snap_track_intervals(&mut laps, (0.0, 600.0), &policy), 1);
        assert!(laps[1].flags.is_race());
        assert!((laps[1].canonical_distance_m.unwrap() - 1_609.344).abs() < 1e-9);
        assert!(!laps[0].flags.is_race());
        assert!(laps[0].canonical_distance_m.is_none());
    }

    #[test]
    fn test_race_without_distance_uses_longest() {
        let mut laps = vec![lap(1, 800.0, 300.0, 0.0), lap(2, 3_020.0, 600.0, 300.0)];
        let policy = SnapPolicy::for_workout(None, Some(WorkoutType::Race));
        snap_track_intervals(&mut laps, (0.0, 900.0), &policy);
        assert_eq!(laps[1].canonical_distance_m, Some(3_000.0));
    }

    #[test]
    fn test_generic_band() {
        let mut laps = vec![
            lap(1, 150.0, 30.0, 0.0),
            lap(2, 812.0, 200.0, 30.0),
            lap(3, 1_609.0, 400.0, 230.0),
        ];
        snap_track_intervals(&mut laps, (0.0, 700.0), &SnapPolicy::Generic);
        assert!(laps[0].canonical_distance_m.is_none());
        assert_eq!(laps[1].canonical_distance_m, Some(800.0));
        assert!(laps[2].canonical_distance_m.is_none());
    }

    #[test]
    fn test_manual_and_out_of_window_untouched() {
        let mut laps = vec![lap(1, 405.0, 80.0, 0.0), lap(2, 405.0, 80.0, 2_000.0)];
        laps[0].provenance = IntervalProvenance::Manual;
        snap_track_intervals(&mut laps, (0.0, 1_000.0), &SnapPolicy::Generic);
        assert_eq!(laps[0].location_type, LocationType::Unknown);
        assert_eq!(laps[1].location_type, LocationType::Unknown);
    }

    #[test]
    fn test_estimate_offsets_from_cumulative_distance() {
        let telemetry: Vec<TelemetryPoint> = (0..=500)
            .map(|t| TelemetryPoint {
                offset_s: f64::from(t),
                lat: None,
                lon: None,
                distance_m: Some(f64::from(t) * 4.0),
                heart_rate: None,
                cadence: None,
                speed_mps: Some(4.0),
            })
            .collect();
        let mut laps = vec![lap(1, 400.0, 100.0, 0.0), lap(2, 800.0, 200.0, 0.0)];
        for iv in &mut laps {
            iv.start_offset_s = None;
            iv.end_offset_s = None;
        }
        estimate_interval_offsets(&mut laps, &telemetry);
        assert_eq!(laps[0].offsets(), Some((0.0, 100.0)));
        assert_eq!(laps[1].offsets(), Some((100.0, 300.0)));
    }
}
