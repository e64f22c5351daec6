// ABOUTME: Heuristic interval markers: warm-up / work / recovery / cool-down, sets, walking, strides
// ABOUTME: Operates on lap-derived intervals of structured sessions and never touches manual rows
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::constants::units::METERS_PER_MILE;
use runbase_core::models::{Interval, IntervalFlags, IntervalProvenance, PaceZone};

use crate::vdot::ZoneBoundaries;

/// Recoveries at least this long (0.3 mi) separate sets
const SET_BREAK_DISTANCE_M: f64 = 0.3 * METERS_PER_MILE;

/// Recoveries at least this multiple of the median recovery separate sets
const SET_BREAK_DURATION_FACTOR: f64 = 2.0;

fn is_walking_pace(interval: &Interval, walking_threshold_s_per_km: f64) -> bool {
    interval
        .pace_s_per_km
        .is_some_and(|pace| pace >= walking_threshold_s_per_km)
}

/// Mark warm-up, work, recovery, and cool-down laps and number the sets
///
/// Work laps are those in a work zone when zone boundaries are known, or faster
/// than the session's average pace otherwise. Laps before the first work lap
/// (warm-up) and after the last (cool-down) get no set and are not recoveries.
/// Between them, non-work laps are recoveries. A recovery that is walked, at
/// least twice the median recovery duration, or at least 0.3 mi long closes
/// the current set.
///
/// Manual rows count towards the structure but keep their own flags and set.
/// Sessions that already carry pace segments, or have fewer than two laps, are
/// left unchanged.
pub fn tag_structure(
    intervals: &mut [Interval],
    zones: Option<&ZoneBoundaries>,
    walking_threshold_s_per_km: f64,
) {
    if intervals
        .iter()
        .any(|iv| iv.provenance == IntervalProvenance::PaceSegment)
    {
        return;
    }
    let lap_idx: Vec<usize> = (0..intervals.len()).collect();
    if lap_idx.len() < 2 {
        return;
    }

    let average_pace = {
        let (d, t) = lap_idx
            .iter()
            .filter_map(|&i| Some((intervals[i].gps_distance_m?, intervals[i].duration_s?)))
            .fold((0.0, 0.0), |(sd, st), (d, t)| (sd + d, st + t));
        (d > 0.0).then(|| t / (d / 1_000.0))
    };
    let is_work = |iv: &Interval| match (iv.pace_s_per_km, zones) {
        (Some(pace), Some(z)) => z.classify(pace).is_work(),
        (Some(pace), None) => average_pace.is_some_and(|avg| pace < avg),
        (None, _) => false,
    };

    let work: Vec<bool> = lap_idx.iter().map(|&i| is_work(&intervals[i])).collect();
    let (Some(first), Some(last)) = (
        work.iter().position(|w| *w),
        work.iter().rposition(|w| *w),
    ) else {
        return;
    };

    for (pos, &i) in lap_idx.iter().enumerate() {
        let iv = &mut intervals[i];
        if iv.is_manual() {
            continue;
        }
        iv.set_number = None;
        iv.flags
            .set(IntervalFlags::RECOVERY, pos > first && pos < last && !work[pos]);
    }

    let mut recovery_durations: Vec<f64> = lap_idx[first..=last]
        .iter()
        .zip(&work[first..=last])
        .filter(|(_, w)| !**w)
        .filter_map(|(&i, _)| intervals[i].duration_s)
        .collect();
    recovery_durations.sort_by(f64::total_cmp);
    let median_recovery = recovery_durations.get(recovery_durations.len() / 2).copied();

    let mut set = 1;
    for (&i, &is_work_lap) in lap_idx[first..=last].iter().zip(&work[first..=last]) {
        let iv = &mut intervals[i];
        let manual = iv.is_manual();
        if is_work_lap || median_recovery.is_none() {
            if !manual {
                iv.set_number = Some(set);
            }
            continue;
        }
        let walked = is_walking_pace(iv, walking_threshold_s_per_km)
            || zones.is_some_and(|z| {
                iv.pace_s_per_km
                    .is_some_and(|pace| z.classify(pace) == PaceZone::Walk)
            });
        let long = median_recovery.is_some_and(|median| {
            iv.duration_s
                .is_some_and(|d| d >= SET_BREAK_DURATION_FACTOR * median)
        });
        let far = iv.gps_distance_m.is_some_and(|d| d >= SET_BREAK_DISTANCE_M);
        if walked || long || far {
            if !manual {
                iv.set_number = None;
            }
            set += 1;
        } else if !manual {
            iv.set_number = Some(set);
        }
    }
}

/// Flag intervals at or slower than the walking threshold
pub fn mark_walking(intervals: &mut [Interval], walking_threshold_s_per_km: f64) {
    for iv in intervals.iter_mut().filter(|iv| !iv.is_manual()) {
        let walking = is_walking_pace(iv, walking_threshold_s_per_km);
        iv.flags.set(IntervalFlags::WALKING, walking);
    }
}

/// Flag short, non-recovery laps as strides
pub fn mark_strides(intervals: &mut [Interval], max_duration_s: f64) {
    for iv in intervals.iter_mut().filter(|iv| !iv.is_manual()) {
        let stride = iv.provenance != IntervalProvenance::PaceSegment
            && !iv.flags.is_recovery()
            && iv.duration_s.is_some_and(|d| d > 0.0 && d < max_duration_s);
        iv.flags.set(IntervalFlags::STRIDE, stride);
    }
}

/// Assign pace zones to intervals that have none
///
/// Walking intervals always get the walk zone.
pub fn assign_zones(intervals: &mut [Interval], zones: &ZoneBoundaries) {
    for iv in intervals.iter_mut().filter(|iv| !iv.is_manual()) {
        if iv.pace_zone.is_some() {
            continue;
        }
        iv.pace_zone = if iv.flags.is_walking() {
            Some(PaceZone::Walk)
        } else {
            iv.pace_s_per_km.map(|pace| zones.classify(pace))
        };
    }
}

/// Sum of non-walking interval distances (canonical, else GPS)
///
/// Returns `None` when no interval carries a distance, so callers can fall
/// back to the activity distance.
#[must_use]
pub fn adjusted_distance_m(intervals: &[Interval]) -> Option<f64> {
    let distances: Vec<f64> = intervals
        .iter()
        .filter(|iv| !iv.flags.is_walking())
        .filter_map(Interval::effective_distance_m)
        .collect();
    if distances.is_empty() {
        None
    } else {
        Some(distances.iter().sum())
    }
}
