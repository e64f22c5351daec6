// ABOUTME: The nine enrichment stages in waterfall order
// ABOUTME: Baseline intervals, track and course snapping, structure tags, walking, strides, zones, totals
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::errors::AppResult;
use runbase_core::models::{
    Interval, IntervalFlags, IntervalProvenance, LocationType, SourceLap,
};
use runbase_intelligence::geometry::{
    estimate_interval_offsets, snap_track_intervals, work_pace_centroid, CourseMatcher, SnapPolicy,
};
use runbase_intelligence::pace_segments::segment_by_pace;
use runbase_intelligence::workout_tagger::{
    adjusted_distance_m, assign_zones, mark_strides, mark_walking, tag_structure,
};
use tracing::debug;
use uuid::Uuid;

use super::{EnrichmentContext, EnrichmentStage, EnrichmentState, RecordEvidence};
use crate::issues::ReconcileIssue;

fn lap_interval(activity_id: Uuid, rep_number: u32, evidence: &RecordEvidence, lap: &SourceLap) -> Interval {
    let mut iv = Interval::new(
        activity_id,
        rep_number,
        IntervalProvenance::for_origin(evidence.record.origin),
    );
    iv.source_record_id = Some(evidence.record.id);
    iv.start_offset_s = lap.start_offset_s;
    iv.end_offset_s = lap.end_offset_s;
    iv.gps_distance_m = lap.distance_m.filter(|d| *d > 0.0);
    iv.duration_s = lap.duration_s.filter(|t| *t > 0.0);
    iv.avg_hr = lap.avg_hr;
    iv.max_hr = lap.max_hr;
    iv.avg_cadence = lap.avg_cadence;
    iv.flags.set(IntervalFlags::RECOVERY, lap.is_rest);
    iv.recompute_pace();
    iv
}

/// Native laps or telemetry pace segments
pub struct BaselineStage;

impl BaselineStage {
    fn from_laps(ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> bool {
        let Some((idx, evidence)) = ctx
            .evidence
            .iter()
            .enumerate()
            .find(|(_, e)| !e.laps.is_empty())
        else {
            return false;
        };
        let taken = state.manual_reps();
        let generated: Vec<Interval> = (1_u32..)
            .zip(&evidence.laps)
            .filter(|(rep, _)| !taken.contains(rep))
            .map(|(rep, lap)| lap_interval(ctx.activity.id, rep, evidence, lap))
            .collect();
        state.intervals.extend(generated);
        state.baseline_record = Some(idx);
        true
    }

    fn from_pace(ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> bool {
        let Some(zones) = ctx.zones else {
            return false;
        };
        let Some((idx, evidence)) = ctx
            .evidence
            .iter()
            .enumerate()
            .find(|(_, e)| e.telemetry.len() >= 2)
        else {
            return false;
        };
        let segments = segment_by_pace(&evidence.telemetry, zones, &ctx.paces.segmentation);
        if segments.is_empty() {
            return false;
        }
        let taken = state.manual_reps();
        let generated: Vec<Interval> = (1_u32..)
            .zip(&segments)
            .filter(|(rep, _)| !taken.contains(rep))
            .map(|(rep, segment)| segment.to_interval(ctx.activity.id, rep, evidence.record.id))
            .collect();
        state.intervals.extend(generated);
        state.baseline_record = Some(idx);
        true
    }
}

impl EnrichmentStage for BaselineStage {
    fn name(&self) -> &'static str {
        "baseline"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        let built = if ctx.is_structured() {
            Self::from_laps(ctx, state)
        } else {
            Self::from_pace(ctx, state) || Self::from_laps(ctx, state)
        };
        if !built {
            debug!(activity_id = %ctx.activity.id, "No laps or telemetry for a baseline");
        }
        state.sort();
        Ok(())
    }
}

/// Track detection over the baseline telemetry and on-track snapping
pub struct TrackStage;

impl EnrichmentStage for TrackStage {
    fn name(&self) -> &'static str {
        "track"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        let telemetry = ctx.telemetry_for(state);
        state.has_gps = telemetry.iter().any(|p| p.position().is_some());
        if !state.has_gps {
            return Ok(());
        }

        let scan = ctx
            .detector
            .detect(telemetry, ctx.known_tracks, Some(ctx.activity.id));
        if let Some(matched) = &scan.matched {
            let window = (matched.start_offset_s, matched.end_offset_s);
            estimate_interval_offsets(&mut state.intervals, telemetry);

            let segmented = state
                .intervals
                .iter()
                .filter(|iv| !iv.is_manual())
                .all(|iv| iv.provenance == IntervalProvenance::PaceSegment);
            if segmented {
                for iv in state.intervals.iter_mut().filter(|iv| !iv.is_manual()) {
                    let overlaps = iv
                        .offsets()
                        .is_some_and(|(start, end)| start < window.1 && end > window.0);
                    if overlaps {
                        iv.location_type = LocationType::Track;
                        iv.location_name = None;
                    }
                }
            } else {
                let policy = SnapPolicy::for_workout(ctx.parsed, ctx.workout_type);
                let snapped = snap_track_intervals(&mut state.intervals, window, &policy);
                debug!(
                    activity_id = %ctx.activity.id,
                    snapped,
                    policy = ?policy,
                    cached = matched.cached,
                    "Track intervals snapped"
                );
            }
        } else if scan.rejected > 0 {
            state.issues.push(ReconcileIssue::GeometryRejected {
                activity_id: ctx.activity.id,
                rejected: scan.rejected,
            });
        }
        state.track_scan = Some(scan);
        Ok(())
    }
}

/// Measured-course snapping for structured sessions
pub struct CourseStage;

impl EnrichmentStage for CourseStage {
    fn name(&self) -> &'static str {
        "measured_course"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        if ctx.is_structured() {
            let telemetry = ctx.telemetry_for(state);
            let matcher = CourseMatcher::new(&ctx.paces.measured_courses, ctx.paces.course_tolerance_pct);
            let fallback = work_pace_centroid(telemetry, ctx.zones);
            let snapped = matcher.apply(&mut state.intervals, telemetry, fallback);
            if snapped > 0 {
                debug!(activity_id = %ctx.activity.id, snapped, "Measured-course intervals snapped");
            }
        }

        if state.has_gps {
            for iv in state
                .intervals
                .iter_mut()
                .filter(|iv| !iv.is_manual() && iv.location_type == LocationType::Unknown)
            {
                iv.location_type = LocationType::Road;
            }
        }
        Ok(())
    }
}

/// Warm-up, work, recovery, cool-down and set numbers
pub struct StructureStage;

impl EnrichmentStage for StructureStage {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        if ctx.is_structured() {
            tag_structure(
                &mut state.intervals,
                ctx.zones,
                ctx.paces.walking_threshold_s_per_km,
            );
        }
        Ok(())
    }
}

/// Walking flags
pub struct WalkingStage;

impl EnrichmentStage for WalkingStage {
    fn name(&self) -> &'static str {
        "walking"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        mark_walking(&mut state.intervals, ctx.paces.walking_threshold_s_per_km);
        Ok(())
    }
}

/// Stride flags
pub struct StrideStage;

impl EnrichmentStage for StrideStage {
    fn name(&self) -> &'static str {
        "strides"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        mark_strides(&mut state.intervals, ctx.paces.stride_max_duration_s);
        Ok(())
    }
}

/// Pace zones from the effective VDOT
pub struct ZoneStage;

impl EnrichmentStage for ZoneStage {
    fn name(&self) -> &'static str {
        "zones"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        if let Some(zones) = ctx.zones {
            assign_zones(&mut state.intervals, zones);
        }
        Ok(())
    }
}

/// Distance excluding walking
pub struct AdjustedDistanceStage;

impl EnrichmentStage for AdjustedDistanceStage {
    fn name(&self) -> &'static str {
        "adjusted_distance"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        state.adjusted_distance_m =
            adjusted_distance_m(&state.intervals).or(ctx.activity.distance_m);
        Ok(())
    }
}

/// VDOT in effect on the activity date
pub struct VdotSnapshotStage;

impl EnrichmentStage for VdotSnapshotStage {
    fn name(&self) -> &'static str {
        "vdot_snapshot"
    }

    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()> {
        state.vdot_snapshot = ctx.vdot;
        Ok(())
    }
}
