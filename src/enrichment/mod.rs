// ABOUTME: Enrichment orchestrator turning one canonical activity's evidence into interval rows
// ABOUTME: Ordered stage objects over a shared context plus change-aware interval persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Enrichment Orchestrator
//!
//! [`EnrichmentPipeline`] runs a fixed list of [`EnrichmentStage`]s over an
//! [`EnrichmentContext`]. Stages read the context, mutate the shared
//! [`EnrichmentState`] and never touch storage. The caller persists the
//! result with [`persist_intervals`] inside the activity's transaction.
//!
//! Manual intervals enter the state before the first stage and every stage
//! skips them.

mod stages;

pub use stages::{
    AdjustedDistanceStage, BaselineStage, CourseStage, StrideStage, StructureStage, TrackStage,
    VdotSnapshotStage, WalkingStage, ZoneStage,
};

use std::collections::BTreeMap;

use runbase_core::errors::AppResult;
use runbase_core::models::{
    CanonicalActivity, Interval, RawSourceRecord, SourceLap, TelemetryPoint, WorkoutType,
};
use runbase_intelligence::geometry::{KnownTracks, TrackDetector, TrackScan};
use runbase_intelligence::{ParsedWorkout, ZoneBoundaries};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::config::PaceConfig;
use crate::database::intervals;
use crate::issues::ReconcileIssue;

/// One linked record with its laps and telemetry
#[derive(Debug, Clone)]
pub struct RecordEvidence {
    /// Summary record
    pub record: RawSourceRecord,
    /// Native laps ordered by index
    pub laps: Vec<SourceLap>,
    /// Telemetry ordered by offset
    pub telemetry: Vec<TelemetryPoint>,
}

/// Read-only inputs shared by every stage
pub struct EnrichmentContext<'a> {
    /// Activity being enriched
    pub activity: &'a CanonicalActivity,
    /// Linked records, highest priority first
    pub evidence: &'a [RecordEvidence],
    /// Parsed workout title
    pub parsed: Option<&'a ParsedWorkout>,
    /// Resolved workout classification
    pub workout_type: Option<WorkoutType>,
    /// VDOT in effect on the activity date
    pub vdot: Option<f64>,
    /// Zone boundaries derived from `vdot`
    pub zones: Option<&'a ZoneBoundaries>,
    /// Pace and geometry settings
    pub paces: &'a PaceConfig,
    /// Tracks cached by earlier activities
    pub known_tracks: &'a KnownTracks,
    /// Track detector
    pub detector: &'a TrackDetector,
}

impl EnrichmentContext<'_> {
    /// Whether native laps carry the session's structure
    #[must_use]
    pub fn is_structured(&self) -> bool {
        self.parsed
            .map(|p| p.workout_type)
            .or(self.workout_type)
            .is_some_and(|t| t.is_structured())
            || self.parsed.is_some_and(ParsedWorkout::is_repeat_workout)
    }

    /// Telemetry of the baseline record, else of the first record that has any
    #[must_use]
    pub fn telemetry_for(&self, state: &EnrichmentState) -> &[TelemetryPoint] {
        state
            .baseline_record
            .and_then(|idx| self.evidence.get(idx))
            .filter(|e| !e.telemetry.is_empty())
            .or_else(|| self.evidence.iter().find(|e| !e.telemetry.is_empty()))
            .map(|e| e.telemetry.as_slice())
            .unwrap_or_default()
    }
}

/// Mutable state threaded through the stages
#[derive(Debug, Default)]
pub struct EnrichmentState {
    /// Intervals ordered by rep number, manual rows included
    pub intervals: Vec<Interval>,
    /// Index into the evidence of the record that produced the baseline
    pub baseline_record: Option<usize>,
    /// Track scan of the baseline telemetry
    pub track_scan: Option<TrackScan>,
    /// Whether positioned telemetry was available
    pub has_gps: bool,
    /// Non-fatal findings
    pub issues: Vec<ReconcileIssue>,
    /// Sum of non-walking interval distances
    pub adjusted_distance_m: Option<f64>,
    /// VDOT recorded on the activity
    pub vdot_snapshot: Option<f64>,
}

impl EnrichmentState {
    /// State seeded with the activity's manual intervals
    #[must_use]
    pub fn with_manual(existing: &[Interval]) -> Self {
        Self {
            intervals: existing.iter().filter(|iv| iv.is_manual()).cloned().collect(),
            ..Self::default()
        }
    }

    /// Rep numbers held by manual rows
    #[must_use]
    pub fn manual_reps(&self) -> Vec<u32> {
        self.intervals
            .iter()
            .filter(|iv| iv.is_manual())
            .map(|iv| iv.rep_number)
            .collect()
    }

    /// Keep intervals ordered by rep
    pub fn sort(&mut self) {
        self.intervals.sort_by_key(|iv| iv.rep_number);
    }
}

/// One step of the enrichment waterfall
pub trait EnrichmentStage: Send + Sync {
    /// Stage name used in logs
    fn name(&self) -> &'static str;

    /// Apply the stage
    ///
    /// # Errors
    ///
    /// Returns an error if the stage cannot complete
    fn apply(&self, ctx: &EnrichmentContext<'_>, state: &mut EnrichmentState) -> AppResult<()>;
}

/// Ordered list of stages
pub struct EnrichmentPipeline {
    stages: Vec<Box<dyn EnrichmentStage>>,
}

impl Default for EnrichmentPipeline {
    fn default() -> Self {
        Self::new(vec![
            Box::new(BaselineStage),
            Box::new(TrackStage),
            Box::new(CourseStage),
            Box::new(StructureStage),
            Box::new(WalkingStage),
            Box::new(StrideStage),
            Box::new(ZoneStage),
            Box::new(AdjustedDistanceStage),
            Box::new(VdotSnapshotStage),
        ])
    }
}

impl EnrichmentPipeline {
    /// Pipeline over explicit stages
    #[must_use]
    pub fn new(stages: Vec<Box<dyn EnrichmentStage>>) -> Self {
        Self { stages }
    }

    /// Stage names in execution order
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order
    ///
    /// # Errors
    ///
    /// Returns the first stage error
    pub fn run(
        &self,
        ctx: &EnrichmentContext<'_>,
        existing: &[Interval],
    ) -> AppResult<EnrichmentState> {
        let mut state = EnrichmentState::with_manual(existing);
        for stage in &self.stages {
            stage.apply(ctx, &mut state)?;
            debug!(
                activity_id = %ctx.activity.id,
                stage = stage.name(),
                intervals = state.intervals.len(),
                "Enrichment stage applied"
            );
        }
        state.sort();
        Ok(state)
    }
}

/// Row counts written by [`persist_intervals`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntervalWrites {
    /// Rows inserted or updated
    pub upserted: usize,
    /// Stale rows removed
    pub deleted: usize,
}

/// Store computed intervals, writing only rows that changed
///
/// Manual rows are never overwritten or deleted. Non-manual rows whose rep no
/// longer exists are removed.
///
/// # Errors
///
/// Returns a database error if a write fails
pub async fn persist_intervals(
    conn: &mut SqliteConnection,
    activity_id: Uuid,
    existing: &[Interval],
    computed: &[Interval],
) -> AppResult<IntervalWrites> {
    let stored: BTreeMap<u32, &Interval> = existing.iter().map(|iv| (iv.rep_number, iv)).collect();
    let mut writes = IntervalWrites::default();

    for interval in computed.iter().filter(|iv| !iv.is_manual()) {
        match stored.get(&interval.rep_number) {
            Some(current) if current.is_manual() || *current == interval => {}
            _ => {
                intervals::upsert_interval(&mut *conn, interval).await?;
                writes.upserted += 1;
            }
        }
    }

    for current in existing.iter().filter(|iv| !iv.is_manual()) {
        let still_present = computed.iter().any(|iv| iv.rep_number == current.rep_number);
        if !still_present && intervals::delete_interval(&mut *conn, activity_id, current.rep_number).await? {
            writes.deleted += 1;
        }
    }

    Ok(writes)
}
