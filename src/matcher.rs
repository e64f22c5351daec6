// ABOUTME: Source matcher deciding which raw records describe the same real-world run
// ABOUTME: Pure planner for one-to-one, group, and promotion passes plus the store-side plan application
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Source Matcher
//!
//! [`MatchPlanner`] looks at unlinked records and the activities near their
//! dates and emits one [`MatchDecision`] per record it can place:
//!
//! 1. one-to-one: the activity with the smallest
//!    `day_delta * distance_tolerance_pct + distance_delta_pct` score
//! 2. group: same-day records of one origin whose distances sum to an activity
//! 3. promotion: everything else becomes a new activity, in origin priority
//!    order, matching earlier promotions one-to-one first
//!
//! Ties leave the record unlinked with an [`ReconcileIssue::AmbiguousMatch`].
//! Planning is pure; [`apply_decision`] performs the guarded link.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use runbase_core::errors::{AppError, AppResult, ErrorCode};
use runbase_core::models::{CanonicalActivity, RawSourceRecord, SourceOrigin};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::database::records;
use crate::issues::ReconcileIssue;
use crate::logging::AppLogger;

/// Scores closer than this are ties
const SCORE_EPSILON: f64 = 1e-9;

/// Summary of an existing activity used for matching
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// Activity id
    pub id: Uuid,
    /// Activity date
    pub date: NaiveDate,
    /// Canonical distance
    pub distance_m: Option<f64>,
    /// Origins already linked
    pub origins: BTreeSet<SourceOrigin>,
}

impl MatchCandidate {
    /// Build from an activity and its linked origins
    #[must_use]
    pub fn from_activity(activity: &CanonicalActivity, origins: BTreeSet<SourceOrigin>) -> Self {
        Self {
            id: activity.id,
            date: activity.date,
            distance_m: activity.distance_m,
            origins,
        }
    }
}

/// Where a record goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityRef {
    /// An activity already in the store
    Existing(Uuid),
    /// The n-th activity promoted by this plan
    New(usize),
}

/// Which pass placed the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Single record matched an activity
    OneToOne,
    /// Part of a record group matched an activity
    Group,
    /// Seeded a new activity
    Promoted,
}

impl MatchKind {
    /// Log label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::Group => "group",
            Self::Promoted => "promoted",
        }
    }
}

/// Placement of one record
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    /// Record
    pub record_id: Uuid,
    /// Target activity
    pub target: ActivityRef,
    /// Pass that placed it
    pub kind: MatchKind,
    /// Match score (0 for promotions)
    pub score: f64,
}

/// An activity to create
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedActivity {
    /// Id assigned up front so issues and logs can name it
    pub id: Uuid,
    /// Date of the seeding record
    pub date: NaiveDate,
    /// Seeding record
    pub seed_record_id: Uuid,
}

/// Output of one planning pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPlan {
    /// One decision per placed record
    pub decisions: Vec<MatchDecision>,
    /// Activities to create, indexed by [`ActivityRef::New`]
    pub new_activities: Vec<PlannedActivity>,
    /// Ambiguous records
    pub issues: Vec<ReconcileIssue>,
}

impl MatchPlan {
    /// Decisions grouped by target, in a stable order
    #[must_use]
    pub fn by_target(&self) -> BTreeMap<ActivityRef, Vec<&MatchDecision>> {
        let mut grouped: BTreeMap<ActivityRef, Vec<&MatchDecision>> = BTreeMap::new();
        for decision in &self.decisions {
            grouped.entry(decision.target).or_default().push(decision);
        }
        grouped
    }

    /// Concrete activity id behind a reference
    #[must_use]
    pub fn activity_id(&self, target: ActivityRef) -> Option<Uuid> {
        match target {
            ActivityRef::Existing(id) => Some(id),
            ActivityRef::New(n) => self.new_activities.get(n).map(|p| p.id),
        }
    }
}

enum Best {
    None,
    One(usize, f64),
    Tied(Vec<usize>, f64),
}

#[derive(Debug, Clone)]
struct Slot {
    target: ActivityRef,
    activity_id: Uuid,
    date: NaiveDate,
    distance_m: Option<f64>,
    origins: BTreeSet<SourceOrigin>,
}

/// Working state of one planning pass
#[derive(Default)]
struct Planning {
    slots: Vec<Slot>,
    plan: MatchPlan,
    placed: BTreeSet<usize>,
    ambiguous: BTreeSet<usize>,
}

impl Planning {
    fn is_settled(&self, idx: usize) -> bool {
        self.placed.contains(&idx) || self.ambiguous.contains(&idx)
    }

    fn place(
        &mut self,
        record: &RawSourceRecord,
        idx: usize,
        slot_idx: usize,
        kind: MatchKind,
        score: f64,
    ) {
        let slot = &mut self.slots[slot_idx];
        slot.origins.insert(record.origin);
        self.plan.decisions.push(MatchDecision {
            record_id: record.id,
            target: slot.target,
            kind,
            score,
        });
        self.placed.insert(idx);
    }

    /// Leave a record unlinked and report the tied activities
    fn mark_ambiguous(&mut self, record_id: Uuid, idx: usize, tied: &[usize]) {
        self.plan.issues.push(ReconcileIssue::AmbiguousMatch {
            record_id,
            candidates: tied
                .iter()
                .filter_map(|&i| self.slots.get(i).map(|slot| slot.activity_id))
                .collect(),
        });
        self.ambiguous.insert(idx);
    }
}

/// Pure record-to-activity planner
#[derive(Debug, Clone)]
pub struct MatchPlanner<'a> {
    config: &'a MatchingConfig,
    priority: &'a [SourceOrigin],
}

impl<'a> MatchPlanner<'a> {
    /// Planner with tolerances and the promotion order
    #[must_use]
    pub const fn new(config: &'a MatchingConfig, priority: &'a [SourceOrigin]) -> Self {
        Self { config, priority }
    }

    fn rank(&self, origin: SourceOrigin) -> usize {
        self.priority
            .iter()
            .position(|o| *o == origin)
            .unwrap_or(self.priority.len())
    }

    /// Record date for planning, falling back to the import day
    fn record_date(record: &RawSourceRecord) -> NaiveDate {
        record
            .effective_date()
            .unwrap_or_else(|| record.imported_at.date_naive())
    }

    fn one_to_one_score(&self, record: &RawSourceRecord, slot: &Slot) -> Option<f64> {
        if slot.origins.contains(&record.origin) {
            return None;
        }
        let date = record.effective_date()?;
        let distance = record.usable_distance()?;
        let target = slot.distance_m.filter(|d| *d > 0.0)?;
        let days = (date - slot.date).num_days().abs();
        if days > self.config.day_tolerance {
            return None;
        }
        let pct = (distance - target).abs() / target * 100.0;
        if pct > self.config.distance_tolerance_pct {
            return None;
        }
        Some(days as f64 * self.config.distance_tolerance_pct + pct)
    }

    fn best(scores: impl Iterator<Item = (usize, f64)>) -> Best {
        let mut best = Best::None;
        for (idx, score) in scores {
            best = match best {
                Best::None => Best::One(idx, score),
                Best::One(b, s) if (score - s).abs() < SCORE_EPSILON => {
                    Best::Tied(vec![b, idx], s)
                }
                Best::One(_, s) if score < s => Best::One(idx, score),
                Best::Tied(mut tied, s) if (score - s).abs() < SCORE_EPSILON => {
                    tied.push(idx);
                    Best::Tied(tied, s)
                }
                Best::Tied(_, s) if score < s => Best::One(idx, score),
                kept => kept,
            };
        }
        best
    }

    /// Plan placements for unlinked records against existing activities
    #[must_use]
    pub fn plan(&self, records: &[RawSourceRecord], existing: &[MatchCandidate]) -> MatchPlan {
        let mut state = Planning {
            slots: existing
                .iter()
                .map(|c| Slot {
                    target: ActivityRef::Existing(c.id),
                    activity_id: c.id,
                    date: c.date,
                    distance_m: c.distance_m,
                    origins: c.origins.clone(),
                })
                .collect(),
            ..Planning::default()
        };

        let mut order: Vec<usize> = (0..records.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&records[a], &records[b]);
            Self::record_date(ra)
                .cmp(&Self::record_date(rb))
                .then(self.rank(ra.origin).cmp(&self.rank(rb.origin)))
                .then(ra.imported_at.cmp(&rb.imported_at))
                .then(ra.external_id.cmp(&rb.external_id))
        });

        // Pass 1: one-to-one against existing activities
        for &idx in &order {
            if records[idx].is_matchable() {
                self.match_one(records, idx, 0, &mut state);
            }
        }

        // Pass 2: same-day, same-origin groups summing to an existing activity
        self.match_groups(records, &order, 0, &mut state);

        // Pass 3: promotion in priority order; each origin first tries the
        // activities promoted before it, one-to-one and then as groups
        let mut remaining: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&idx| !state.is_settled(idx))
            .collect();
        remaining.sort_by(|&a, &b| {
            let (ra, rb) = (&records[a], &records[b]);
            self.rank(ra.origin)
                .cmp(&self.rank(rb.origin))
                .then(Self::record_date(ra).cmp(&Self::record_date(rb)))
                .then(ra.imported_at.cmp(&rb.imported_at))
                .then(ra.external_id.cmp(&rb.external_id))
        });
        let first_new_slot = state.slots.len();
        let same_origin =
            |a: &usize, b: &usize| self.rank(records[*a].origin) == self.rank(records[*b].origin);
        for batch in remaining.chunk_by(same_origin) {
            for &idx in batch {
                if records[idx].is_matchable() {
                    self.match_one(records, idx, first_new_slot, &mut state);
                }
            }
            self.match_groups(records, batch, first_new_slot, &mut state);
            for &idx in batch {
                if !state.is_settled(idx) {
                    Self::promote(&records[idx], idx, &mut state);
                }
            }
        }

        let plan = state.plan;
        debug!(
            records = records.len(),
            decisions = plan.decisions.len(),
            new_activities = plan.new_activities.len(),
            ambiguous = plan.issues.len(),
            "Match plan built"
        );
        plan
    }

    /// Place one record on its best slot at or after `first_slot`
    fn match_one(
        &self,
        records: &[RawSourceRecord],
        idx: usize,
        first_slot: usize,
        state: &mut Planning,
    ) {
        let record = &records[idx];
        match self.best_slot(record, &state.slots[first_slot..]) {
            Best::None => {}
            Best::One(offset, score) => {
                state.place(record, idx, first_slot + offset, MatchKind::OneToOne, score);
            }
            Best::Tied(tied, _) => {
                let tied: Vec<usize> = tied.iter().map(|t| t + first_slot).collect();
                state.mark_ambiguous(record.id, idx, &tied);
            }
        }
    }

    /// Link same-day groups of one origin whose summed distance fits a slot
    fn match_groups(
        &self,
        records: &[RawSourceRecord],
        candidates: &[usize],
        first_slot: usize,
        state: &mut Planning,
    ) {
        let mut groups: BTreeMap<(NaiveDate, usize), Vec<usize>> = BTreeMap::new();
        for &idx in candidates {
            let record = &records[idx];
            if state.is_settled(idx) || !record.is_matchable() {
                continue;
            }
            if let Some(date) = record.effective_date() {
                groups
                    .entry((date, self.rank(record.origin)))
                    .or_default()
                    .push(idx);
            }
        }

        for ((date, _), members) in groups {
            if members.len() < 2 {
                continue;
            }
            let origin = records[members[0]].origin;
            let total: f64 = members
                .iter()
                .filter_map(|&i| records[i].usable_distance())
                .sum();
            let scored = state.slots[first_slot..]
                .iter()
                .enumerate()
                .filter_map(|(offset, slot)| {
                    if slot.date != date || slot.origins.contains(&origin) {
                        return None;
                    }
                    let target = slot.distance_m.filter(|d| *d > 0.0)?;
                    let pct = (total - target).abs() / target * 100.0;
                    (pct <= self.config.group_distance_tolerance_pct)
                        .then_some((first_slot + offset, pct))
                });
            match Self::best(scored) {
                Best::None => {}
                Best::One(slot_idx, score) => {
                    for &idx in &members {
                        state.place(&records[idx], idx, slot_idx, MatchKind::Group, score);
                    }
                }
                Best::Tied(tied, _) => {
                    for &idx in &members {
                        state.mark_ambiguous(records[idx].id, idx, &tied);
                    }
                }
            }
        }
    }

    /// Seed a new activity from a record
    fn promote(record: &RawSourceRecord, idx: usize, state: &mut Planning) {
        let target = ActivityRef::New(state.plan.new_activities.len());
        let date = Self::record_date(record);
        let activity_id = Uuid::new_v4();
        state.plan.new_activities.push(PlannedActivity {
            id: activity_id,
            date,
            seed_record_id: record.id,
        });
        state.slots.push(Slot {
            target,
            activity_id,
            date,
            distance_m: record.usable_distance(),
            origins: BTreeSet::from([record.origin]),
        });
        state.plan.decisions.push(MatchDecision {
            record_id: record.id,
            target,
            kind: MatchKind::Promoted,
            score: 0.0,
        });
        state.placed.insert(idx);
    }

    fn best_slot(&self, record: &RawSourceRecord, slots: &[Slot]) -> Best {
        Self::best(
            slots
                .iter()
                .enumerate()
                .filter_map(|(idx, slot)| self.one_to_one_score(record, slot).map(|s| (idx, s))),
        )
    }
}

/// Link a planned record to its resolved activity id
///
/// # Errors
///
/// Returns `ResourceAlreadyExists` if the record was linked concurrently, or a
/// database error
pub async fn apply_decision(
    conn: &mut SqliteConnection,
    decision: &MatchDecision,
    activity_id: Uuid,
) -> AppResult<()> {
    if !records::link_record(conn, decision.record_id, activity_id).await? {
        return Err(AppError::new(
            ErrorCode::ResourceAlreadyExists,
            format!("Record {} is already linked", decision.record_id),
        ));
    }
    AppLogger::log_link_decision(
        &decision.record_id.to_string(),
        &activity_id.to_string(),
        decision.kind.as_str(),
        decision.score,
    );
    Ok(())
}
