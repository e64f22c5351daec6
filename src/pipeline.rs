// ABOUTME: Reconciliation run driver: match, resolve, parse, enrich, persist per activity
// ABOUTME: Classifier pre-pass, one retried transaction per activity, and the run report
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Reconciliation Pipeline
//!
//! A run loads unlinked records and the activities around them, plans the
//! record links, and then handles each target activity in its own
//! transaction: link, resolve fields, parse the workout title, enrich
//! intervals, write changes. A failed activity rolls back alone and the run
//! continues.
//!
//! The fallback classifier is consulted before any transaction opens and its
//! verdicts are cached by title, so later runs reuse them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, NaiveDate, Utc};
use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::{CanonicalActivity, DetectedTrack, RawSourceRecord, SourceOrigin};
use runbase_intelligence::geometry::{KnownTracks, TrackDetector};
use runbase_intelligence::workout_parser::is_generic_name;
use runbase_intelligence::{
    ClassifierVerdict, ParseOutcome, ParsedWorkout, WorkoutClassifier, WorkoutNameParser,
    ZoneBoundaries,
};
use serde::Serialize;
use sqlx::SqliteConnection;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::RunbaseConfig;
use crate::database::{
    activities, fitness, intervals, records, retry_transaction, tracks, Database,
};
use crate::enrichment::{persist_intervals, EnrichmentContext, EnrichmentPipeline, RecordEvidence};
use crate::issues::ReconcileIssue;
use crate::logging::AppLogger;
use crate::matcher::{
    apply_decision, ActivityRef, MatchCandidate, MatchDecision, MatchPlanner, PlannedActivity,
};
use crate::resolver::{apply_resolutions, FieldResolver};

/// Date window of a run; both ends inclusive and optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// First date
    pub from: Option<NaiveDate>,
    /// Last date
    pub to: Option<NaiveDate>,
}

/// An activity whose transaction failed
#[derive(Debug, Clone, Serialize)]
pub struct ActivityFailure {
    /// Activity id (planned id for new activities)
    pub activity_id: Uuid,
    /// Error text
    pub message: String,
}

/// Summary of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Unlinked records considered
    pub records_considered: usize,
    /// Records linked to an activity
    pub records_linked: usize,
    /// Activities created
    pub activities_created: usize,
    /// Activities whose row changed
    pub activities_updated: usize,
    /// Activities processed successfully
    pub activities_processed: usize,
    /// Conflict rows written
    pub conflicts_written: usize,
    /// Interval rows inserted or updated
    pub intervals_written: usize,
    /// Stale interval rows removed
    pub intervals_deleted: usize,
    /// New tracks stored
    pub tracks_detected: usize,
    /// Titles sent to the fallback classifier
    pub names_classified: usize,
    /// Per-activity failures
    pub failures: Vec<ActivityFailure>,
    /// Non-fatal findings
    pub issues: Vec<ReconcileIssue>,
    /// Wall time
    pub duration_ms: u64,
}

impl RunReport {
    /// Whether every activity committed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn push_issue(&mut self, issue: ReconcileIssue) {
        issue.log();
        self.issues.push(issue);
    }
}

enum Target<'p> {
    Existing(Uuid),
    New(&'p PlannedActivity),
}

impl Target<'_> {
    fn id(&self) -> Uuid {
        match self {
            Self::Existing(id) => *id,
            Self::New(planned) => planned.id,
        }
    }
}

struct Job<'p> {
    target: Target<'p>,
    decisions: Vec<&'p MatchDecision>,
}

#[derive(Default)]
struct ActivityOutcome {
    created: bool,
    updated: bool,
    linked: usize,
    conflicts: usize,
    intervals_written: usize,
    intervals_deleted: usize,
    new_track: Option<DetectedTrack>,
    issues: Vec<ReconcileIssue>,
}

/// Drives reconciliation runs against one store
pub struct ReconcilePipeline {
    db: Database,
    config: RunbaseConfig,
    classifier: Option<Arc<dyn WorkoutClassifier>>,
    parser: WorkoutNameParser,
    enrichment: EnrichmentPipeline,
    detector: TrackDetector,
}

impl ReconcilePipeline {
    /// Pipeline without a fallback classifier
    #[must_use]
    pub fn new(db: Database, config: RunbaseConfig) -> Self {
        let detector = TrackDetector::new(config.paces.track_detection.clone());
        Self {
            db,
            config,
            classifier: None,
            parser: WorkoutNameParser::new(),
            enrichment: EnrichmentPipeline::default(),
            detector,
        }
    }

    /// Attach a fallback classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn WorkoutClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Run one reconciliation pass
    ///
    /// # Errors
    ///
    /// Returns an error only if the run cannot start (loading records,
    /// activities, or tracks fails). Per-activity failures are reported in
    /// the [`RunReport`].
    #[instrument(skip(self), fields(from = ?options.from, to = ?options.to))]
    pub async fn run(&self, options: ReconcileOptions) -> AppResult<RunReport> {
        let started = Instant::now();
        let mut report = RunReport::default();
        let tolerance = Duration::days(self.config.matching.day_tolerance);

        let (unlinked, existing, linked, mut known) = {
            let mut conn = self.db.acquire().await?;
            let unlinked = records::list_unlinked(&mut conn, options.from, options.to).await?;
            let existing = activities::list_activities(
                &mut conn,
                options.from.map(|d| d - tolerance),
                options.to.map(|d| d + tolerance),
            )
            .await?;
            let linked = match (
                existing.iter().map(|a| a.date).min(),
                existing.iter().map(|a| a.date).max(),
            ) {
                (Some(first), Some(last)) => records::linked_origins(&mut conn, first, last).await?,
                _ => Vec::new(),
            };
            let known = KnownTracks::new(tracks::list_tracks(&mut conn).await?);
            (unlinked, existing, linked, known)
        };
        report.records_considered = unlinked.len();

        self.classify_unknown_names(&unlinked, &existing, &mut report)
            .await;

        let mut origins: BTreeMap<Uuid, BTreeSet<SourceOrigin>> = BTreeMap::new();
        for (activity_id, origin) in linked {
            origins.entry(activity_id).or_default().insert(origin);
        }
        let candidates: Vec<MatchCandidate> = existing
            .iter()
            .map(|a| MatchCandidate::from_activity(a, origins.remove(&a.id).unwrap_or_default()))
            .collect();

        let plan = MatchPlanner::new(&self.config.matching, &self.config.resolution.default_priority)
            .plan(&unlinked, &candidates);
        for issue in plan.issues.iter().cloned() {
            report.push_issue(issue);
        }

        let jobs = Self::jobs(&plan.decisions, &plan.new_activities, &existing, options);
        info!(
            records = unlinked.len(),
            activities = jobs.len(),
            new_activities = plan.new_activities.len(),
            "Reconciliation planned"
        );

        for job in &jobs {
            let activity_id = job.target.id();
            let known_ref = &known;
            let result = retry_transaction(
                || self.process(job, known_ref),
                self.config.transaction_retries,
            )
            .await;
            match result {
                Ok(outcome) => {
                    report.activities_processed += 1;
                    report.activities_created += usize::from(outcome.created);
                    report.activities_updated += usize::from(outcome.updated);
                    report.records_linked += outcome.linked;
                    report.conflicts_written += outcome.conflicts;
                    report.intervals_written += outcome.intervals_written;
                    report.intervals_deleted += outcome.intervals_deleted;
                    for issue in outcome.issues {
                        report.push_issue(issue);
                    }
                    if let Some(track) = outcome.new_track {
                        report.tracks_detected += 1;
                        known.register(track);
                    }
                }
                Err(e) => {
                    error!(activity_id = %activity_id, error = %e, "Activity reconciliation failed");
                    report.failures.push(ActivityFailure {
                        activity_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        AppLogger::log_run_summary(
            report.activities_processed,
            report.failures.len(),
            report.issues.len(),
            report.duration_ms,
        );
        Ok(report)
    }

    /// Target activities in processing order: existing by date, then new ones
    fn jobs<'p>(
        decisions: &'p [MatchDecision],
        new_activities: &'p [PlannedActivity],
        existing: &[CanonicalActivity],
        options: ReconcileOptions,
    ) -> Vec<Job<'p>> {
        let mut by_existing: BTreeMap<Uuid, Vec<&'p MatchDecision>> = BTreeMap::new();
        let mut by_new: BTreeMap<usize, Vec<&'p MatchDecision>> = BTreeMap::new();
        for decision in decisions {
            match decision.target {
                ActivityRef::Existing(id) => {
                    by_existing.entry(id).or_default().push(decision);
                }
                ActivityRef::New(n) => by_new.entry(n).or_default().push(decision),
            }
        }

        let in_window = |date: NaiveDate| {
            options.from.is_none_or(|from| date >= from) && options.to.is_none_or(|to| date <= to)
        };
        let mut ordered: Vec<&CanonicalActivity> = existing
            .iter()
            .filter(|a| in_window(a.date) || by_existing.contains_key(&a.id))
            .collect();
        ordered.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

        let mut jobs: Vec<Job<'p>> = ordered
            .into_iter()
            .map(|a| Job {
                target: Target::Existing(a.id),
                decisions: by_existing.remove(&a.id).unwrap_or_default(),
            })
            .collect();
        jobs.extend(new_activities.iter().enumerate().map(|(n, planned)| Job {
            target: Target::New(planned),
            decisions: by_new.remove(&n).unwrap_or_default(),
        }));
        jobs
    }

    /// Ask the fallback classifier about titles the rule cascade cannot read
    async fn classify_unknown_names(
        &self,
        unlinked: &[RawSourceRecord],
        existing: &[CanonicalActivity],
        report: &mut RunReport,
    ) {
        let Some(classifier) = &self.classifier else {
            return;
        };
        let names = match self.uncached_names(unlinked, existing).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Skipping classifier pre-pass");
                return;
            }
        };
        if names.is_empty() {
            return;
        }

        let limit = StdDuration::from_secs(self.config.classifier.timeout_secs);
        for batch in names.chunks(self.config.classifier.batch_size.max(1)) {
            let verdicts = match timeout(limit, classifier.classify_batch(batch)).await {
                Ok(Ok(verdicts)) if verdicts.len() == batch.len() => verdicts,
                Ok(Ok(verdicts)) => {
                    report.push_issue(ReconcileIssue::ClassifierUnavailable {
                        reason: format!(
                            "{} returned {} verdicts for {} names",
                            classifier.name(),
                            verdicts.len(),
                            batch.len()
                        ),
                    });
                    return;
                }
                Ok(Err(e)) => {
                    report.push_issue(ReconcileIssue::ClassifierUnavailable {
                        reason: e.to_string(),
                    });
                    return;
                }
                Err(_) => {
                    report.push_issue(ReconcileIssue::ClassifierUnavailable {
                        reason: format!("timed out after {}s", limit.as_secs()),
                    });
                    return;
                }
            };

            let stored = self.store_verdicts(batch, &verdicts, classifier.name()).await;
            if let Err(e) = stored {
                warn!(error = %e, "Failed to cache classifier verdicts");
                return;
            }
            report.names_classified += batch.len();
        }
    }

    async fn uncached_names(
        &self,
        unlinked: &[RawSourceRecord],
        existing: &[CanonicalActivity],
    ) -> AppResult<Vec<String>> {
        let mut conn = self.db.acquire().await?;
        let mut seen = BTreeSet::new();
        let mut names = Vec::new();
        let titles = unlinked
            .iter()
            .filter_map(|r| r.workout_name.as_deref())
            .chain(existing.iter().filter_map(|a| a.workout_name.as_deref()));
        for title in titles {
            let title = title.trim();
            if title.is_empty() || is_generic_name(title) {
                continue;
            }
            if !seen.insert(fitness::name_cache_key(title)) {
                continue;
            }
            if self.parser.parse(title) != ParseOutcome::Unrecognized {
                continue;
            }
            if fitness::cached_verdict(&mut conn, title).await?.is_none() {
                names.push(title.to_owned());
            }
        }
        Ok(names)
    }

    async fn store_verdicts(
        &self,
        names: &[String],
        verdicts: &[Option<ClassifierVerdict>],
        classifier: &str,
    ) -> AppResult<()> {
        let mut guard = self.db.begin().await?;
        for (name, verdict) in names.iter().zip(verdicts) {
            fitness::store_verdict(guard.executor()?, name, verdict.as_ref(), classifier).await?;
        }
        guard.commit().await
    }

    /// Reconcile one activity inside its own transaction
    async fn process(&self, job: &Job<'_>, known: &KnownTracks) -> AppResult<ActivityOutcome> {
        let mut outcome = ActivityOutcome::default();
        let mut guard = self.db.begin().await?;
        let conn = guard.executor()?;

        let (mut activity, original) = match &job.target {
            Target::Existing(id) => {
                let activity = activities::get_activity(&mut *conn, *id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Activity {id}")))?;
                let original = Some(activity.clone());
                (activity, original)
            }
            Target::New(planned) => {
                let mut activity = CanonicalActivity::new(planned.date);
                activity.id = planned.id;
                activities::insert_activity(&mut *conn, &activity).await?;
                outcome.created = true;
                (activity, None)
            }
        };

        for decision in &job.decisions {
            apply_decision(&mut *conn, decision, activity.id).await?;
            outcome.linked += 1;
        }

        let linked = records::records_for_activity(&mut *conn, activity.id).await?;
        if linked.is_empty() {
            guard.commit().await?;
            return Ok(outcome);
        }

        let overrides = activities::overrides_for_activity(&mut *conn, activity.id).await?;
        let resolutions = FieldResolver::new(&self.config.resolution).resolve(&linked, &overrides);
        let applied = apply_resolutions(&mut *conn, &mut activity, &resolutions).await?;
        outcome.conflicts = applied.issues.len();
        outcome.issues.extend(applied.issues);

        let evidence = self.load_evidence(&mut *conn, linked).await?;
        let parsed = self
            .parse_workout(&mut *conn, &activity, &evidence, &mut outcome.issues)
            .await?;
        if activity.workout_type.is_none() {
            activity.workout_type = parsed.as_ref().map(|p| p.workout_type);
        }

        let vdot = fitness::vdot_on(&mut *conn, activity.date)
            .await?
            .map(|entry| entry.vdot);
        let zones = vdot.and_then(|v| {
            ZoneBoundaries::from_vdot(v, self.config.paces.walking_threshold_s_per_km)
                .map_err(|e| warn!(activity_id = %activity.id, error = %e, "Unusable VDOT"))
                .ok()
        });

        let existing_intervals = intervals::intervals_for_activity(&mut *conn, activity.id).await?;
        let state = {
            let ctx = EnrichmentContext {
                activity: &activity,
                evidence: &evidence,
                parsed: parsed.as_ref(),
                workout_type: activity.workout_type,
                vdot,
                zones: zones.as_ref(),
                paces: &self.config.paces,
                known_tracks: known,
                detector: &self.detector,
            };
            self.enrichment.run(&ctx, &existing_intervals)?
        };
        let writes =
            persist_intervals(&mut *conn, activity.id, &existing_intervals, &state.intervals).await?;
        outcome.intervals_written = writes.upserted;
        outcome.intervals_deleted = writes.deleted;
        outcome.issues.extend(state.issues);

        if let Some(matched) = state.track_scan.and_then(|scan| scan.matched) {
            if !matched.cached {
                outcome.new_track = Some(tracks::insert_track(&mut *conn, &matched.track).await?);
            }
        }

        activity.adjusted_distance_m = state.adjusted_distance_m;
        activity.vdot_snapshot = state.vdot_snapshot;
        let changed = original.as_ref().is_none_or(|o| *o != activity);
        if changed {
            activity.updated_at = Utc::now();
            activities::update_activity(&mut *conn, &activity).await?;
            outcome.updated = true;
        }

        guard.commit().await?;
        Ok(outcome)
    }

    async fn load_evidence(
        &self,
        conn: &mut SqliteConnection,
        mut linked: Vec<RawSourceRecord>,
    ) -> AppResult<Vec<RecordEvidence>> {
        let priority = &self.config.resolution.default_priority;
        let rank = |origin: SourceOrigin| {
            priority
                .iter()
                .position(|o| *o == origin)
                .unwrap_or(priority.len())
        };
        linked.sort_by(|a, b| {
            rank(a.origin)
                .cmp(&rank(b.origin))
                .then(a.external_id.cmp(&b.external_id))
        });

        let mut evidence = Vec::with_capacity(linked.len());
        for record in linked {
            let laps = records::laps_for_record(&mut *conn, record.id).await?;
            let telemetry = records::telemetry_for_record(&mut *conn, record.id).await?;
            evidence.push(RecordEvidence {
                record,
                laps,
                telemetry,
            });
        }
        Ok(evidence)
    }

    /// Title, then notes, then a cached classifier verdict
    async fn parse_workout(
        &self,
        conn: &mut SqliteConnection,
        activity: &CanonicalActivity,
        evidence: &[RecordEvidence],
        issues: &mut Vec<ReconcileIssue>,
    ) -> AppResult<Option<ParsedWorkout>> {
        let Some(name) = activity.workout_name.as_deref() else {
            return Ok(self.parse_notes(evidence));
        };

        match self.parser.parse(name) {
            ParseOutcome::Parsed(parsed) => return Ok(Some(parsed)),
            ParseOutcome::Rejected { reason } => {
                issues.push(ReconcileIssue::ParseAmbiguous {
                    activity_id: activity.id,
                    name: name.to_owned(),
                    reason,
                });
                return Ok(self.parse_notes(evidence));
            }
            ParseOutcome::Unrecognized => {}
        }

        if let Some(parsed) = self.parse_notes(evidence) {
            return Ok(Some(parsed));
        }

        match fitness::cached_verdict(conn, name).await? {
            Some(Some(verdict)) => match verdict.validate() {
                Ok(parsed) => Ok(Some(parsed)),
                Err(reason) => {
                    issues.push(ReconcileIssue::ParseAmbiguous {
                        activity_id: activity.id,
                        name: name.to_owned(),
                        reason,
                    });
                    Ok(None)
                }
            },
            Some(None) | None => Ok(None),
        }
    }

    fn parse_notes(&self, evidence: &[RecordEvidence]) -> Option<ParsedWorkout> {
        evidence
            .iter()
            .filter_map(|e| e.record.notes.as_deref())
            .find_map(|notes| match self.parser.parse(notes) {
                ParseOutcome::Parsed(parsed) => Some(parsed),
                ParseOutcome::Rejected { .. } | ParseOutcome::Unrecognized => None,
            })
    }
}
