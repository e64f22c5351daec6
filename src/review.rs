// ABOUTME: Review surface over the reconciled store: reads plus reviewer corrections
// ABOUTME: Sticky overrides, interval corrections, conflict resolution, manual links, VDOT history, fastest efforts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Review Service
//!
//! Every write here is something the reconciliation run must never undo: an
//! override is applied on every later resolution, a corrected interval turns
//! `manual` and enrichment skips it, a resolved conflict is kept as history.
//! Writes that change field inputs re-resolve the activity in the same
//! transaction so the stored row is consistent when the call returns.

use chrono::{NaiveDate, Utc};
use runbase_core::errors::{AppError, AppResult, ErrorCode};
use runbase_core::models::{
    ActivityField, ActivityOverride, CanonicalActivity, Conflict, ConflictStatus, DetectedTrack,
    Interval, IntervalFlags, IntervalProvenance, LocationType, PaceZone, RawSourceRecord,
    SourceOrigin, VdotEntry,
};
use runbase_intelligence::workout_tagger::adjusted_distance_m;
use runbase_intelligence::{
    find_fastest, ActivityEfforts, FastestEffort, VdotAlgorithm, ZoneBoundaries,
};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use crate::config::RunbaseConfig;
use crate::database::{activities, conflicts, fitness, intervals, records, tracks, Database};
use crate::resolver::{apply_resolutions, FieldResolver};

/// Everything a reviewer sees for one activity
#[derive(Debug, Clone, Serialize)]
pub struct ActivityDetail {
    /// Canonical row
    pub activity: CanonicalActivity,
    /// Linked source records
    pub records: Vec<RawSourceRecord>,
    /// Interval rows by rep
    pub intervals: Vec<Interval>,
    /// Conflicts in any status
    pub conflicts: Vec<Conflict>,
    /// Sticky overrides
    pub overrides: Vec<ActivityOverride>,
}

/// How a reviewer settles a conflict
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictChoice {
    /// Take the value one origin reported
    Source(SourceOrigin),
    /// Enter a value by hand
    Custom(String),
}

/// Reviewer edits to one interval; `None` leaves a column as is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalCorrection {
    /// True distance
    pub canonical_distance_m: Option<f64>,
    /// Duration in seconds
    pub duration_s: Option<f64>,
    /// Training zone
    pub pace_zone: Option<PaceZone>,
    /// Physical context
    pub location_type: Option<LocationType>,
    /// Course or venue name
    pub location_name: Option<String>,
    /// Average heart rate
    pub avg_hr: Option<f64>,
    /// Set or clear the walking marker
    pub walking: Option<bool>,
    /// Set or clear the stride marker
    pub stride: Option<bool>,
    /// Set or clear the recovery marker
    pub recovery: Option<bool>,
}

impl IntervalCorrection {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-origin record counts
#[derive(Debug, Clone, Serialize)]
pub struct OriginCount {
    /// Source
    pub origin: SourceOrigin,
    /// Records stored
    pub total: i64,
    /// Records linked to an activity
    pub linked: i64,
}

/// Store overview for the `status` command
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    /// Canonical activities
    pub activities: i64,
    /// Record counts per origin
    pub records: Vec<OriginCount>,
    /// Conflicts waiting for a reviewer
    pub pending_conflicts: usize,
    /// Known tracks
    pub tracks: usize,
    /// Latest VDOT entry
    pub current_vdot: Option<VdotEntry>,
}

/// Read and correct reconciled data
#[derive(Clone)]
pub struct ReviewService {
    db: Database,
    config: RunbaseConfig,
}

impl ReviewService {
    /// Create a review service
    #[must_use]
    pub const fn new(db: Database, config: RunbaseConfig) -> Self {
        Self { db, config }
    }

    /// Activity with its records, intervals, conflicts, and overrides
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown id, or a database error
    pub async fn activity(&self, id: Uuid) -> AppResult<ActivityDetail> {
        let mut conn = self.db.acquire().await?;
        let activity = require_activity(&mut conn, id).await?;
        Ok(ActivityDetail {
            records: records::records_for_activity(&mut conn, id).await?,
            intervals: intervals::intervals_for_activity(&mut conn, id).await?,
            conflicts: conflicts::conflicts_for_activity(&mut conn, id).await?,
            overrides: activities::overrides_for_activity(&mut conn, id).await?,
            activity,
        })
    }

    /// Activities in a date window
    ///
    /// # Errors
    ///
    /// Returns a database error
    pub async fn list_activities(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<CanonicalActivity>> {
        let mut conn = self.db.acquire().await?;
        activities::list_activities(&mut conn, from, to).await
    }

    /// Conflicts, optionally filtered by status
    ///
    /// # Errors
    ///
    /// Returns a database error
    pub async fn list_conflicts(&self, status: Option<ConflictStatus>) -> AppResult<Vec<Conflict>> {
        let mut conn = self.db.acquire().await?;
        conflicts::list_conflicts(&mut conn, status).await
    }

    /// Tracks detected so far
    ///
    /// # Errors
    ///
    /// Returns a database error
    pub async fn list_tracks(&self) -> AppResult<Vec<DetectedTrack>> {
        let mut conn = self.db.acquire().await?;
        tracks::list_tracks(&mut conn).await
    }

    /// Records not linked to any activity
    ///
    /// # Errors
    ///
    /// Returns a database error
    pub async fn list_unlinked(&self) -> AppResult<Vec<RawSourceRecord>> {
        let mut conn = self.db.acquire().await?;
        records::list_unlinked(&mut conn, None, None).await
    }

    /// Pin a field to a reviewer value
    ///
    /// An open conflict on the field is marked resolved with the same value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the value does not parse for the field,
    /// `ResourceNotFound` for an unknown activity, or a database error
    pub async fn set_override(
        &self,
        activity_id: Uuid,
        field: ActivityField,
        raw_value: &str,
    ) -> AppResult<CanonicalActivity> {
        let value = field.parse_value(raw_value)?;
        let mut guard = self.db.begin().await?;
        let conn = guard.executor()?;
        let mut activity = require_activity(&mut *conn, activity_id).await?;

        activities::upsert_override(
            &mut *conn,
            &ActivityOverride {
                activity_id,
                field,
                value: value.clone(),
                updated_at: Utc::now(),
            },
        )
        .await?;
        if let Some(open) = conflicts::conflict_for_field(&mut *conn, activity_id, field).await? {
            if open.status != ConflictStatus::Resolved {
                conflicts::mark_resolved(&mut *conn, open.id, None, &value).await?;
            }
        }

        self.reresolve(&mut *conn, &mut activity).await?;
        guard.commit().await?;
        info!(activity_id = %activity_id, field = %field, "Override set");
        Ok(activity)
    }

    /// Remove a field override; the field falls back to source resolution
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when no override exists, or a database error
    pub async fn clear_override(
        &self,
        activity_id: Uuid,
        field: ActivityField,
    ) -> AppResult<CanonicalActivity> {
        let mut guard = self.db.begin().await?;
        let conn = guard.executor()?;
        let mut activity = require_activity(&mut *conn, activity_id).await?;
        if !activities::delete_override(&mut *conn, activity_id, field).await? {
            return Err(AppError::not_found(format!(
                "Override of {field} on activity {activity_id}"
            )));
        }
        self.reresolve(&mut *conn, &mut activity).await?;
        guard.commit().await?;
        info!(activity_id = %activity_id, field = %field, "Override cleared");
        Ok(activity)
    }

    /// Edit an interval; the row becomes manual and enrichment leaves it alone
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or negative correction,
    /// `ResourceNotFound` for an unknown interval, or a database error
    pub async fn correct_interval(
        &self,
        activity_id: Uuid,
        rep_number: u32,
        correction: IntervalCorrection,
    ) -> AppResult<Interval> {
        if correction.is_empty() {
            return Err(AppError::invalid_input("Interval correction changes nothing"));
        }
        if correction
            .canonical_distance_m
            .into_iter()
            .chain(correction.duration_s)
            .chain(correction.avg_hr)
            .any(|v| !v.is_finite() || v <= 0.0)
        {
            return Err(AppError::out_of_range(
                "Corrected distance, duration, and heart rate must be positive",
            ));
        }

        let mut guard = self.db.begin().await?;
        let conn = guard.executor()?;
        let mut interval = intervals::get_interval(&mut *conn, activity_id, rep_number)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Interval {rep_number} of activity {activity_id}"))
            })?;

        let IntervalCorrection {
            canonical_distance_m,
            duration_s,
            pace_zone,
            location_type,
            location_name,
            avg_hr,
            walking,
            stride,
            recovery,
        } = correction;
        if canonical_distance_m.is_some() {
            interval.canonical_distance_m = canonical_distance_m;
        }
        if duration_s.is_some() {
            interval.duration_s = duration_s;
        }
        if pace_zone.is_some() {
            interval.pace_zone = pace_zone;
        }
        if let Some(location_type) = location_type {
            interval.location_type = location_type;
        }
        if location_name.is_some() {
            interval.location_name = location_name;
        }
        if avg_hr.is_some() {
            interval.avg_hr = avg_hr;
        }
        for (flag, value) in [
            (IntervalFlags::WALKING, walking),
            (IntervalFlags::STRIDE, stride),
            (IntervalFlags::RECOVERY, recovery),
        ] {
            if let Some(value) = value {
                interval.flags.set(flag, value);
            }
        }
        interval.provenance = IntervalProvenance::Manual;
        interval.recompute_pace();

        intervals::upsert_interval(&mut *conn, &interval).await?;
        refresh_adjusted_distance(&mut *conn, activity_id).await?;
        guard.commit().await?;
        info!(activity_id = %activity_id, rep = rep_number, "Interval corrected");
        Ok(interval)
    }

    /// Settle a conflict by source or by hand
    ///
    /// The chosen value is also stored as a sticky override so later runs
    /// keep it whatever the sources report.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown conflict, `InvalidInput` when
    /// the origin is not part of the conflict or a custom value does not
    /// parse, or a database error
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        choice: ConflictChoice,
    ) -> AppResult<Conflict> {
        let mut guard = self.db.begin().await?;
        let conn = guard.executor()?;
        let conflict = conflicts::get_conflict(&mut *conn, conflict_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Conflict {conflict_id}")))?;

        let (origin, value) = match choice {
            ConflictChoice::Source(origin) => {
                let value = conflict
                    .values
                    .iter()
                    .find(|v| v.origin == origin)
                    .map(|v| v.value.clone())
                    .ok_or_else(|| {
                        AppError::invalid_input(format!(
                            "{origin} has no value in conflict {conflict_id}"
                        ))
                    })?;
                (Some(origin), value)
            }
            ConflictChoice::Custom(raw) => (None, conflict.field.parse_value(&raw)?),
        };

        activities::upsert_override(
            &mut *conn,
            &ActivityOverride {
                activity_id: conflict.activity_id,
                field: conflict.field,
                value: value.clone(),
                updated_at: Utc::now(),
            },
        )
        .await?;
        conflicts::mark_resolved(&mut *conn, conflict_id, origin, &value).await?;

        let mut activity = require_activity(&mut *conn, conflict.activity_id).await?;
        self.reresolve(&mut *conn, &mut activity).await?;
        let resolved = conflicts::get_conflict(&mut *conn, conflict_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Conflict {conflict_id}")))?;
        guard.commit().await?;
        info!(
            conflict_id = %conflict_id,
            activity_id = %conflict.activity_id,
            field = %conflict.field,
            "Conflict resolved"
        );
        Ok(resolved)
    }

    /// Attach an orphaned record to an activity by hand
    ///
    /// Fields are re-resolved at once; intervals follow on the next run.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown record or activity,
    /// `ResourceAlreadyExists` if the record is already linked, or a database
    /// error
    pub async fn link_record(
        &self,
        record_id: Uuid,
        activity_id: Uuid,
    ) -> AppResult<CanonicalActivity> {
        let mut guard = self.db.begin().await?;
        let conn = guard.executor()?;
        let record = records::get_record(&mut *conn, record_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Record {record_id}")))?;
        let mut activity = require_activity(&mut *conn, activity_id).await?;

        if let Some(current) = record.activity_id {
            return Err(AppError::new(
                ErrorCode::ResourceAlreadyExists,
                format!("Record {record_id} is already linked to activity {current}"),
            ));
        }
        if !records::link_record(&mut *conn, record_id, activity_id).await? {
            return Err(AppError::new(
                ErrorCode::ResourceAlreadyExists,
                format!("Record {record_id} was linked concurrently"),
            ));
        }

        self.reresolve(&mut *conn, &mut activity).await?;
        guard.commit().await?;
        info!(record_id = %record_id, activity_id = %activity_id, "Record linked by reviewer");
        Ok(activity)
    }

    /// Record a VDOT value effective from `date`
    ///
    /// # Errors
    ///
    /// Returns `ValueOutOfRange` for an implausible VDOT, or a database error
    pub async fn set_vdot(
        &self,
        date: NaiveDate,
        vdot: f64,
        notes: Option<String>,
    ) -> AppResult<VdotEntry> {
        ZoneBoundaries::from_vdot(vdot, self.config.paces.walking_threshold_s_per_km)?;
        self.store_vdot(date, vdot, "manual".to_owned(), notes).await
    }

    /// Derive VDOT from a race result and record it effective from `date`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an impossible performance, or a database error
    pub async fn vdot_from_race(
        &self,
        date: NaiveDate,
        distance_m: f64,
        time_s: f64,
        notes: Option<String>,
    ) -> AppResult<VdotEntry> {
        let vdot = VdotAlgorithm::Daniels.calculate_vdot(distance_m, time_s)?;
        ZoneBoundaries::from_vdot(vdot, self.config.paces.walking_threshold_s_per_km)?;
        let source = format!("race:{distance_m:.0}m/{time_s:.0}s");
        self.store_vdot(date, vdot, source, notes).await
    }

    /// Every VDOT entry, oldest first
    ///
    /// # Errors
    ///
    /// Returns a database error
    pub async fn vdot_history(&self) -> AppResult<Vec<VdotEntry>> {
        let mut conn = self.db.acquire().await?;
        fitness::vdot_history(&mut conn).await
    }

    /// Counts for a quick health check of the store
    ///
    /// # Errors
    ///
    /// Returns a database error
    pub async fn status(&self) -> AppResult<StoreStatus> {
        let mut conn = self.db.acquire().await?;
        let records = records::origin_counts(&mut conn)
            .await?
            .into_iter()
            .map(|(origin, total, linked)| OriginCount {
                origin,
                total,
                linked,
            })
            .collect();
        Ok(StoreStatus {
            activities: activities::count_activities(&mut conn).await?,
            records,
            pending_conflicts: conflicts::list_conflicts(&mut conn, Some(ConflictStatus::Pending))
                .await?
                .len(),
            tracks: tracks::list_tracks(&mut conn).await?.len(),
            current_vdot: fitness::vdot_on(&mut conn, Utc::now().date_naive()).await?,
        })
    }

    /// The quickest efforts at `distance_m` across activities in a date window
    ///
    /// Snapped intervals near the distance and the best telemetry window of
    /// each activity are ranked together by pace.
    ///
    /// # Errors
    ///
    /// Returns `ValueOutOfRange` for a non-positive distance or a zero limit,
    /// or a database error
    pub async fn fastest_efforts(
        &self,
        distance_m: f64,
        limit: usize,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<FastestEffort>> {
        if !distance_m.is_finite() || distance_m <= 0.0 || limit == 0 {
            return Err(AppError::out_of_range(
                "Effort distance and result limit must be positive",
            ));
        }
        let mut conn = self.db.acquire().await?;
        let candidates = activities::list_activities(&mut conn, from, to).await?;

        let mut loaded = Vec::with_capacity(candidates.len());
        for activity in &candidates {
            let rows = intervals::intervals_for_activity(&mut conn, activity.id).await?;
            let mut streams = Vec::new();
            for record in records::records_for_activity(&mut conn, activity.id).await? {
                let telemetry = records::telemetry_for_record(&mut conn, record.id).await?;
                if !telemetry.is_empty() {
                    streams.push(telemetry);
                }
            }
            loaded.push((rows, streams));
        }

        let inputs: Vec<ActivityEfforts<'_>> = candidates
            .iter()
            .zip(&loaded)
            .map(|(activity, (rows, streams))| ActivityEfforts {
                activity_id: activity.id,
                date: activity.date,
                workout_name: activity.workout_name.as_deref(),
                intervals: rows,
                streams,
            })
            .collect();
        let efforts = find_fastest(distance_m, limit, &inputs);
        info!(
            distance_m,
            activities = inputs.len(),
            found = efforts.len(),
            "Fastest efforts ranked"
        );
        Ok(efforts)
    }

    async fn store_vdot(
        &self,
        date: NaiveDate,
        vdot: f64,
        source: String,
        notes: Option<String>,
    ) -> AppResult<VdotEntry> {
        let entry = VdotEntry {
            effective_date: date,
            vdot,
            source,
            notes,
            created_at: Utc::now(),
        };
        let mut conn = self.db.acquire().await?;
        fitness::insert_vdot(&mut conn, &entry).await?;
        info!(date = %date, vdot = vdot, source = %entry.source, "VDOT recorded");
        Ok(entry)
    }

    /// Re-run field resolution and store the activity if it changed
    async fn reresolve(
        &self,
        conn: &mut SqliteConnection,
        activity: &mut CanonicalActivity,
    ) -> AppResult<()> {
        let before = activity.clone();
        let linked = records::records_for_activity(&mut *conn, activity.id).await?;
        let overrides = activities::overrides_for_activity(&mut *conn, activity.id).await?;
        let resolutions = FieldResolver::new(&self.config.resolution).resolve(&linked, &overrides);
        let applied = apply_resolutions(&mut *conn, activity, &resolutions).await?;
        for issue in &applied.issues {
            issue.log();
        }
        if *activity != before {
            activity.updated_at = Utc::now();
            activities::update_activity(&mut *conn, activity).await?;
        }
        Ok(())
    }
}

/// Walking corrections change which laps count, so the activity total follows
async fn refresh_adjusted_distance(conn: &mut SqliteConnection, activity_id: Uuid) -> AppResult<()> {
    let mut activity = require_activity(&mut *conn, activity_id).await?;
    let rows = intervals::intervals_for_activity(&mut *conn, activity_id).await?;
    let adjusted = adjusted_distance_m(&rows).or(activity.distance_m);
    if activity.adjusted_distance_m != adjusted {
        activity.adjusted_distance_m = adjusted;
        activity.updated_at = Utc::now();
        activities::update_activity(&mut *conn, &activity).await?;
    }
    Ok(())
}

async fn require_activity(conn: &mut SqliteConnection, id: Uuid) -> AppResult<CanonicalActivity> {
    activities::get_activity(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Activity {id}")))
}
