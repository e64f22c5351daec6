// ABOUTME: Field resolver choosing one canonical value per field from linked source records
// ABOUTME: Per-origin aggregation, priority selection, sticky overrides, and conflict bookkeeping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Field Resolver
//!
//! Resolution runs per field. Records of one origin are first folded into a
//! single value (sums, duration-weighted means, maxima, earliest timestamps or
//! the primary record's text). A manual override wins outright; otherwise the
//! first origin in the field's priority list that has a value wins. When the
//! other origins disagree beyond the field tolerance a [`Conflict`] is kept in
//! the store.

use std::collections::BTreeMap;

use chrono::Utc;
use runbase_core::errors::AppResult;
use runbase_core::models::{
    ActivityField, ActivityOverride, CanonicalActivity, Conflict, ConflictStatus, FieldKind,
    FieldValue, RawSourceRecord, SourceOrigin, SourceValue,
};
use runbase_intelligence::workout_parser::is_generic_name;
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::config::ResolutionConfig;
use crate::database::conflicts;
use crate::issues::ReconcileIssue;

/// Disagreement to record for one field
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictDraft {
    /// Competing values in priority order
    pub values: Vec<SourceValue>,
    /// Lifecycle status
    pub status: ConflictStatus,
    /// Largest difference from the winner (infinite for differing text)
    pub max_difference: f64,
}

/// Outcome for one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldResolution {
    /// Field
    pub field: ActivityField,
    /// Canonical value (`None` clears the field)
    pub value: Option<FieldValue>,
    /// Origin supplying the value; `None` for overrides and merged text
    pub winning_origin: Option<SourceOrigin>,
    /// Whether a manual override decided the value
    pub overridden: bool,
    /// Disagreement beyond tolerance, if any
    pub conflict: Option<ConflictDraft>,
}

/// Pure per-field resolution against a priority configuration
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'a> {
    config: &'a ResolutionConfig,
}

impl<'a> FieldResolver<'a> {
    /// Resolver over the configured priorities and tolerances
    #[must_use]
    pub const fn new(config: &'a ResolutionConfig) -> Self {
        Self { config }
    }

    /// Per-origin values for a field, in the field's priority order
    #[must_use]
    pub fn source_values(&self, field: ActivityField, records: &[RawSourceRecord]) -> Vec<SourceValue> {
        let mut by_origin: BTreeMap<SourceOrigin, Vec<&RawSourceRecord>> = BTreeMap::new();
        for record in records {
            by_origin.entry(record.origin).or_default().push(record);
        }
        self.config
            .priority_for(field)
            .into_iter()
            .filter_map(|origin| {
                let group = by_origin.get(&origin)?;
                aggregate(field, group).map(|value| SourceValue { origin, value })
            })
            .collect()
    }

    /// Resolve a single field
    #[must_use]
    pub fn resolve_field(
        &self,
        field: ActivityField,
        records: &[RawSourceRecord],
        manual: Option<&FieldValue>,
    ) -> FieldResolution {
        if let Some(value) = manual {
            return FieldResolution {
                field,
                value: Some(value.clone()),
                winning_origin: None,
                overridden: true,
                conflict: None,
            };
        }

        let values = self.source_values(field, records);
        if field.kind() == FieldKind::Merge {
            return FieldResolution {
                field,
                value: merge_text(&values),
                winning_origin: None,
                overridden: false,
                conflict: None,
            };
        }

        let Some(winner) = values.first() else {
            return FieldResolution {
                field,
                value: None,
                winning_origin: None,
                overridden: false,
                conflict: None,
            };
        };

        let max_difference = values
            .iter()
            .skip(1)
            .map(|other| winner.value.difference(&other.value).unwrap_or(f64::INFINITY))
            .fold(0.0_f64, f64::max);
        let tolerance = self.config.tolerance_for(field);
        let conflict = (values.len() >= 2 && max_difference > tolerance.tolerance).then(|| {
            let ranked = self.config.is_ranked(field, winner.origin);
            let within_band = match winner.value {
                FieldValue::Text(_) => true,
                _ => max_difference <= tolerance.auto_band,
            };
            ConflictDraft {
                values: values.clone(),
                status: if ranked && within_band {
                    ConflictStatus::AutoResolved
                } else {
                    ConflictStatus::Pending
                },
                max_difference,
            }
        });

        FieldResolution {
            field,
            value: Some(winner.value.clone()),
            winning_origin: Some(winner.origin),
            overridden: false,
            conflict,
        }
    }

    /// Resolve every field of an activity
    #[must_use]
    pub fn resolve(
        &self,
        records: &[RawSourceRecord],
        overrides: &[ActivityOverride],
    ) -> Vec<FieldResolution> {
        ActivityField::ALL
            .iter()
            .map(|&field| {
                let manual = overrides
                    .iter()
                    .find(|o| o.field == field)
                    .map(|o| &o.value);
                self.resolve_field(field, records, manual)
            })
            .collect()
    }
}

/// Fold the records of one origin into one value
fn aggregate(field: ActivityField, records: &[&RawSourceRecord]) -> Option<FieldValue> {
    match field.kind() {
        FieldKind::Sum => {
            let values: Vec<f64> = records.iter().filter_map(|r| numeric(field, r)).collect();
            (!values.is_empty()).then(|| FieldValue::Number(values.iter().sum()))
        }
        FieldKind::WeightedMean => weighted_mean(field, records).map(FieldValue::Number),
        FieldKind::Max => records
            .iter()
            .filter_map(|r| numeric(field, r))
            .reduce(f64::max)
            .map(FieldValue::Number),
        FieldKind::Earliest => match field {
            ActivityField::StartTime => records
                .iter()
                .filter_map(|r| r.start_time)
                .min()
                .map(FieldValue::Timestamp),
            _ => records
                .iter()
                .filter_map(|r| r.effective_date())
                .min()
                .map(FieldValue::Date),
        },
        FieldKind::Primary => primary_text(field, records).map(FieldValue::Text),
        FieldKind::Merge => {
            let notes: Vec<&str> = records
                .iter()
                .filter_map(|r| r.notes.as_deref())
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect();
            (!notes.is_empty()).then(|| FieldValue::Text(notes.join("; ")))
        }
    }
}

fn numeric(field: ActivityField, record: &RawSourceRecord) -> Option<f64> {
    let value = match field {
        ActivityField::Distance => record.distance_m,
        ActivityField::Duration => record.duration_s,
        ActivityField::AvgHr => record.avg_hr,
        ActivityField::MaxHr => record.max_hr,
        ActivityField::AvgCadence => record.avg_cadence,
        ActivityField::TotalAscent => record.total_ascent_m,
        ActivityField::Calories => record.calories,
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

fn weighted_mean(field: ActivityField, records: &[&RawSourceRecord]) -> Option<f64> {
    let pairs: Vec<(f64, Option<f64>)> = records
        .iter()
        .filter_map(|r| Some((numeric(field, r)?, r.duration_s.filter(|d| *d > 0.0))))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    if pairs.iter().all(|(_, w)| w.is_some()) {
        let (sum, weight) = pairs
            .iter()
            .fold((0.0, 0.0), |(s, w), (v, d)| {
                let d = d.unwrap_or(0.0);
                (s + v * d, w + d)
            });
        return Some(sum / weight);
    }
    Some(pairs.iter().map(|(v, _)| v).sum::<f64>() / pairs.len() as f64)
}

/// Text of the longest record that carries one
fn primary_text(field: ActivityField, records: &[&RawSourceRecord]) -> Option<String> {
    let mut ordered: Vec<&&RawSourceRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        let len = |r: &RawSourceRecord| (r.distance_m.unwrap_or(0.0), r.duration_s.unwrap_or(0.0));
        let (ad, at) = len(a);
        let (bd, bt) = len(b);
        bd.total_cmp(&ad).then(bt.total_cmp(&at))
    });
    ordered.into_iter().find_map(|r| match field {
        ActivityField::WorkoutName => r
            .workout_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty() && !is_generic_name(n))
            .map(ToOwned::to_owned),
        ActivityField::WorkoutType => r.workout_type.map(|t| t.as_str().to_owned()),
        ActivityField::ShoeRef => r
            .shoe_ref
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned),
        _ => None,
    })
}

/// Notes from every origin, attributed when more than one contributes
fn merge_text(values: &[SourceValue]) -> Option<FieldValue> {
    match values {
        [] => None,
        [only] => Some(only.value.clone()),
        many => {
            let merged = many
                .iter()
                .map(|sv| format!("[{}] {}", sv.origin, sv.value))
                .collect::<Vec<_>>()
                .join("\n");
            Some(FieldValue::Text(merged))
        }
    }
}

/// Result of applying resolutions to a stored activity
#[derive(Debug, Default)]
pub struct AppliedResolution {
    /// Whether any activity column changed
    pub activity_changed: bool,
    /// Conflicts written during this pass
    pub issues: Vec<ReconcileIssue>,
}

/// Write resolved values onto the activity and keep conflict rows in sync
///
/// Conflict rows are only written when their values, status, or winner
/// changed, so re-running over unchanged sources writes nothing. Conflicts a
/// reviewer resolved are left alone.
///
/// # Errors
///
/// Returns a database error if a conflict read or write fails
pub async fn apply_resolutions(
    conn: &mut SqliteConnection,
    activity: &mut CanonicalActivity,
    resolutions: &[FieldResolution],
) -> AppResult<AppliedResolution> {
    let mut applied = AppliedResolution::default();

    for resolution in resolutions {
        if activity.set(resolution.field, resolution.value.clone()) {
            debug!(
                activity_id = %activity.id,
                field = %resolution.field,
                origin = ?resolution.winning_origin,
                overridden = resolution.overridden,
                "Field value changed"
            );
            applied.activity_changed = true;
        }
        if resolution.overridden {
            continue;
        }

        let Some(draft) = &resolution.conflict else {
            conflicts::delete_unresolved(&mut *conn, activity.id, resolution.field).await?;
            continue;
        };

        let existing = conflicts::conflict_for_field(&mut *conn, activity.id, resolution.field).await?;
        if existing
            .as_ref()
            .is_some_and(|c| c.status == ConflictStatus::Resolved)
        {
            continue;
        }
        let unchanged = existing.as_ref().is_some_and(|c| {
            c.values == draft.values
                && c.status == draft.status
                && c.winning_origin == resolution.winning_origin
                && c.winning_value == resolution.value
        });
        if unchanged {
            continue;
        }

        let now = Utc::now();
        let conflict = Conflict {
            id: existing.as_ref().map_or_else(Uuid::new_v4, |c| c.id),
            activity_id: activity.id,
            field: resolution.field,
            values: draft.values.clone(),
            status: draft.status,
            winning_origin: resolution.winning_origin,
            winning_value: resolution.value.clone(),
            created_at: existing.as_ref().map_or(now, |c| c.created_at),
            updated_at: now,
        };
        conflicts::upsert_conflict(&mut *conn, &conflict).await?;
        let issue = ReconcileIssue::ToleranceExceeded {
            activity_id: activity.id,
            field: resolution.field,
            conflict_id: conflict.id,
            status: conflict.status,
        };
        applied.issues.push(issue);
    }

    if activity.refresh_pace() {
        applied.activity_changed = true;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use runbase_core::models::WorkoutType;

    fn record(origin: SourceOrigin, distance: f64, duration: f64) -> RawSourceRecord {
        let mut r = RawSourceRecord::new(origin, format!("{origin}-{distance}"));
        r.date = NaiveDate::from_ymd_opt(2024, 5, 1);
        r.distance_m = Some(distance);
        r.duration_s = Some(duration);
        r
    }

    #[test]
    fn test_highest_priority_origin_wins_distance() {
        let config = ResolutionConfig::default();
        let resolver = FieldResolver::new(&config);
        let records = vec![
            record(SourceOrigin::SocialApi, 5_020.0, 1_500.0),
            record(SourceOrigin::WearableFile, 5_000.0, 1_500.0),
        ];

        let resolution = resolver.resolve_field(ActivityField::Distance, &records, None);

        assert_eq!(resolution.value, Some(FieldValue::Number(5_000.0)));
        assert_eq!(resolution.winning_origin, Some(SourceOrigin::WearableFile));
        assert!(resolution.conflict.is_none());
    }

    #[test]
    fn test_disagreement_beyond_band_is_pending() {
        let config = ResolutionConfig::default();
        let resolver = FieldResolver::new(&config);
        let records = vec![
            record(SourceOrigin::WearableFile, 5_000.0, 1_500.0),
            record(SourceOrigin::ManualLog, 5_400.0, 1_500.0),
        ];

        let resolution = resolver.resolve_field(ActivityField::Distance, &records, None);
        let conflict = resolution.conflict.unwrap();

        assert_eq!(conflict.status, ConflictStatus::Pending);
        assert!((conflict.max_difference - 8.0).abs() < 1e-9);
        assert_eq!(conflict.values.len(), 2);
    }

    #[test]
    fn test_small_disagreement_auto_resolves() {
        let config = ResolutionConfig::default();
        let resolver = FieldResolver::new(&config);
        let records = vec![
            record(SourceOrigin::WearableFile, 5_000.0, 1_500.0),
            record(SourceOrigin::SocialApi, 5_100.0, 1_500.0),
        ];

        let resolution = resolver.resolve_field(ActivityField::Distance, &records, None);

        assert_eq!(
            resolution.conflict.map(|c| c.status),
            Some(ConflictStatus::AutoResolved)
        );
    }

    #[test]
    fn test_override_short_circuits() {
        let config = ResolutionConfig::default();
        let resolver = FieldResolver::new(&config);
        let records = vec![
            record(SourceOrigin::WearableFile, 5_000.0, 1_500.0),
            record(SourceOrigin::ManualLog, 6_000.0, 1_500.0),
        ];
        let manual = FieldValue::Number(5_500.0);

        let resolution = resolver.resolve_field(ActivityField::Distance, &records, Some(&manual));

        assert!(resolution.overridden);
        assert_eq!(resolution.value, Some(manual));
        assert!(resolution.conflict.is_none());
    }

    #[test]
    fn test_group_records_aggregate_per_origin() {
        let config = ResolutionConfig::default();
        let resolver = FieldResolver::new(&config);
        let mut a = record(SourceOrigin::ManualLog, 800.0, 200.0);
        a.avg_hr = Some(150.0);
        a.start_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, 7, 10, 0).unwrap());
        let mut b = record(SourceOrigin::ManualLog, 1_600.0, 600.0);
        b.avg_hr = Some(170.0);
        b.start_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap());
        b.workout_name = Some("Tempo 1600".into());
        let records = vec![a, b];

        let values = |field| resolver.source_values(field, &records);

        assert_eq!(values(ActivityField::Distance)[0].value, FieldValue::Number(2_400.0));
        assert_eq!(values(ActivityField::AvgHr)[0].value, FieldValue::Number(165.0));
        assert_eq!(
            values(ActivityField::StartTime)[0].value,
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap())
        );
        assert_eq!(
            values(ActivityField::WorkoutName)[0].value,
            FieldValue::Text("Tempo 1600".into())
        );
    }

    #[test]
    fn test_generic_names_count_as_absent() {
        let config = ResolutionConfig::default();
        let resolver = FieldResolver::new(&config);
        let mut api = record(SourceOrigin::SocialApi, 5_000.0, 1_500.0);
        api.workout_name = Some("Morning Run".into());
        let mut fit = record(SourceOrigin::WearableFile, 5_000.0, 1_500.0);
        fit.workout_name = Some("6x400m".into());
        fit.workout_type = Some(WorkoutType::Interval);

        let resolution = resolver.resolve_field(ActivityField::WorkoutName, &[api, fit], None);

        assert_eq!(resolution.value, Some(FieldValue::Text("6x400m".into())));
        assert_eq!(resolution.winning_origin, Some(SourceOrigin::WearableFile));
    }

    #[test]
    fn test_notes_merge_with_attribution() {
        let config = ResolutionConfig::default();
        let resolver = FieldResolver::new(&config);
        let mut log = record(SourceOrigin::ManualLog, 5_000.0, 1_500.0);
        log.notes = Some("felt strong".into());
        let mut api = record(SourceOrigin::SocialApi, 5_000.0, 1_500.0);
        api.notes = Some("windy".into());

        let resolution = resolver.resolve_field(ActivityField::Notes, &[api, log], None);

        assert_eq!(
            resolution.value,
            Some(FieldValue::Text("[manual_log] felt strong\n[social_api] windy".into()))
        );
        assert!(resolution.conflict.is_none());
    }
}
