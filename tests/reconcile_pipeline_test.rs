// ABOUTME: End-to-end reconciliation runs over an in-memory store
// ABOUTME: Merging, grouping, conflicts, ambiguity, sticky overrides, and re-run stability
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use common::{bundle, create_test_database, day, ingest, laps, lap_totals, reconcile, record, test_config};
use runbase::issues::ReconcileIssue;
use runbase::pipeline::{ReconcileOptions, ReconcilePipeline};
use runbase::review::ReviewService;
use runbase_core::models::{
    ActivityField, ConflictStatus, FieldValue, IntervalProvenance, RecordBundle, SourceOrigin,
};

#[tokio::test]
async fn test_wearable_and_api_records_merge_into_one_activity() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(
        &db,
        &[
            bundle(record(SourceOrigin::WearableFile, "fit-1", day(4), 5_000.0, 1_500.0)),
            bundle(record(SourceOrigin::SocialApi, "api-1", day(4), 5_020.0, 1_500.0)),
        ],
    )
    .await?;

    let report = reconcile(&db, &config).await?;

    assert!(report.is_clean());
    assert_eq!(report.records_considered, 2);
    assert_eq!(report.records_linked, 2);
    assert_eq!(report.activities_created, 1);
    assert_eq!(report.conflicts_written, 0);

    let review = ReviewService::new(db, config);
    let activities = review.list_activities(None, None).await?;
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].date, day(4));
    assert_eq!(activities[0].distance_m, Some(5_000.0));
    assert_eq!(activities[0].pace_s_per_km, Some(300.0));
    assert!(review.list_conflicts(None).await?.is_empty());

    let detail = review.activity(activities[0].id).await?;
    assert_eq!(detail.records.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_split_log_entries_group_onto_wearable_activity() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(
        &db,
        &[
            bundle(record(SourceOrigin::ManualLog, "log-a", day(8), 800.0, 200.0)),
            bundle(record(SourceOrigin::ManualLog, "log-b", day(8), 1_600.0, 400.0)),
            bundle(record(SourceOrigin::ManualLog, "log-c", day(8), 800.0, 200.0)),
            bundle(record(SourceOrigin::WearableFile, "fit-8", day(8), 3_210.0, 800.0)),
        ],
    )
    .await?;

    let report = reconcile(&db, &config).await?;

    assert_eq!(report.activities_created, 1);
    assert_eq!(report.records_linked, 4);
    let review = ReviewService::new(db, config);
    let activities = review.list_activities(None, None).await?;
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].distance_m, Some(3_210.0));
    assert!(review.list_unlinked().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_disagreement_beyond_auto_band_stays_pending() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(
        &db,
        &[
            bundle(record(SourceOrigin::WearableFile, "fit-2", day(5), 5_000.0, 1_500.0)),
            bundle(record(SourceOrigin::SocialApi, "api-2", day(5), 5_200.0, 1_500.0)),
        ],
    )
    .await?;

    let report = reconcile(&db, &config).await?;

    assert_eq!(report.conflicts_written, 1);
    assert!(report.issues.iter().any(|issue| matches!(
        issue,
        ReconcileIssue::ToleranceExceeded {
            field: ActivityField::Distance,
            status: ConflictStatus::Pending,
            ..
        }
    )));

    let review = ReviewService::new(db.clone(), config.clone());
    let conflicts = review.list_conflicts(Some(ConflictStatus::Pending)).await?;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].field, ActivityField::Distance);
    assert_eq!(conflicts[0].winning_origin, Some(SourceOrigin::WearableFile));
    assert_eq!(conflicts[0].values.len(), 2);

    let activities = review.list_activities(None, None).await?;
    assert_eq!(activities[0].distance_m, Some(5_000.0));

    let second = reconcile(&db, &config).await?;
    assert_eq!(second.conflicts_written, 0);
    assert_eq!(review.list_conflicts(None).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_small_disagreement_auto_resolves() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(
        &db,
        &[
            bundle(record(SourceOrigin::WearableFile, "fit-3", day(6), 5_000.0, 1_500.0)),
            bundle(record(SourceOrigin::SocialApi, "api-3", day(6), 5_100.0, 1_500.0)),
        ],
    )
    .await?;

    reconcile(&db, &config).await?;

    let review = ReviewService::new(db, config);
    assert!(review
        .list_conflicts(Some(ConflictStatus::Pending))
        .await?
        .is_empty());
    let auto = review
        .list_conflicts(Some(ConflictStatus::AutoResolved))
        .await?;
    assert_eq!(auto.len(), 1);
    assert_eq!(auto[0].winning_value, Some(FieldValue::Number(5_000.0)));
    Ok(())
}

#[tokio::test]
async fn test_tied_candidates_leave_record_unlinked() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(
        &db,
        &[
            bundle(record(SourceOrigin::WearableFile, "fit-am", day(12), 6_000.0, 1_800.0)),
            bundle(record(SourceOrigin::WearableFile, "fit-pm", day(12), 6_000.0, 1_800.0)),
        ],
    )
    .await?;
    let first = reconcile(&db, &config).await?;
    assert_eq!(first.activities_created, 2);

    let api = record(SourceOrigin::SocialApi, "api-12", day(12), 6_030.0, 1_800.0);
    let api_id = api.id;
    ingest(&db, &[bundle(api)]).await?;
    let second = reconcile(&db, &config).await?;

    assert!(second.is_clean());
    assert_eq!(second.records_linked, 0);
    assert_eq!(second.activities_created, 0);
    let ambiguous: Vec<_> = second
        .issues
        .iter()
        .filter_map(|issue| match issue {
            ReconcileIssue::AmbiguousMatch {
                record_id,
                candidates,
            } => Some((*record_id, candidates.len())),
            _ => None,
        })
        .collect();
    assert_eq!(ambiguous, vec![(api_id, 2)]);

    let review = ReviewService::new(db, config);
    let unlinked = review.list_unlinked().await?;
    assert_eq!(unlinked.len(), 1);
    assert_eq!(unlinked[0].id, api_id);
    Ok(())
}

#[tokio::test]
async fn test_override_survives_new_source_data() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(
        &db,
        &[bundle(record(SourceOrigin::WearableFile, "fit-9", day(9), 5_050.0, 1_500.0))],
    )
    .await?;
    reconcile(&db, &config).await?;

    let review = ReviewService::new(db.clone(), config.clone());
    let activity_id = review.list_activities(None, None).await?[0].id;
    let pinned = review
        .set_override(activity_id, ActivityField::Distance, "5000")
        .await?;
    assert_eq!(pinned.distance_m, Some(5_000.0));

    ingest(
        &db,
        &[bundle(record(SourceOrigin::SocialApi, "api-9", day(9), 5_200.0, 1_500.0))],
    )
    .await?;
    let report = reconcile(&db, &config).await?;

    assert_eq!(report.records_linked, 1);
    let detail = review.activity(activity_id).await?;
    assert_eq!(detail.activity.distance_m, Some(5_000.0));
    assert_eq!(detail.records.len(), 2);
    assert!(detail
        .conflicts
        .iter()
        .all(|c| c.field != ActivityField::Distance));
    Ok(())
}

fn structured_session() -> RecordBundle {
    let laps = laps(&[
        (1_600.0, 576.0, false),
        (1_000.0, 200.0, false),
        (400.0, 150.0, true),
        (1_000.0, 200.0, false),
        (400.0, 150.0, true),
        (1_000.0, 200.0, false),
        (1_600.0, 576.0, false),
    ]);
    let (distance, duration) = lap_totals(&laps);
    let mut summary = record(SourceOrigin::WearableFile, "fit-15", day(15), distance, duration);
    summary.workout_name = Some("3x1000m".to_owned());
    RecordBundle {
        record: summary,
        laps,
        telemetry: Vec::new(),
    }
}

#[tokio::test]
async fn test_second_run_changes_nothing() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(&db, &[structured_session()]).await?;

    let first = reconcile(&db, &config).await?;
    assert_eq!(first.activities_created, 1);
    assert_eq!(first.intervals_written, 7);

    let second = reconcile(&db, &config).await?;
    assert!(second.is_clean());
    assert_eq!(second.records_considered, 0);
    assert_eq!(second.activities_processed, 1);
    assert_eq!(second.activities_created, 0);
    assert_eq!(second.activities_updated, 0);
    assert_eq!(second.intervals_written, 0);
    assert_eq!(second.intervals_deleted, 0);
    assert_eq!(second.conflicts_written, 0);
    Ok(())
}

#[tokio::test]
async fn test_laps_become_tagged_intervals() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(&db, &[structured_session()]).await?;
    reconcile(&db, &config).await?;

    let review = ReviewService::new(db, config);
    let activity = &review.list_activities(None, None).await?[0];
    let detail = review.activity(activity.id).await?;

    assert_eq!(detail.intervals.len(), 7);
    assert!(detail
        .intervals
        .iter()
        .all(|iv| iv.provenance == IntervalProvenance::DeviceLap));
    let recoveries: Vec<u32> = detail
        .intervals
        .iter()
        .filter(|iv| iv.flags.is_recovery())
        .map(|iv| iv.rep_number)
        .collect();
    assert_eq!(recoveries, vec![3, 5]);
    assert_eq!(detail.intervals[0].set_number, None);
    assert_eq!(detail.intervals[1].set_number, Some(1));
    assert!(detail.activity.workout_type.is_some());
    assert_eq!(detail.activity.adjusted_distance_m, Some(7_000.0));
    Ok(())
}

#[tokio::test]
async fn test_records_outside_window_are_left_for_later() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(
        &db,
        &[
            bundle(record(SourceOrigin::WearableFile, "fit-1", day(1), 8_000.0, 2_400.0)),
            bundle(record(SourceOrigin::WearableFile, "fit-20", day(20), 8_000.0, 2_400.0)),
        ],
    )
    .await?;

    let report = ReconcilePipeline::new(db.clone(), config.clone())
        .run(ReconcileOptions {
            from: Some(day(15)),
            to: Some(day(25)),
        })
        .await?;

    assert_eq!(report.records_considered, 1);
    assert_eq!(report.activities_created, 1);
    let review = ReviewService::new(db, config);
    assert_eq!(review.list_unlinked().await?.len(), 1);
    Ok(())
}
