// ABOUTME: Track detection and measured-course snapping through full reconciliation runs
// ABOUTME: Only fast on-track work laps snap; course laps take the surveyed distance; tracks are cached
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use common::{
    create_test_database, day, ingest, lap_totals, laps, out_and_back_telemetry, reconcile, record,
    test_config, track_telemetry, COURSE_CENTRE, TRACK_CENTRE,
};
use runbase::review::ReviewService;
use runbase_core::models::{LocationType, MeasuredCourse, RecordBundle, SourceOrigin};
use runbase_intelligence::geometry::local::haversine_m;

fn track_session() -> RecordBundle {
    let mut spec = vec![(1_600.0, 576.0, false)];
    for rep in 0..6 {
        if rep > 0 {
            spec.push((200.0, 70.0, true));
        }
        spec.push((405.0, 80.0, false));
    }
    spec.push((1_200.0, 432.0, false));
    let laps = laps(&spec);
    let telemetry = track_telemetry(&laps);
    let (distance, duration) = lap_totals(&laps);

    let mut summary = record(SourceOrigin::WearableFile, "fit-track", day(16), distance, duration);
    summary.workout_name = Some("6x400m".to_owned());
    RecordBundle {
        record: summary,
        laps,
        telemetry,
    }
}

#[tokio::test]
async fn test_track_repeats_snap_only_work_laps() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(&db, &[track_session()]).await?;

    let report = reconcile(&db, &config).await?;

    assert!(report.is_clean());
    assert_eq!(report.tracks_detected, 1);

    let review = ReviewService::new(db.clone(), config.clone());
    let tracks = review.list_tracks().await?;
    assert_eq!(tracks.len(), 1);
    assert!(haversine_m((tracks[0].lat, tracks[0].lon), TRACK_CENTRE) < 30.0);

    let activity = &review.list_activities(None, None).await?[0];
    let detail = review.activity(activity.id).await?;
    assert_eq!(detail.intervals.len(), 13);

    let work: Vec<_> = detail
        .intervals
        .iter()
        .filter(|iv| iv.gps_distance_m == Some(405.0))
        .collect();
    assert_eq!(work.len(), 6);
    for iv in &work {
        assert_eq!(iv.canonical_distance_m, Some(400.0));
        assert_eq!(iv.prescribed_distance_m, Some(400.0));
        assert_eq!(iv.location_type, LocationType::Track);
        assert!((iv.pace_s_per_km.unwrap() - 200.0).abs() < 1e-9);
    }

    let warm_up = &detail.intervals[0];
    assert_eq!(warm_up.canonical_distance_m, None);
    let recoveries: Vec<_> = detail
        .intervals
        .iter()
        .filter(|iv| iv.flags.is_recovery())
        .collect();
    assert_eq!(recoveries.len(), 5);
    assert!(recoveries.iter().all(|iv| iv.canonical_distance_m.is_none()));
    Ok(())
}

#[tokio::test]
async fn test_detected_track_is_reused_on_rerun() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    ingest(&db, &[track_session()]).await?;
    reconcile(&db, &config).await?;

    let second = reconcile(&db, &config).await?;

    assert_eq!(second.tracks_detected, 0);
    assert_eq!(second.intervals_written, 0);
    let review = ReviewService::new(db, config);
    assert_eq!(review.list_tracks().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_course_laps_take_surveyed_distance() -> Result<()> {
    let db = create_test_database().await?;
    let mut config = test_config();
    config.paces.measured_courses = vec![MeasuredCourse {
        name: "River Mile".to_owned(),
        lat: COURSE_CENTRE.0,
        lon: COURSE_CENTRE.1,
        radius_m: 500.0,
        snap_distance_m: 1_609.34,
    }];

    let laps = laps(&[
        (1_620.0, 390.0, false),
        (400.0, 150.0, true),
        (1_620.0, 390.0, false),
        (400.0, 150.0, true),
        (1_620.0, 390.0, false),
    ]);
    let telemetry = out_and_back_telemetry(&laps, COURSE_CENTRE, 10);
    let (distance, duration) = lap_totals(&laps);
    let mut summary = record(SourceOrigin::WearableFile, "fit-river", day(18), distance, duration);
    summary.workout_name = Some("3x1600m".to_owned());
    ingest(
        &db,
        &[RecordBundle {
            record: summary,
            laps,
            telemetry,
        }],
    )
    .await?;

    let report = reconcile(&db, &config).await?;
    assert!(report.is_clean());
    assert_eq!(report.tracks_detected, 0);

    let review = ReviewService::new(db, config);
    let activity = &review.list_activities(None, None).await?[0];
    let detail = review.activity(activity.id).await?;
    assert_eq!(detail.intervals.len(), 5);

    for iv in detail.intervals.iter().filter(|iv| !iv.flags.is_recovery()) {
        assert_eq!(iv.canonical_distance_m, Some(1_609.34));
        assert_eq!(iv.location_type, LocationType::MeasuredCourse);
        assert_eq!(iv.location_name.as_deref(), Some("River Mile"));
        assert_eq!(iv.gps_distance_m, Some(1_620.0));
    }
    for iv in detail.intervals.iter().filter(|iv| iv.flags.is_recovery()) {
        assert_eq!(iv.canonical_distance_m, None);
        assert_eq!(iv.location_type, LocationType::Road);
    }
    Ok(())
}

#[tokio::test]
async fn test_course_outside_geofence_is_ignored() -> Result<()> {
    let db = create_test_database().await?;
    let mut config = test_config();
    config.paces.measured_courses = vec![MeasuredCourse {
        name: "Far Course".to_owned(),
        lat: COURSE_CENTRE.0 + 0.1,
        lon: COURSE_CENTRE.1,
        radius_m: 500.0,
        snap_distance_m: 1_609.34,
    }];

    let laps = laps(&[
        (1_620.0, 390.0, false),
        (400.0, 150.0, true),
        (1_620.0, 390.0, false),
    ]);
    let telemetry = out_and_back_telemetry(&laps, COURSE_CENTRE, 10);
    let (distance, duration) = lap_totals(&laps);
    let mut summary = record(SourceOrigin::WearableFile, "fit-far", day(19), distance, duration);
    summary.workout_name = Some("2x1600m".to_owned());
    ingest(
        &db,
        &[RecordBundle {
            record: summary,
            laps,
            telemetry,
        }],
    )
    .await?;

    reconcile(&db, &config).await?;

    let review = ReviewService::new(db, config);
    let activity = &review.list_activities(None, None).await?[0];
    let detail = review.activity(activity.id).await?;
    assert!(detail
        .intervals
        .iter()
        .all(|iv| iv.canonical_distance_m.is_none() && iv.location_type == LocationType::Road));
    Ok(())
}
