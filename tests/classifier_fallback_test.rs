// ABOUTME: Fallback workout classifier behaviour inside reconciliation runs
// ABOUTME: Verdict caching, validation into a workout type, and non-fatal provider failures or timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use common::{bundle, create_test_database, day, ingest, record, test_config};
use runbase::config::RunbaseConfig;
use runbase::database::Database;
use runbase::issues::ReconcileIssue;
use runbase::pipeline::{ReconcileOptions, ReconcilePipeline, RunReport};
use runbase::review::ReviewService;
use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::{SourceOrigin, WorkoutType};
use runbase_intelligence::{ClassifierVerdict, NoopClassifier, WorkoutClassifier};

/// Answers every title with the same verdict and counts requests
#[derive(Default)]
struct ScriptedClassifier {
    calls: AtomicUsize,
}

#[async_trait]
impl WorkoutClassifier for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn classify_batch(&self, names: &[String]) -> AppResult<Vec<Option<ClassifierVerdict>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let verdict = ClassifierVerdict {
            workout_type: Some(WorkoutType::Interval),
            rep_count: Some(5),
            distance_m: Some(1_000.0),
            ..ClassifierVerdict::default()
        };
        Ok(vec![Some(verdict); names.len()])
    }
}

struct DownClassifier;

#[async_trait]
impl WorkoutClassifier for DownClassifier {
    fn name(&self) -> &'static str {
        "down"
    }

    async fn classify_batch(&self, _names: &[String]) -> AppResult<Vec<Option<ClassifierVerdict>>> {
        Err(AppError::external_unavailable("classifier", "connection refused"))
    }
}

struct ShortClassifier;

#[async_trait]
impl WorkoutClassifier for ShortClassifier {
    fn name(&self) -> &'static str {
        "short"
    }

    async fn classify_batch(&self, _names: &[String]) -> AppResult<Vec<Option<ClassifierVerdict>>> {
        Ok(Vec::new())
    }
}

/// Never answers within the configured timeout
struct StalledClassifier;

#[async_trait]
impl WorkoutClassifier for StalledClassifier {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn classify_batch(&self, names: &[String]) -> AppResult<Vec<Option<ClassifierVerdict>>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![None; names.len()])
    }
}

async fn club_run(db: &Database) -> Result<()> {
    let mut r = record(SourceOrigin::SocialApi, "api-club", day(3), 8_000.0, 2_700.0);
    r.workout_name = Some("with the club".to_owned());
    ingest(db, &[bundle(r)]).await
}

async fn run_with(
    db: &Database,
    config: &RunbaseConfig,
    classifier: Arc<dyn WorkoutClassifier>,
) -> Result<RunReport> {
    let report = ReconcilePipeline::new(db.clone(), config.clone())
        .with_classifier(classifier)
        .run(ReconcileOptions::default())
        .await?;
    Ok(report)
}

#[tokio::test]
async fn test_verdict_sets_workout_type_and_is_cached() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    club_run(&db).await?;
    let classifier = Arc::new(ScriptedClassifier::default());

    let first = run_with(&db, &config, classifier.clone()).await?;
    assert_eq!(first.names_classified, 1);
    assert!(first.issues.is_empty());

    let review = ReviewService::new(db.clone(), config.clone());
    let activity = &review.list_activities(None, None).await?[0];
    assert_eq!(activity.workout_type, Some(WorkoutType::Interval));
    assert_eq!(activity.workout_name.as_deref(), Some("with the club"));

    let second = run_with(&db, &config, classifier.clone()).await?;
    assert_eq!(second.names_classified, 0);
    assert_eq!(second.activities_updated, 0);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_classifier_does_not_fail_run() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    club_run(&db).await?;

    let report = run_with(&db, &config, Arc::new(DownClassifier)).await?;

    assert!(report.is_clean());
    assert_eq!(report.activities_created, 1);
    assert_eq!(report.names_classified, 0);
    assert!(report
        .issues
        .iter()
        .any(|issue| matches!(issue, ReconcileIssue::ClassifierUnavailable { .. })));

    let review = ReviewService::new(db, config);
    assert_eq!(review.list_activities(None, None).await?[0].workout_type, None);
    Ok(())
}

#[tokio::test]
async fn test_short_answer_is_treated_as_unavailable() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    club_run(&db).await?;

    let report = run_with(&db, &config, Arc::new(ShortClassifier)).await?;

    assert!(report.is_clean());
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind(), "classifier_unavailable");
    Ok(())
}

#[tokio::test]
async fn test_slow_classifier_times_out_without_failing_run() -> Result<()> {
    let db = create_test_database().await?;
    let mut config = test_config();
    config.classifier.timeout_secs = 1;
    club_run(&db).await?;

    let report = run_with(&db, &config, Arc::new(StalledClassifier)).await?;

    assert!(report.is_clean());
    assert_eq!(report.activities_created, 1);
    assert_eq!(report.names_classified, 0);
    assert!(report.issues.iter().any(|issue| matches!(
        issue,
        ReconcileIssue::ClassifierUnavailable { reason } if reason.contains("timed out")
    )));

    // Nothing was cached, so a responsive classifier is asked on the next run
    let classifier = Arc::new(ScriptedClassifier::default());
    let retry = run_with(&db, &config, classifier.clone()).await?;
    assert_eq!(retry.names_classified, 1);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_no_opinion_is_cached_too() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    club_run(&db).await?;

    let first = run_with(&db, &config, Arc::new(NoopClassifier)).await?;
    let second = run_with(&db, &config, Arc::new(NoopClassifier)).await?;

    assert_eq!(first.names_classified, 1);
    assert_eq!(second.names_classified, 0);
    Ok(())
}

#[tokio::test]
async fn test_parsed_titles_skip_the_classifier() -> Result<()> {
    let db = create_test_database().await?;
    let config = test_config();
    let mut r = record(SourceOrigin::SocialApi, "api-tempo", day(3), 8_000.0, 2_700.0);
    r.workout_name = Some("tempo 4mi".to_owned());
    ingest(&db, &[bundle(r)]).await?;
    let classifier = Arc::new(ScriptedClassifier::default());

    let report = run_with(&db, &config, classifier.clone()).await?;

    assert_eq!(report.names_classified, 0);
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    let review = ReviewService::new(db, config);
    assert_eq!(
        review.list_activities(None, None).await?[0].workout_type,
        Some(WorkoutType::Tempo)
    );
    Ok(())
}
