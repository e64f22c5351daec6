// ABOUTME: Configuration loading from YAML files and environment overrides
// ABOUTME: Partial files keep defaults; env vars win over the file; bad files are rejected
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use runbase::config::{
    RunbaseConfig, CLASSIFIER_URL_ENV, CONFIG_PATH_ENV, DATABASE_URL_ENV,
};
use runbase_core::errors::ErrorCode;
use runbase_core::models::{ActivityField, SourceOrigin};
use serial_test::serial;
use tempfile::TempDir;

const PARTIAL_CONFIG: &str = r"
database_url: sqlite:/var/lib/runbase/runs.db
matching:
  day_tolerance: 2
resolution:
  field_priority:
    avg_hr: [social_api, wearable_file]
paces:
  measured_courses:
    - name: Canal Loop
      lat: 51.5
      lon: -0.12
      radius_m: 400
      snap_distance_m: 1609.34
classifier:
  url: http://localhost:8088/classify
";

fn clear_env() {
    for key in [CONFIG_PATH_ENV, DATABASE_URL_ENV, CLASSIFIER_URL_ENV] {
        env::remove_var(key);
    }
}

fn write_config(dir: &TempDir, content: &str) -> Result<PathBuf> {
    let path = dir.path().join("runbase.yaml");
    fs::write(&path, content)?;
    Ok(path)
}

#[test]
#[serial]
fn test_partial_file_keeps_remaining_defaults() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = write_config(&dir, PARTIAL_CONFIG)?;

    let config = RunbaseConfig::load(Some(&path))?;

    assert_eq!(config.database_url, "sqlite:/var/lib/runbase/runs.db");
    assert_eq!(config.matching.day_tolerance, 2);
    assert!((config.matching.distance_tolerance_pct - 5.0).abs() < f64::EPSILON);
    assert_eq!(
        config.resolution.priority_for(ActivityField::AvgHr),
        vec![
            SourceOrigin::SocialApi,
            SourceOrigin::WearableFile,
            SourceOrigin::ManualLog
        ]
    );
    assert_eq!(config.paces.measured_courses.len(), 1);
    assert_eq!(config.paces.measured_courses[0].name, "Canal Loop");
    assert_eq!(
        config.classifier.url.as_deref(),
        Some("http://localhost:8088/classify")
    );
    assert_eq!(config.classifier.batch_size, 25);
    Ok(())
}

#[test]
#[serial]
fn test_environment_overrides_file_values() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = write_config(&dir, PARTIAL_CONFIG)?;
    env::set_var(DATABASE_URL_ENV, "sqlite::memory:");
    env::set_var(CLASSIFIER_URL_ENV, "");

    let config = RunbaseConfig::load(Some(&path));
    clear_env();
    let config = config?;

    assert_eq!(config.database_url, "sqlite::memory:");
    assert_eq!(config.classifier.url, None);
    Ok(())
}

#[test]
#[serial]
fn test_config_path_from_environment() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let path = write_config(&dir, "transaction_retries: 5\n")?;
    env::set_var(CONFIG_PATH_ENV, &path);

    let config = RunbaseConfig::load(None);
    clear_env();

    assert_eq!(config?.transaction_retries, 5);
    Ok(())
}

#[test]
#[serial]
fn test_no_file_means_defaults() -> Result<()> {
    clear_env();

    let config = RunbaseConfig::load(None)?;

    assert_eq!(config, RunbaseConfig::default());
    Ok(())
}

#[test]
#[serial]
fn test_missing_file_is_config_error() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;

    let err = RunbaseConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();

    assert_eq!(err.code, ErrorCode::ConfigError);
    Ok(())
}

#[test]
#[serial]
fn test_inconsistent_file_is_rejected() -> Result<()> {
    clear_env();
    let dir = TempDir::new()?;
    let malformed = write_config(&dir, "matching: [1, 2\n")?;
    assert_eq!(
        RunbaseConfig::load(Some(&malformed)).unwrap_err().code,
        ErrorCode::ConfigInvalid
    );

    let narrow_band = write_config(
        &dir,
        "resolution:\n  tolerances:\n    distance: { tolerance: 4.0, auto_band: 2.0 }\n",
    )?;
    let err = RunbaseConfig::load(Some(&narrow_band)).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigInvalid);
    assert!(err.message.contains("distance"));
    Ok(())
}
