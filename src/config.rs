// ABOUTME: Reconciliation configuration loaded from YAML with environment overrides
// ABOUTME: Matching tolerances, per-field source priority, pace thresholds, courses, and classifier settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Configuration
//!
//! All sections are optional in the YAML file; anything missing takes its
//! default. The file path comes from the CLI or `RUNBASE_CONFIG`, and
//! `RUNBASE_DATABASE_URL` / `RUNBASE_CLASSIFIER_URL` override the file.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use runbase_core::constants::limits;
use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::{ActivityField, MeasuredCourse, SourceOrigin};
use runbase_intelligence::geometry::{TrackDetectionConfig, DEFAULT_COURSE_TOLERANCE_PCT};
use runbase_intelligence::pace_segments::PaceSegmentConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Environment variable naming the YAML configuration file
pub const CONFIG_PATH_ENV: &str = "RUNBASE_CONFIG";
/// Environment variable overriding `database_url`
pub const DATABASE_URL_ENV: &str = "RUNBASE_DATABASE_URL";
/// Environment variable overriding `classifier.url`
pub const CLASSIFIER_URL_ENV: &str = "RUNBASE_CLASSIFIER_URL";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunbaseConfig {
    /// `SQLx` connection URL
    pub database_url: String,
    /// Attempts per activity transaction before the activity is counted as failed
    pub transaction_retries: u32,
    /// Source matcher tolerances
    pub matching: MatchingConfig,
    /// Field resolver priorities and tolerances
    pub resolution: ResolutionConfig,
    /// Enrichment thresholds and geometry settings
    pub paces: PaceConfig,
    /// Fallback workout classifier
    pub classifier: ClassifierConfig,
}

impl Default for RunbaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:runbase.db".into(),
            transaction_retries: 3,
            matching: MatchingConfig::default(),
            resolution: ResolutionConfig::default(),
            paces: PaceConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Source matcher tolerances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Largest date difference for a one-to-one match, in days
    pub day_tolerance: i64,
    /// Largest distance difference for a one-to-one match, percent
    pub distance_tolerance_pct: f64,
    /// Largest difference between a record group's summed distance and an activity, percent
    pub group_distance_tolerance_pct: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            day_tolerance: 1,
            distance_tolerance_pct: 5.0,
            group_distance_tolerance_pct: 10.0,
        }
    }
}

/// Disagreement thresholds for one field
///
/// Units follow [`runbase_core::models::FieldValue::difference`]: percent for
/// numbers, seconds for timestamps, days for dates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldTolerance {
    /// Differences above this produce a conflict
    pub tolerance: f64,
    /// Conflicts whose values all lie within this band resolve automatically
    pub auto_band: f64,
}

impl FieldTolerance {
    /// Build a tolerance pair
    #[must_use]
    pub const fn new(tolerance: f64, auto_band: f64) -> Self {
        Self {
            tolerance,
            auto_band,
        }
    }
}

/// Field resolver priorities and tolerances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Source order for fields without their own list; also the promotion order
    pub default_priority: Vec<SourceOrigin>,
    /// Per-field source order, highest first
    pub field_priority: BTreeMap<ActivityField, Vec<SourceOrigin>>,
    /// Per-field disagreement thresholds
    pub tolerances: BTreeMap<ActivityField, FieldTolerance>,
    /// Threshold for numeric fields without their own entry
    pub default_numeric_tolerance: FieldTolerance,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        let narrative = vec![
            SourceOrigin::ManualLog,
            SourceOrigin::SocialApi,
            SourceOrigin::WearableFile,
        ];
        let field_priority = BTreeMap::from([
            (ActivityField::WorkoutName, narrative.clone()),
            (ActivityField::WorkoutType, narrative.clone()),
            (ActivityField::Notes, narrative),
            (
                ActivityField::ShoeRef,
                vec![
                    SourceOrigin::SocialApi,
                    SourceOrigin::ManualLog,
                    SourceOrigin::WearableFile,
                ],
            ),
        ]);
        let tolerances = BTreeMap::from([
            (ActivityField::Date, FieldTolerance::new(0.0, 1.0)),
            (ActivityField::StartTime, FieldTolerance::new(120.0, 900.0)),
            (ActivityField::Distance, FieldTolerance::new(1.0, 3.0)),
            (ActivityField::Duration, FieldTolerance::new(1.0, 3.0)),
            (ActivityField::AvgHr, FieldTolerance::new(3.0, 6.0)),
            (ActivityField::MaxHr, FieldTolerance::new(3.0, 6.0)),
            (ActivityField::TotalAscent, FieldTolerance::new(10.0, 25.0)),
            (ActivityField::Calories, FieldTolerance::new(10.0, 25.0)),
        ]);
        Self {
            default_priority: SourceOrigin::ALL.to_vec(),
            field_priority,
            tolerances,
            default_numeric_tolerance: FieldTolerance::new(2.0, 5.0),
        }
    }
}

impl ResolutionConfig {
    /// Source order for a field, highest first
    ///
    /// Origins missing from the configured list follow it in default order.
    #[must_use]
    pub fn priority_for(&self, field: ActivityField) -> Vec<SourceOrigin> {
        let mut order = self
            .field_priority
            .get(&field)
            .unwrap_or(&self.default_priority)
            .clone();
        for origin in SourceOrigin::ALL {
            if !order.contains(&origin) {
                order.push(origin);
            }
        }
        order
    }

    /// Whether an origin is explicitly listed for a field
    #[must_use]
    pub fn is_ranked(&self, field: ActivityField, origin: SourceOrigin) -> bool {
        self.field_priority
            .get(&field)
            .unwrap_or(&self.default_priority)
            .contains(&origin)
    }

    /// Disagreement thresholds for a field
    #[must_use]
    pub fn tolerance_for(&self, field: ActivityField) -> FieldTolerance {
        self.tolerances
            .get(&field)
            .copied()
            .unwrap_or(self.default_numeric_tolerance)
    }
}

/// Enrichment thresholds and geometry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceConfig {
    /// Paces at or slower than this are walking, seconds per km
    pub walking_threshold_s_per_km: f64,
    /// Laps shorter than this are strides, seconds
    pub stride_max_duration_s: f64,
    /// Telemetry pace segmentation
    pub segmentation: PaceSegmentConfig,
    /// Track detector tuning
    pub track_detection: TrackDetectionConfig,
    /// Configured measured-course geofences
    pub measured_courses: Vec<MeasuredCourse>,
    /// Allowed mismatch between an interval and a course distance, percent
    pub course_tolerance_pct: f64,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            walking_threshold_s_per_km: limits::DEFAULT_WALKING_THRESHOLD_S_PER_KM,
            stride_max_duration_s: limits::DEFAULT_STRIDE_MAX_DURATION_S,
            segmentation: PaceSegmentConfig::default(),
            track_detection: TrackDetectionConfig::default(),
            measured_courses: Vec::new(),
            course_tolerance_pct: DEFAULT_COURSE_TOLERANCE_PCT,
        }
    }
}

/// Fallback workout classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// HTTP endpoint; no classifier is used when absent
    pub url: Option<String>,
    /// Per-batch timeout in seconds
    pub timeout_secs: u64,
    /// Titles per request
    pub batch_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
            batch_size: 25,
        }
    }
}

impl RunbaseConfig {
    /// Load configuration
    ///
    /// Reads `path`, else the file named by `RUNBASE_CONFIG`, else starts from
    /// defaults; then applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or validation fails
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let env_path = env::var(CONFIG_PATH_ENV).ok();
        let path = path.or_else(|| env_path.as_deref().map(Path::new));

        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    AppError::config(format!("Failed to read config {}: {e}", path.display()))
                })?;
                info!(path = %path.display(), "Loading configuration");
                Self::from_yaml_str(&content)?
            }
            None => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };

        config.apply_environment_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed
    pub fn from_yaml_str(content: &str) -> AppResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| AppError::config_invalid(format!("Invalid configuration YAML: {e}")))
    }

    fn apply_environment_overrides(&mut self) {
        if let Ok(url) = env::var(DATABASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.database_url = url;
            }
        }
        if let Ok(url) = env::var(CLASSIFIER_URL_ENV) {
            self.classifier.url = Some(url).filter(|u| !u.trim().is_empty());
        }
    }

    /// Check tolerances, priorities, and courses for consistency
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` naming the first offending setting
    pub fn validate(&self) -> AppResult<()> {
        if self.database_url.trim().is_empty() {
            return Err(AppError::config_invalid("database_url must not be empty"));
        }
        if self.transaction_retries == 0 {
            return Err(AppError::config_invalid("transaction_retries must be at least 1"));
        }

        let matching = &self.matching;
        if matching.day_tolerance < 0 {
            return Err(AppError::config_invalid("matching.day_tolerance must not be negative"));
        }
        if matching.distance_tolerance_pct <= 0.0 {
            return Err(AppError::config_invalid(
                "matching.distance_tolerance_pct must be positive",
            ));
        }
        if matching.group_distance_tolerance_pct <= 0.0 {
            return Err(AppError::config_invalid(
                "matching.group_distance_tolerance_pct must be positive",
            ));
        }

        let resolution = &self.resolution;
        if resolution.default_priority.is_empty() {
            return Err(AppError::config_invalid(
                "resolution.default_priority must list at least one origin",
            ));
        }
        for (field, order) in &resolution.field_priority {
            if order.is_empty() {
                return Err(AppError::config_invalid(format!(
                    "resolution.field_priority.{field} must list at least one origin"
                )));
            }
        }
        let tolerances = resolution
            .tolerances
            .iter()
            .map(|(field, t)| (field.as_str(), t))
            .chain([("default_numeric_tolerance", &resolution.default_numeric_tolerance)]);
        for (name, tolerance) in tolerances {
            if tolerance.tolerance < 0.0 || !tolerance.tolerance.is_finite() {
                return Err(AppError::config_invalid(format!(
                    "resolution tolerance for {name} must be a non-negative number"
                )));
            }
            if tolerance.auto_band < tolerance.tolerance {
                return Err(AppError::config_invalid(format!(
                    "resolution auto_band for {name} is narrower than its tolerance"
                )));
            }
        }

        let paces = &self.paces;
        if paces.walking_threshold_s_per_km <= 0.0 {
            return Err(AppError::config_invalid(
                "paces.walking_threshold_s_per_km must be positive",
            ));
        }
        if paces.stride_max_duration_s < 0.0 {
            return Err(AppError::config_invalid(
                "paces.stride_max_duration_s must not be negative",
            ));
        }
        if paces.course_tolerance_pct <= 0.0 {
            return Err(AppError::config_invalid(
                "paces.course_tolerance_pct must be positive",
            ));
        }
        if paces.track_detection.window_size < 3 || paces.track_detection.window_step == 0 {
            return Err(AppError::config_invalid(
                "paces.track_detection needs window_size >= 3 and window_step >= 1",
            ));
        }
        for course in &paces.measured_courses {
            if course.name.trim().is_empty() {
                return Err(AppError::config_invalid("measured course without a name"));
            }
            if !(-90.0..=90.0).contains(&course.lat) || !(-180.0..=180.0).contains(&course.lon) {
                return Err(AppError::config_invalid(format!(
                    "measured course '{}' has an invalid centroid",
                    course.name
                )));
            }
            if course.radius_m <= 0.0 || course.snap_distance_m <= 0.0 {
                return Err(AppError::config_invalid(format!(
                    "measured course '{}' needs a positive radius and snap distance",
                    course.name
                )));
            }
        }

        if self.classifier.batch_size == 0 || self.classifier.timeout_secs == 0 {
            return Err(AppError::config_invalid(
                "classifier.batch_size and classifier.timeout_secs must be positive",
            ));
        }
        Ok(())
    }
}
