// ABOUTME: Pluggable fallback classifier for workout titles the rule cascade cannot parse
// ABOUTME: Async provider trait plus validation that turns verdicts into ParsedWorkout values
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

//! # Fallback Workout Classifier
//!
//! When [`crate::workout_parser::WorkoutNameParser`] returns `Unrecognized`, the
//! title may be sent to an external classifier. Implementations batch titles and
//! return one verdict per title. Every verdict is validated with the same
//! plausibility bounds as the deterministic parser before it is used.
//!
//! The classifier is optional: callers treat any error as "unavailable" and fall
//! back to leaving the workout unparsed.

use async_trait::async_trait;
use runbase_core::constants::limits;
use runbase_core::errors::AppResult;
use runbase_core::models::WorkoutType;
use serde::{Deserialize, Serialize};

use crate::workout_parser::{ParseRule, ParsedWorkout, Recovery, RepeatSet, WorkoutStructure};

/// Raw classification returned by a provider for one title
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    /// Workout classification
    pub workout_type: Option<WorkoutType>,
    /// Repetition count for repeat sessions
    pub rep_count: Option<u32>,
    /// Repetition or effort distance in meters
    pub distance_m: Option<f64>,
    /// Recovery distance in meters
    pub recovery_m: Option<f64>,
    /// Recovery duration in seconds
    pub recovery_s: Option<f64>,
}

impl ClassifierVerdict {
    /// Validate the verdict and convert it into a parse
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the verdict is missing a type or
    /// carries values outside the plausibility bounds.
    pub fn validate(&self) -> Result<ParsedWorkout, String> {
        let workout_type = self
            .workout_type
            .ok_or_else(|| "classifier returned no workout type".to_owned())?;

        if let Some(distance) = self.distance_m {
            if !(limits::MIN_PRESCRIBED_DISTANCE_M..=limits::MAX_PRESCRIBED_DISTANCE_M)
                .contains(&distance)
            {
                return Err(format!("classifier distance {distance:.0} m is implausible"));
            }
        }

        let structure = match (self.rep_count, self.distance_m) {
            (Some(reps), _) if reps == 0 || reps > limits::MAX_REP_COUNT => {
                return Err(format!("classifier rep count {reps} is implausible"));
            }
            (Some(_), None) => {
                return Err("classifier rep count without a distance".to_owned());
            }
            (Some(reps), Some(distance_m)) => WorkoutStructure::Repeats {
                sets: vec![RepeatSet {
                    reps,
                    distance_m,
                    recovery: self
                        .recovery_m
                        .filter(|m| *m > 0.0)
                        .map(Recovery::Distance)
                        .or_else(|| self.recovery_s.filter(|s| *s > 0.0).map(Recovery::Duration)),
                }],
            },
            (None, Some(distance_m)) => WorkoutStructure::Continuous {
                distance_m: Some(distance_m),
            },
            (None, None) => WorkoutStructure::Unstructured,
        };

        Ok(ParsedWorkout {
            workout_type,
            structure,
            target_time_s: None,
            rule: ParseRule::Classifier,
        })
    }
}

/// Provider of fallback classifications
#[async_trait]
pub trait WorkoutClassifier: Send + Sync {
    /// Provider identifier used in logs
    fn name(&self) -> &'static str;

    /// Classify a batch of titles
    ///
    /// The result has one entry per input title, in order. `None` means the
    /// provider had no opinion on that title.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider cannot be reached or answers with
    /// malformed data. Callers treat this as the classifier being unavailable.
    async fn classify_batch(&self, names: &[String]) -> AppResult<Vec<Option<ClassifierVerdict>>>;
}

/// Classifier that never has an opinion; used when no provider is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopClassifier;

#[async_trait]
impl WorkoutClassifier for NoopClassifier {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn classify_batch(&self, names: &[String]) -> AppResult<Vec<Option<ClassifierVerdict>>> {
        Ok(vec![None; names.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_repeat_verdict() {
        let verdict = ClassifierVerdict {
            workout_type: Some(WorkoutType::Interval),
            rep_count: Some(5),
            distance_m: Some(1_000.0),
            recovery_s: Some(120.0),
            ..ClassifierVerdict::default()
        };
        let parsed = verdict.validate().unwrap();
        assert_eq!(parsed.rule, ParseRule::Classifier);
        assert_eq!(parsed.total_reps(), 5);
        let WorkoutStructure::Repeats { sets } = parsed.structure else {
            panic!("expected repeats");
        };
        assert_eq!(sets[0].recovery, Some(Recovery::Duration(120.0)));
    }

    #[test]
    fn test_implausible_verdicts_rejected() {
        let no_type = ClassifierVerdict::default();
        assert!(no_type.validate().is_err());

        let too_many = ClassifierVerdict {
            workout_type: Some(WorkoutType::Repetition),
            rep_count: Some(400),
            distance_m: Some(200.0),
            ..ClassifierVerdict::default()
        };
        assert!(too_many.validate().is_err());

        let too_far = ClassifierVerdict {
            workout_type: Some(WorkoutType::Long),
            distance_m: Some(250_000.0),
            ..ClassifierVerdict::default()
        };
        assert!(too_far.validate().is_err());
    }

    #[tokio::test]
    async fn test_noop_classifier_returns_one_entry_per_name() {
        let names = vec!["Thursday club".to_owned(), "Coach's special".to_owned()];
        let verdicts = NoopClassifier.classify_batch(&names).await.unwrap();
        assert_eq!(verdicts, vec![None, None]);
    }
}
