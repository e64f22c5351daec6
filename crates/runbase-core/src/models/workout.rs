// ABOUTME: Workout classification and fitness history models
// ABOUTME: WorkoutType taxonomy with structured/unstructured split, and dated VDOT entries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use crate::errors::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Workout classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutType {
    /// Easy aerobic run
    Easy,
    /// Recovery jog
    Recovery,
    /// Long run
    Long,
    /// Continuous threshold effort
    Tempo,
    /// VO2max-style repeats
    Interval,
    /// Short fast repeats
    Repetition,
    /// Race or time trial
    Race,
    /// Hill repeats
    Hills,
    /// Unstructured speed play
    Fartlek,
}

impl WorkoutType {
    /// Whether native laps carry the workout's structure
    ///
    /// Structured workouts keep device laps as their intervals; everything else is
    /// segmented from telemetry by pace.
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        matches!(
            self,
            Self::Tempo
                | Self::Interval
                | Self::Repetition
                | Self::Race
                | Self::Hills
                | Self::Fartlek
        )
    }

    /// Stable storage identifier
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Recovery => "recovery",
            Self::Long => "long",
            Self::Tempo => "tempo",
            Self::Interval => "interval",
            Self::Repetition => "repetition",
            Self::Race => "race",
            Self::Hills => "hills",
            Self::Fartlek => "fartlek",
        }
    }
}

impl fmt::Display for WorkoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkoutType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "recovery" => Ok(Self::Recovery),
            "long" | "long_run" => Ok(Self::Long),
            "tempo" | "threshold" => Ok(Self::Tempo),
            "interval" | "intervals" | "workout" => Ok(Self::Interval),
            "repetition" | "reps" => Ok(Self::Repetition),
            "race" | "time_trial" => Ok(Self::Race),
            "hills" | "hill" => Ok(Self::Hills),
            "fartlek" => Ok(Self::Fartlek),
            other => Err(AppError::invalid_input(format!(
                "Unknown workout type '{other}'"
            ))),
        }
    }
}

/// A dated fitness value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VdotEntry {
    /// First day the value applies
    pub effective_date: NaiveDate,
    /// VDOT value
    pub vdot: f64,
    /// How the value was obtained ("manual", "race:5000m/1200s", ...)
    pub source: String,
    /// Free-text notes
    pub notes: Option<String>,
    /// Storage timestamp
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_split() {
        assert!(WorkoutType::Tempo.is_structured());
        assert!(WorkoutType::Race.is_structured());
        assert!(!WorkoutType::Easy.is_structured());
        assert!(!WorkoutType::Long.is_structured());
        assert!(!WorkoutType::Recovery.is_structured());
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("Threshold".parse::<WorkoutType>().unwrap(), WorkoutType::Tempo);
        assert_eq!("reps".parse::<WorkoutType>().unwrap(), WorkoutType::Repetition);
        assert!("jog".parse::<WorkoutType>().is_err());
    }
}
