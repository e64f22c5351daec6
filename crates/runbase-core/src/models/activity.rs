// ABOUTME: Canonical activity model and the field vocabulary used by resolution
// ABOUTME: ActivityField with aggregation kinds, typed FieldValue, and sticky manual overrides
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::workout::WorkoutType;

/// One real-world run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalActivity {
    /// Storage identifier
    pub id: Uuid,
    /// Local calendar date
    pub date: NaiveDate,
    /// Start timestamp
    pub start_time: Option<DateTime<Utc>>,
    /// Resolved distance in meters
    pub distance_m: Option<f64>,
    /// Resolved duration in seconds
    pub duration_s: Option<f64>,
    /// Derived average pace in seconds per kilometer
    pub pace_s_per_km: Option<f64>,
    /// Average heart rate
    pub avg_hr: Option<f64>,
    /// Maximum heart rate
    pub max_hr: Option<f64>,
    /// Average cadence
    pub avg_cadence: Option<f64>,
    /// Total ascent in meters
    pub total_ascent_m: Option<f64>,
    /// Energy in kilocalories
    pub calories: Option<f64>,
    /// Workout classification
    pub workout_type: Option<WorkoutType>,
    /// Workout title
    pub workout_name: Option<String>,
    /// Merged notes
    pub notes: Option<String>,
    /// Shoe / gear reference
    pub shoe_ref: Option<String>,
    /// Distance excluding walking intervals
    pub adjusted_distance_m: Option<f64>,
    /// VDOT in effect on the activity date
    pub vdot_snapshot: Option<f64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl CanonicalActivity {
    /// Create an empty activity dated `date`
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            date,
            start_time: None,
            distance_m: None,
            duration_s: None,
            pace_s_per_km: None,
            avg_hr: None,
            max_hr: None,
            avg_cadence: None,
            total_ascent_m: None,
            calories: None,
            workout_type: None,
            workout_name: None,
            notes: None,
            shoe_ref: None,
            adjusted_distance_m: None,
            vdot_snapshot: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current value of a resolvable field
    #[must_use]
    pub fn get(&self, field: ActivityField) -> Option<FieldValue> {
        match field {
            ActivityField::Date => Some(FieldValue::Date(self.date)),
            ActivityField::StartTime => self.start_time.map(FieldValue::Timestamp),
            ActivityField::Distance => self.distance_m.map(FieldValue::Number),
            ActivityField::Duration => self.duration_s.map(FieldValue::Number),
            ActivityField::AvgHr => self.avg_hr.map(FieldValue::Number),
            ActivityField::MaxHr => self.max_hr.map(FieldValue::Number),
            ActivityField::AvgCadence => self.avg_cadence.map(FieldValue::Number),
            ActivityField::TotalAscent => self.total_ascent_m.map(FieldValue::Number),
            ActivityField::Calories => self.calories.map(FieldValue::Number),
            ActivityField::WorkoutName => self.workout_name.clone().map(FieldValue::Text),
            ActivityField::WorkoutType => self
                .workout_type
                .map(|t| FieldValue::Text(t.as_str().to_owned())),
            ActivityField::Notes => self.notes.clone().map(FieldValue::Text),
            ActivityField::ShoeRef => self.shoe_ref.clone().map(FieldValue::Text),
        }
    }

    /// Assign a resolved value, returning whether the stored value changed
    ///
    /// `None` clears the field (the date is never cleared).
    pub fn set(&mut self, field: ActivityField, value: Option<FieldValue>) -> bool {
        if self.get(field) == value {
            return false;
        }
        match field {
            ActivityField::Date => {
                if let Some(date) = value.as_ref().and_then(FieldValue::as_date) {
                    self.date = date;
                } else {
                    return false;
                }
            }
            ActivityField::StartTime => {
                self.start_time = value.as_ref().and_then(FieldValue::as_timestamp);
            }
            ActivityField::Distance => self.distance_m = value.as_ref().and_then(FieldValue::as_number),
            ActivityField::Duration => self.duration_s = value.as_ref().and_then(FieldValue::as_number),
            ActivityField::AvgHr => self.avg_hr = value.as_ref().and_then(FieldValue::as_number),
            ActivityField::MaxHr => self.max_hr = value.as_ref().and_then(FieldValue::as_number),
            ActivityField::AvgCadence => {
                self.avg_cadence = value.as_ref().and_then(FieldValue::as_number);
            }
            ActivityField::TotalAscent => {
                self.total_ascent_m = value.as_ref().and_then(FieldValue::as_number);
            }
            ActivityField::Calories => self.calories = value.as_ref().and_then(FieldValue::as_number),
            ActivityField::WorkoutName => self.workout_name = value.and_then(FieldValue::into_text),
            ActivityField::WorkoutType => {
                self.workout_type = value
                    .and_then(FieldValue::into_text)
                    .and_then(|t| t.parse().ok());
            }
            ActivityField::Notes => self.notes = value.and_then(FieldValue::into_text),
            ActivityField::ShoeRef => self.shoe_ref = value.and_then(FieldValue::into_text),
        }
        true
    }

    /// Recompute pace from distance and duration
    pub fn refresh_pace(&mut self) -> bool {
        let pace = match (self.distance_m, self.duration_s) {
            (Some(d), Some(t)) if d > 0.0 && t > 0.0 => Some(t / (d / 1_000.0)),
            _ => None,
        };
        let changed = pace != self.pace_s_per_km;
        self.pace_s_per_km = pace;
        changed
    }
}

/// How per-record values of one origin collapse into one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Summed across records (distance, duration)
    Sum,
    /// Duration-weighted mean (average HR, cadence)
    WeightedMean,
    /// Maximum across records
    Max,
    /// Earliest across records (start time, date)
    Earliest,
    /// Taken from the longest record
    Primary,
    /// Concatenated across all origins with attribution
    Merge,
}

/// A resolvable activity field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityField {
    /// Calendar date
    Date,
    /// Start timestamp
    StartTime,
    /// Distance in meters
    Distance,
    /// Duration in seconds
    Duration,
    /// Average heart rate
    AvgHr,
    /// Maximum heart rate
    MaxHr,
    /// Average cadence
    AvgCadence,
    /// Total ascent
    TotalAscent,
    /// Calories
    Calories,
    /// Workout title
    WorkoutName,
    /// Workout classification
    WorkoutType,
    /// Notes
    Notes,
    /// Shoe reference
    ShoeRef,
}

impl ActivityField {
    /// All resolvable fields in resolution order
    pub const ALL: [Self; 13] = [
        Self::Date,
        Self::StartTime,
        Self::Distance,
        Self::Duration,
        Self::AvgHr,
        Self::MaxHr,
        Self::AvgCadence,
        Self::TotalAscent,
        Self::Calories,
        Self::WorkoutName,
        Self::WorkoutType,
        Self::Notes,
        Self::ShoeRef,
    ];

    /// Aggregation kind
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Date | Self::StartTime => FieldKind::Earliest,
            Self::Distance | Self::Duration | Self::TotalAscent | Self::Calories => FieldKind::Sum,
            Self::AvgHr | Self::AvgCadence => FieldKind::WeightedMean,
            Self::MaxHr => FieldKind::Max,
            Self::WorkoutName | Self::WorkoutType | Self::ShoeRef => FieldKind::Primary,
            Self::Notes => FieldKind::Merge,
        }
    }

    /// Stable storage identifier
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::StartTime => "start_time",
            Self::Distance => "distance",
            Self::Duration => "duration",
            Self::AvgHr => "avg_hr",
            Self::MaxHr => "max_hr",
            Self::AvgCadence => "avg_cadence",
            Self::TotalAscent => "total_ascent",
            Self::Calories => "calories",
            Self::WorkoutName => "workout_name",
            Self::WorkoutType => "workout_type",
            Self::Notes => "notes",
            Self::ShoeRef => "shoe_ref",
        }
    }

    /// Parse a user-supplied override value for this field
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the text does not fit the field's type
    pub fn parse_value(&self, raw: &str) -> AppResult<FieldValue> {
        let raw = raw.trim();
        match self {
            Self::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(FieldValue::Date)
                .map_err(|e| AppError::invalid_input(format!("Invalid date '{raw}': {e}"))),
            Self::StartTime => DateTime::parse_from_rfc3339(raw)
                .map(|dt| FieldValue::Timestamp(dt.with_timezone(&Utc)))
                .map_err(|e| AppError::invalid_input(format!("Invalid timestamp '{raw}': {e}"))),
            Self::Distance
            | Self::Duration
            | Self::AvgHr
            | Self::MaxHr
            | Self::AvgCadence
            | Self::TotalAscent
            | Self::Calories => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(FieldValue::Number)
                .ok_or_else(|| {
                    AppError::invalid_input(format!("Invalid number '{raw}' for {self}"))
                }),
            Self::WorkoutType => raw
                .parse::<WorkoutType>()
                .map(|t| FieldValue::Text(t.as_str().to_owned())),
            Self::WorkoutName | Self::Notes | Self::ShoeRef => {
                Ok(FieldValue::Text(raw.to_owned()))
            }
        }
    }
}

impl fmt::Display for ActivityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s.trim())
            .ok_or_else(|| AppError::invalid_input(format!("Unknown activity field '{s}'")))
    }
}

/// A typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Numeric quantity
    Number(f64),
    /// Free text
    Text(String),
    /// Instant
    Timestamp(DateTime<Utc>),
    /// Calendar date
    Date(NaiveDate),
}

impl FieldValue {
    /// Numeric payload
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Timestamp payload
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Date payload
    #[must_use]
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Text payload, consuming the value
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Magnitude of disagreement with `other`
    ///
    /// Numbers compare as a percentage of `self`, timestamps in seconds, dates in days.
    /// Text has no magnitude: `Some(0.0)` when equal ignoring case and surrounding
    /// whitespace, `None` otherwise.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Option<f64> {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                if (a - b).abs() < f64::EPSILON {
                    Some(0.0)
                } else if a.abs() < f64::EPSILON {
                    Some(f64::INFINITY)
                } else {
                    Some((a - b).abs() / a.abs() * 100.0)
                }
            }
            (Self::Timestamp(a), Self::Timestamp(b)) => {
                Some((*a - *b).num_milliseconds().abs() as f64 / 1_000.0)
            }
            (Self::Date(a), Self::Date(b)) => Some((*a - *b).num_days().abs() as f64),
            (Self::Text(a), Self::Text(b)) => {
                if a.trim().eq_ignore_ascii_case(b.trim()) {
                    Some(0.0)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Text rendering used by the CLI and override storage
    #[must_use]
    pub fn to_storage_string(&self) -> String {
        match self {
            Self::Number(v) => format!("{v}"),
            Self::Text(t) => t.clone(),
            Self::Timestamp(ts) => ts.to_rfc3339(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_string())
    }
}

/// A sticky manual value for one field of one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOverride {
    /// Activity
    pub activity_id: Uuid,
    /// Field
    pub field: ActivityField,
    /// Value that always wins resolution
    pub value: FieldValue,
    /// When the override was last written
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_difference_is_relative_to_self() {
        let a = FieldValue::Number(5_000.0);
        let b = FieldValue::Number(5_020.0);
        let diff = a.difference(&b).unwrap();
        assert!((diff - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_text_difference() {
        let a = FieldValue::Text("6x400m".into());
        assert_eq!(a.difference(&FieldValue::Text(" 6X400M ".into())), Some(0.0));
        assert_eq!(a.difference(&FieldValue::Text("tempo".into())), None);
    }

    #[test]
    fn test_set_reports_changes() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
        let mut activity = CanonicalActivity::new(date);
        assert!(activity.set(ActivityField::Distance, Some(FieldValue::Number(5_000.0))));
        assert!(!activity.set(ActivityField::Distance, Some(FieldValue::Number(5_000.0))));
        assert!(!activity.set(ActivityField::Date, None));
        assert_eq!(activity.date, date);
    }

    #[test]
    fn test_parse_override_values() {
        assert_eq!(
            ActivityField::Distance.parse_value("3200").unwrap(),
            FieldValue::Number(3_200.0)
        );
        assert!(ActivityField::Distance.parse_value("-1").is_err());
        assert_eq!(
            ActivityField::WorkoutType.parse_value("Tempo").unwrap(),
            FieldValue::Text("tempo".into())
        );
        assert!("pace".parse::<ActivityField>().is_err());
    }
}
