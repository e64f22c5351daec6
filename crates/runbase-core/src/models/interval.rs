// ABOUTME: Per-repetition interval model produced by enrichment
// ABOUTME: Interval with provenance, pace zone, location classification, and bitflag markers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::source::SourceOrigin;

bitflags::bitflags! {
    /// Boolean markers set by the enrichment stages
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct IntervalFlags: u8 {
        /// Recovery between work repetitions
        const RECOVERY = 0b0000_0001;
        /// Pace at or beyond the walking threshold
        const WALKING = 0b0000_0010;
        /// Short fast pickup
        const STRIDE = 0b0000_0100;
        /// The race effort of a race activity
        const RACE = 0b0000_1000;
    }
}

impl IntervalFlags {
    /// Check for the recovery marker
    #[must_use]
    pub const fn is_recovery(&self) -> bool {
        self.contains(Self::RECOVERY)
    }

    /// Check for the walking marker
    #[must_use]
    pub const fn is_walking(&self) -> bool {
        self.contains(Self::WALKING)
    }

    /// Check for the stride marker
    #[must_use]
    pub const fn is_stride(&self) -> bool {
        self.contains(Self::STRIDE)
    }

    /// Check for the race marker
    #[must_use]
    pub const fn is_race(&self) -> bool {
        self.contains(Self::RACE)
    }
}

/// Where an interval row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalProvenance {
    /// Wearable device lap
    DeviceLap,
    /// Social API lap
    ApiLap,
    /// Training-log split
    LogSplit,
    /// Derived from telemetry pace changes
    PaceSegment,
    /// Entered or corrected by a reviewer; never touched by enrichment
    Manual,
}

impl IntervalProvenance {
    /// Lap provenance for laps reported by `origin`
    #[must_use]
    pub const fn for_origin(origin: SourceOrigin) -> Self {
        match origin {
            SourceOrigin::WearableFile => Self::DeviceLap,
            SourceOrigin::SocialApi => Self::ApiLap,
            SourceOrigin::ManualLog => Self::LogSplit,
        }
    }

    /// Stable storage identifier
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceLap => "device_lap",
            Self::ApiLap => "api_lap",
            Self::LogSplit => "log_split",
            Self::PaceSegment => "pace_segment",
            Self::Manual => "manual",
        }
    }

    /// Whether the timing of this row comes straight from a device or API
    #[must_use]
    pub const fn has_trusted_offsets(&self) -> bool {
        matches!(self, Self::DeviceLap | Self::ApiLap)
    }
}

impl FromStr for IntervalProvenance {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device_lap" => Ok(Self::DeviceLap),
            "api_lap" => Ok(Self::ApiLap),
            "log_split" => Ok(Self::LogSplit),
            "pace_segment" => Ok(Self::PaceSegment),
            "manual" => Ok(Self::Manual),
            other => Err(AppError::invalid_input(format!(
                "Unknown interval provenance '{other}'"
            ))),
        }
    }
}

/// Physical context of an interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    /// Standard 400 m track
    Track,
    /// Configured measured course
    MeasuredCourse,
    /// Open road / trail
    Road,
    /// Not determined
    #[default]
    Unknown,
}

impl LocationType {
    /// Stable storage identifier
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::MeasuredCourse => "measured_course",
            Self::Road => "road",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for LocationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(Self::Track),
            "measured_course" => Ok(Self::MeasuredCourse),
            "road" => Ok(Self::Road),
            "unknown" => Ok(Self::Unknown),
            other => Err(AppError::invalid_input(format!(
                "Unknown location type '{other}'"
            ))),
        }
    }
}

/// Daniels training zone for a pace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PaceZone {
    /// Walking
    #[serde(rename = "walk")]
    Walk,
    /// Easy
    #[serde(rename = "E")]
    Easy,
    /// Marathon
    #[serde(rename = "M")]
    Marathon,
    /// Threshold
    #[serde(rename = "T")]
    Threshold,
    /// Interval (VO2max)
    #[serde(rename = "I")]
    Interval,
    /// Repetition
    #[serde(rename = "R")]
    Repetition,
    /// Fast repetition
    #[serde(rename = "FR")]
    FastRepetition,
}

impl PaceZone {
    /// Zones that count as work in a structured session
    #[must_use]
    pub const fn is_work(&self) -> bool {
        matches!(
            self,
            Self::Threshold | Self::Interval | Self::Repetition | Self::FastRepetition
        )
    }

    /// Short label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Easy => "E",
            Self::Marathon => "M",
            Self::Threshold => "T",
            Self::Interval => "I",
            Self::Repetition => "R",
            Self::FastRepetition => "FR",
        }
    }
}

impl fmt::Display for PaceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaceZone {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "walk" => Ok(Self::Walk),
            "E" => Ok(Self::Easy),
            "M" => Ok(Self::Marathon),
            "T" => Ok(Self::Threshold),
            "I" => Ok(Self::Interval),
            "R" => Ok(Self::Repetition),
            "FR" => Ok(Self::FastRepetition),
            other => Err(AppError::invalid_input(format!("Unknown pace zone '{other}'"))),
        }
    }
}

/// One repetition, lap, or pace segment of an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Owning activity
    pub activity_id: Uuid,
    /// One-based position within the activity
    pub rep_number: u32,
    /// Set grouping for structured sessions
    pub set_number: Option<u32>,
    /// Row provenance
    pub provenance: IntervalProvenance,
    /// Raw record whose laps / telemetry produced the row
    pub source_record_id: Option<Uuid>,
    /// Seconds from record start
    pub start_offset_s: Option<f64>,
    /// Seconds from record start
    pub end_offset_s: Option<f64>,
    /// Distance measured by GPS
    pub gps_distance_m: Option<f64>,
    /// Distance the workout prescribed
    pub prescribed_distance_m: Option<f64>,
    /// Best-known true distance after snapping
    pub canonical_distance_m: Option<f64>,
    /// Duration in seconds
    pub duration_s: Option<f64>,
    /// Pace in seconds per kilometer
    pub pace_s_per_km: Option<f64>,
    /// Average heart rate
    pub avg_hr: Option<f64>,
    /// Maximum heart rate
    pub max_hr: Option<f64>,
    /// Average cadence
    pub avg_cadence: Option<f64>,
    /// Training zone
    pub pace_zone: Option<PaceZone>,
    /// Stage markers
    pub flags: IntervalFlags,
    /// Physical context
    pub location_type: LocationType,
    /// Course name when `location_type` is a measured course
    pub location_name: Option<String>,
}

impl Interval {
    /// Create an interval with only timing and distance populated
    #[must_use]
    pub fn new(activity_id: Uuid, rep_number: u32, provenance: IntervalProvenance) -> Self {
        Self {
            activity_id,
            rep_number,
            set_number: None,
            provenance,
            source_record_id: None,
            start_offset_s: None,
            end_offset_s: None,
            gps_distance_m: None,
            prescribed_distance_m: None,
            canonical_distance_m: None,
            duration_s: None,
            pace_s_per_km: None,
            avg_hr: None,
            max_hr: None,
            avg_cadence: None,
            pace_zone: None,
            flags: IntervalFlags::empty(),
            location_type: LocationType::Unknown,
            location_name: None,
        }
    }

    /// Reviewer-owned rows are immutable to enrichment
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.provenance == IntervalProvenance::Manual
    }

    /// Canonical distance when snapped, otherwise the GPS distance
    #[must_use]
    pub fn effective_distance_m(&self) -> Option<f64> {
        self.canonical_distance_m
            .or(self.gps_distance_m)
            .filter(|d| *d > 0.0)
    }

    /// Recompute pace from the effective distance and the duration
    pub fn recompute_pace(&mut self) {
        self.pace_s_per_km = match (self.effective_distance_m(), self.duration_s) {
            (Some(d), Some(t)) if t > 0.0 => Some(t / (d / 1_000.0)),
            _ => self.pace_s_per_km,
        };
    }

    /// Both offsets, when known
    #[must_use]
    pub fn offsets(&self) -> Option<(f64, f64)> {
        self.start_offset_s.zip(self.end_offset_s)
    }
}
