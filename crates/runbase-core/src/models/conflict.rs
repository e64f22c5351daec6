// ABOUTME: Field-level disagreement records between sources of one activity
// ABOUTME: Conflict with competing per-origin values, lifecycle status, and the chosen winner
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::activity::{ActivityField, FieldValue};
use super::source::SourceOrigin;

/// Conflict lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Needs a human decision
    Pending,
    /// Settled by configured priority within the automatic band
    AutoResolved,
    /// Settled by a reviewer
    Resolved,
}

impl ConflictStatus {
    /// Stable storage identifier
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AutoResolved => "auto_resolved",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "auto_resolved" => Ok(Self::AutoResolved),
            "resolved" => Ok(Self::Resolved),
            other => Err(AppError::invalid_input(format!(
                "Unknown conflict status '{other}'"
            ))),
        }
    }
}

/// One source's value for a contested field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceValue {
    /// Origin that reported the value
    pub origin: SourceOrigin,
    /// Aggregated value from that origin
    pub value: FieldValue,
}

/// Disagreement on one field of one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Storage identifier
    pub id: Uuid,
    /// Activity
    pub activity_id: Uuid,
    /// Contested field
    pub field: ActivityField,
    /// Competing values in priority order
    pub values: Vec<SourceValue>,
    /// Lifecycle status
    pub status: ConflictStatus,
    /// Origin whose value was chosen, if any
    pub winning_origin: Option<SourceOrigin>,
    /// Chosen value
    pub winning_value: Option<FieldValue>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Conflict {
    /// Whether a reviewer still has to act
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == ConflictStatus::Pending
    }
}
