// ABOUTME: Non-fatal reconciliation conditions collected in the run report
// ABOUTME: Ambiguous matches, tolerance conflicts, geometry rejections, and parse / classifier gaps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::models::{ActivityField, ConflictStatus};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::logging::AppLogger;

/// A condition worth reporting that never stops the batch
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileIssue {
    /// Several activities fit a record (or record group) equally well; left unlinked
    #[error("record {record_id} matches {count} activities equally well", count = candidates.len())]
    AmbiguousMatch {
        /// Record left orphaned
        record_id: Uuid,
        /// Tied candidate activities
        candidates: Vec<Uuid>,
    },
    /// Sources disagree on a field beyond its tolerance
    #[error("{field} of activity {activity_id} disagrees across sources ({status})")]
    ToleranceExceeded {
        /// Activity
        activity_id: Uuid,
        /// Field in disagreement
        field: ActivityField,
        /// Stored conflict
        conflict_id: Uuid,
        /// Whether the conflict needs a reviewer
        status: ConflictStatus,
    },
    /// Track-sized telemetry windows failed the shape or dimension checks
    #[error("activity {activity_id}: {rejected} track-sized windows rejected, treated as road")]
    GeometryRejected {
        /// Activity
        activity_id: Uuid,
        /// Rejected windows
        rejected: usize,
    },
    /// The workout title could not be turned into a structure
    #[error("activity {activity_id}: workout name '{name}' not parsed ({reason})")]
    ParseAmbiguous {
        /// Activity
        activity_id: Uuid,
        /// Title text
        name: String,
        /// Why parsing gave up
        reason: String,
    },
    /// The fallback classifier failed or timed out
    #[error("fallback classifier unavailable: {reason}")]
    ClassifierUnavailable {
        /// Error or timeout description
        reason: String,
    },
}

impl ReconcileIssue {
    /// Stable kind label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::ToleranceExceeded { .. } => "tolerance_exceeded",
            Self::GeometryRejected { .. } => "geometry_rejected",
            Self::ParseAmbiguous { .. } => "parse_ambiguous",
            Self::ClassifierUnavailable { .. } => "classifier_unavailable",
        }
    }

    /// Record or activity the issue is about
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            Self::AmbiguousMatch { record_id, .. } => record_id.to_string(),
            Self::ToleranceExceeded { activity_id, .. }
            | Self::GeometryRejected { activity_id, .. }
            | Self::ParseAmbiguous { activity_id, .. } => activity_id.to_string(),
            Self::ClassifierUnavailable { .. } => "classifier".to_owned(),
        }
    }

    /// Emit the issue as a structured warning
    pub fn log(&self) {
        AppLogger::log_issue(self.kind(), &self.subject(), &self.to_string());
    }
}
