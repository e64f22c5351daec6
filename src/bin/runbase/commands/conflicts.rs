// ABOUTME: Conflict review commands for the runbase CLI
// ABOUTME: Lists conflicts by status and settles one by origin or custom value
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase::review::{ConflictChoice, ReviewService};
use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::{ConflictStatus, SourceOrigin};
use uuid::Uuid;

use crate::helpers::display::display_conflict;

/// List conflicts, all of them when no status is given
pub async fn list(review: &ReviewService, status: Option<&str>) -> AppResult<()> {
    let status = status.map(str::parse::<ConflictStatus>).transpose()?;
    let conflicts = review.list_conflicts(status).await?;
    if conflicts.is_empty() {
        println!("No conflicts");
    }
    for conflict in &conflicts {
        display_conflict(conflict);
    }
    Ok(())
}

/// Settle a conflict; exactly one of `origin` and `value` must be given
pub async fn resolve(
    review: &ReviewService,
    conflict_id: Uuid,
    origin: Option<String>,
    value: Option<String>,
) -> AppResult<()> {
    let choice = match (origin, value) {
        (Some(origin), None) => ConflictChoice::Source(origin.parse::<SourceOrigin>()?),
        (None, Some(value)) => ConflictChoice::Custom(value),
        _ => {
            return Err(AppError::invalid_input(
                "Pass either --origin or --value to resolve a conflict",
            ))
        }
    };
    let conflict = review.resolve_conflict(conflict_id, choice).await?;
    display_conflict(&conflict);
    Ok(())
}
