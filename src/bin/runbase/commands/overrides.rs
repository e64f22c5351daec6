// ABOUTME: Override and manual-link commands for the runbase CLI
// ABOUTME: Pins or releases a field value and attaches orphaned records to activities
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase::review::ReviewService;
use runbase_core::errors::AppResult;
use runbase_core::models::ActivityField;
use uuid::Uuid;

use crate::helpers::display::display_activity;

/// Pin a field to a value
pub async fn set(
    review: &ReviewService,
    activity_id: Uuid,
    field: &str,
    value: &str,
) -> AppResult<()> {
    let field = field.parse::<ActivityField>()?;
    let activity = review.set_override(activity_id, field, value).await?;
    println!("Override set: {field} = {value}");
    display_activity(&activity);
    Ok(())
}

/// Release a pinned field
pub async fn clear(review: &ReviewService, activity_id: Uuid, field: &str) -> AppResult<()> {
    let field = field.parse::<ActivityField>()?;
    let activity = review.clear_override(activity_id, field).await?;
    println!("Override cleared: {field}");
    display_activity(&activity);
    Ok(())
}

/// Attach a record to an activity
pub async fn link(review: &ReviewService, record_id: Uuid, activity_id: Uuid) -> AppResult<()> {
    let activity = review.link_record(record_id, activity_id).await?;
    println!("Linked record {record_id}");
    display_activity(&activity);
    Ok(())
}
