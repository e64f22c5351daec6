// ABOUTME: VDOT history commands for the runbase CLI
// ABOUTME: Manual entries, race-derived entries, and the history listing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use chrono::NaiveDate;
use runbase::review::ReviewService;
use runbase_core::errors::AppResult;
use runbase_intelligence::vdot::format_pace;
use runbase_intelligence::TrainingPaces;

use crate::helpers::display::display_vdot_entry;

/// Record a VDOT value by hand
pub async fn set(
    review: &ReviewService,
    date: NaiveDate,
    vdot: f64,
    notes: Option<String>,
) -> AppResult<()> {
    let entry = review.set_vdot(date, vdot, notes).await?;
    display_vdot_entry(&entry);
    Ok(())
}

/// Derive VDOT from a race and show the resulting training paces
pub async fn from_race(
    review: &ReviewService,
    date: NaiveDate,
    distance_m: f64,
    time_s: f64,
    notes: Option<String>,
) -> AppResult<()> {
    let entry = review.vdot_from_race(date, distance_m, time_s, notes).await?;
    display_vdot_entry(&entry);

    let paces = TrainingPaces::from_vdot(entry.vdot)?;
    println!("   Easy:       {}", format_pace(paces.easy));
    println!("   Marathon:   {}", format_pace(paces.marathon));
    println!("   Threshold:  {}", format_pace(paces.threshold));
    println!("   Interval:   {}", format_pace(paces.interval));
    println!("   Repetition: {}", format_pace(paces.repetition));
    Ok(())
}

/// Print the VDOT history
pub async fn show(review: &ReviewService) -> AppResult<()> {
    let history = review.vdot_history().await?;
    if history.is_empty() {
        println!("No VDOT entries recorded");
    }
    for entry in &history {
        display_vdot_entry(entry);
    }
    Ok(())
}
