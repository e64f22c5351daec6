// ABOUTME: Fastest-effort ranking command for the runbase CLI
// ABOUTME: Ranks snapped reps and GPS windows at a distance and prints them as a table or JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use chrono::NaiveDate;
use runbase::review::ReviewService;
use runbase_core::errors::AppResult;

use crate::helpers::display::display_effort;

/// Print the quickest efforts at a distance
pub async fn run(
    review: &ReviewService,
    distance_m: f64,
    limit: usize,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    json: bool,
) -> AppResult<()> {
    let efforts = review.fastest_efforts(distance_m, limit, from, to).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&efforts)?);
        return Ok(());
    }
    if efforts.is_empty() {
        println!("No efforts found at {distance_m:.0} m");
    }
    for (rank, effort) in efforts.iter().enumerate() {
        display_effort(rank + 1, effort);
    }
    Ok(())
}
