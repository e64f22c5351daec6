// ABOUTME: Output formatting helpers for the runbase CLI
// ABOUTME: Console rendering of run reports, conflicts, activities, VDOT entries, and efforts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase::pipeline::RunReport;
use runbase::review::StoreStatus;
use runbase_core::models::{CanonicalActivity, Conflict, VdotEntry};
use runbase_intelligence::vdot::format_pace;
use runbase_intelligence::FastestEffort;

/// Print a run report
pub fn display_run_report(report: &RunReport) {
    println!("\nReconciliation finished in {} ms", report.duration_ms);
    println!("{}", "=".repeat(60));
    println!("   Records considered:   {}", report.records_considered);
    println!("   Records linked:       {}", report.records_linked);
    println!("   Activities created:   {}", report.activities_created);
    println!("   Activities updated:   {}", report.activities_updated);
    println!("   Activities processed: {}", report.activities_processed);
    println!("   Conflicts written:    {}", report.conflicts_written);
    println!(
        "   Intervals written:    {} ({} removed)",
        report.intervals_written, report.intervals_deleted
    );
    println!("   Tracks detected:      {}", report.tracks_detected);
    if report.names_classified > 0 {
        println!("   Titles classified:    {}", report.names_classified);
    }

    if !report.issues.is_empty() {
        println!("\nIssues ({}):", report.issues.len());
        for issue in &report.issues {
            println!("  [{}] {issue}", issue.kind());
        }
    }

    if !report.failures.is_empty() {
        println!("\nFailures ({}):", report.failures.len());
        for failure in &report.failures {
            println!("  {}: {}", failure.activity_id, failure.message);
        }
    }
}

/// Print one conflict with its competing values
pub fn display_conflict(conflict: &Conflict) {
    println!(
        "{}  activity {}  {}  [{}]",
        conflict.id, conflict.activity_id, conflict.field, conflict.status
    );
    for value in &conflict.values {
        let marker = if conflict.winning_origin == Some(value.origin) {
            "*"
        } else {
            " "
        };
        println!(
            "   {marker} {:<14} {}",
            value.origin.as_str(),
            value.value.to_storage_string()
        );
    }
    if conflict.winning_origin.is_none() {
        if let Some(value) = &conflict.winning_value {
            println!("   * {:<14} {}", "custom", value.to_storage_string());
        }
    }
}

/// Print an activity summary line
pub fn display_activity(activity: &CanonicalActivity) {
    let distance = activity
        .distance_m
        .map_or_else(|| "-".to_owned(), |d| format!("{:.2} km", d / 1_000.0));
    let pace = activity
        .pace_s_per_km
        .map_or_else(|| "-".to_owned(), format_pace);
    println!(
        "{}  {}  {:>10}  {:>9}  {}",
        activity.id,
        activity.date,
        distance,
        pace,
        activity.workout_name.as_deref().unwrap_or("")
    );
}

/// Print one VDOT history entry
pub fn display_vdot_entry(entry: &VdotEntry) {
    println!(
        "{}  VDOT {:>5.1}  {}{}",
        entry.effective_date,
        entry.vdot,
        entry.source,
        entry
            .notes
            .as_deref()
            .map(|n| format!("  ({n})"))
            .unwrap_or_default()
    );
}

/// Print the store overview
pub fn display_status(status: &StoreStatus) {
    println!("\nRunBase store");
    println!("{}", "=".repeat(60));
    println!("   Activities:        {}", status.activities);
    for count in &status.records {
        println!(
            "   {:<18} {} records, {} linked",
            format!("{}:", count.origin.as_str()),
            count.total,
            count.linked
        );
    }
    println!("   Pending conflicts: {}", status.pending_conflicts);
    println!("   Known tracks:      {}", status.tracks);
    match &status.current_vdot {
        Some(entry) => println!("   Current VDOT:      {:.1} (since {})", entry.vdot, entry.effective_date),
        None => println!("   Current VDOT:      not set"),
    }
}

/// `h:mm:ss` or `m:ss.s`
fn format_duration(seconds: f64) -> String {
    let tenths = (seconds * 10.0).round() as u64;
    let (whole, tenth) = (tenths / 10, tenths % 10);
    if whole >= 3_600 {
        format!("{}:{:02}:{:02}", whole / 3_600, whole % 3_600 / 60, whole % 60)
    } else {
        format!("{}:{:02}.{tenth}", whole / 60, whole % 60)
    }
}

/// Print one ranked effort
pub fn display_effort(rank: usize, effort: &FastestEffort) {
    let rep = effort
        .rep_number
        .map(|r| format!("rep {r}"))
        .unwrap_or_default();
    println!(
        "{rank:>3}. {}  {:>8}  {:>10}  {:<9} {:<6} {}",
        effort.date,
        format_duration(effort.duration_s),
        format_pace(effort.pace_s_per_km),
        effort.source.as_str(),
        rep,
        effort.workout_name.as_deref().unwrap_or("")
    );
}
