// ABOUTME: runbase CLI - reconciliation runs, ingestion, and reviewer corrections
// ABOUTME: Parses subcommands, loads configuration, opens the store, and maps errors to exit codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors
//!
//! Usage:
//! ```bash
//! # Create the database schema
//! runbase db init
//!
//! # Store records exported by the source parsers
//! runbase ingest records.json
//!
//! # Reconcile everything imported in March
//! runbase reconcile --from 2024-03-01 --to 2024-03-31
//!
//! # Record a VDOT from a 5k race
//! runbase vdot from-race --date 2024-03-10 --distance 5000 --time 1200
//!
//! # Review conflicts
//! runbase conflicts list --status pending
//! runbase conflicts resolve 6f1c... --origin wearable_file
//!
//! # Pin a field
//! runbase override set 9a2e... distance 5000
//!
//! # Ten quickest miles
//! runbase fastest --distance 1609.34
//! ```

mod commands;
mod helpers;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use runbase::config::RunbaseConfig;
use runbase::database::Database;
use runbase::logging::init_from_env;
use runbase_core::errors::AppResult;
use tracing::{error, info};
use uuid::Uuid;

type Result<T> = AppResult<T>;

#[derive(Parser)]
#[command(
    name = "runbase",
    about = "RunBase reconciliation engine",
    long_about = "Reconcile running records from several sources into one canonical log and enrich their intervals."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (defaults to $RUNBASE_CONFIG)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Database URL override
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum Command {
    /// Database management
    Db {
        #[command(subcommand)]
        action: DbCommand,
    },

    /// Store record bundles from a JSON file
    Ingest {
        /// JSON array of record bundles
        file: PathBuf,
    },

    /// Match, resolve, and enrich
    Reconcile {
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// VDOT history
    Vdot {
        #[command(subcommand)]
        action: VdotCommand,
    },

    /// Field conflicts
    Conflicts {
        #[command(subcommand)]
        action: ConflictCommand,
    },

    /// Sticky field overrides
    Override {
        #[command(subcommand)]
        action: OverrideCommand,
    },

    /// Link an orphaned record to an activity
    Link {
        /// Record id
        record_id: Uuid,

        /// Activity id
        activity_id: Uuid,
    },

    /// Rank the quickest efforts at a distance
    Fastest {
        /// Target distance in meters
        #[arg(long)]
        distance: f64,

        /// Number of efforts to show
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Print the ranking as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store overview
    Status,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum DbCommand {
    /// Create the schema
    Init,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum VdotCommand {
    /// Record a VDOT value
    Set {
        /// Effective date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// VDOT value
        #[arg(long)]
        vdot: f64,

        /// Notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Derive VDOT from a race result
    FromRace {
        /// Race date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Race distance in meters
        #[arg(long)]
        distance: f64,

        /// Finish time in seconds
        #[arg(long)]
        time: f64,

        /// Notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show the VDOT history
    Show,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum ConflictCommand {
    /// List conflicts
    List {
        /// Filter by status (pending, auto_resolved, resolved)
        #[arg(long)]
        status: Option<String>,
    },

    /// Settle a conflict
    Resolve {
        /// Conflict id
        conflict_id: Uuid,

        /// Take this origin's value (wearable_file, social_api, manual_log)
        #[arg(long, conflicts_with = "value")]
        origin: Option<String>,

        /// Enter a value by hand
        #[arg(long)]
        value: Option<String>,
    },
}

#[non_exhaustive]
#[derive(Subcommand)]
enum OverrideCommand {
    /// Pin a field value
    Set {
        /// Activity id
        activity_id: Uuid,

        /// Field name (distance, duration, avg_hr, workout_name, ...)
        field: String,

        /// Value
        value: String,
    },

    /// Remove an override
    Clear {
        /// Activity id
        activity_id: Uuid,

        /// Field name
        field: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_from_env(cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::from(u8::try_from(e.code.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = RunbaseConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    info!("Connecting to database: {}", config.database_url);
    let database = Database::new(&config.database_url).await?;

    match cli.command {
        Command::Db { action } => match action {
            DbCommand::Init => commands::db::init(&database).await?,
        },
        Command::Ingest { file } => commands::ingest::run(&database, &file).await?,
        Command::Reconcile { from, to, json } => {
            let report = commands::reconcile::run(database, config, from, to, json).await?;
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Vdot { action } => {
            let review = commands::review_service(database, config);
            match action {
                VdotCommand::Set { date, vdot, notes } => {
                    commands::vdot::set(&review, date, vdot, notes).await?;
                }
                VdotCommand::FromRace {
                    date,
                    distance,
                    time,
                    notes,
                } => commands::vdot::from_race(&review, date, distance, time, notes).await?,
                VdotCommand::Show => commands::vdot::show(&review).await?,
            }
        }
        Command::Conflicts { action } => {
            let review = commands::review_service(database, config);
            match action {
                ConflictCommand::List { status } => {
                    commands::conflicts::list(&review, status.as_deref()).await?;
                }
                ConflictCommand::Resolve {
                    conflict_id,
                    origin,
                    value,
                } => commands::conflicts::resolve(&review, conflict_id, origin, value).await?,
            }
        }
        Command::Override { action } => {
            let review = commands::review_service(database, config);
            match action {
                OverrideCommand::Set {
                    activity_id,
                    field,
                    value,
                } => commands::overrides::set(&review, activity_id, &field, &value).await?,
                OverrideCommand::Clear { activity_id, field } => {
                    commands::overrides::clear(&review, activity_id, &field).await?;
                }
            }
        }
        Command::Link {
            record_id,
            activity_id,
        } => {
            let review = commands::review_service(database, config);
            commands::overrides::link(&review, record_id, activity_id).await?;
        }
        Command::Fastest {
            distance,
            limit,
            from,
            to,
            json,
        } => {
            let review = commands::review_service(database, config);
            commands::fastest::run(&review, distance, limit, from, to, json).await?;
        }
        Command::Status => {
            let review = commands::review_service(database, config);
            commands::db::status(&review).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
