// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence - outbound dispatch and sequence orchestration.
//!
//! This is the binary entry point: the long-running `serve` loop plus
//! one-shot operator commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod import;
mod serve;
mod shutdown;
mod status;

use std::path::{Path, PathBuf};

use cadence_config::model::parse_clock_time;
use cadence_config::CadenceConfig;
use cadence_core::{CadenceError, SafetyUpdate};
use chrono::{NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use crate::app::App;

/// Cadence - outbound dispatch and sequence orchestration.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatcher, sequence, and radar loops until interrupted.
    Serve,
    /// Run a single pass of one component.
    Pulse {
        #[arg(value_enum)]
        target: PulseTarget,
    },
    /// Enroll contacts into a sequence at its first step.
    Enroll {
        sequence_id: String,
        #[arg(required = true)]
        contact_ids: Vec<String>,
        /// Look up template variables for each contact before enrolling.
        #[arg(long)]
        deep_enrich: bool,
    },
    /// Change a tenant's send throttles.
    Safety {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        daily_limit: u32,
        /// Minimum seconds between two sends.
        #[arg(long)]
        min_delay: u64,
        /// Random extra delay added to the minimum, in seconds.
        #[arg(long)]
        jitter: u64,
        /// Business window start (HH:MM, tenant-local).
        #[arg(long, value_parser = parse_time, requires = "business_end")]
        business_start: Option<NaiveTime>,
        /// Business window end (HH:MM, tenant-local).
        #[arg(long, value_parser = parse_time, requires = "business_start")]
        business_end: Option<NaiveTime>,
        /// Tenant clock offset from UTC, in minutes (-840 to 840).
        #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i32).range(-840..=840))]
        utc_offset: Option<i32>,
    },
    /// Cancel a pending queue item.
    Cancel { item_id: i64 },
    /// Cancel every pending queue item of a tenant.
    Clear {
        #[arg(long)]
        tenant: String,
    },
    /// Create or update sequences and radar campaigns from a TOML file.
    Import { file: PathBuf },
    /// Show quota usage and queue state for a tenant.
    Status {
        #[arg(long)]
        tenant: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PulseTarget {
    Dispatcher,
    Sequences,
    Radar,
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    parse_clock_time(value).ok_or_else(|| format!("`{value}` is not a time of day (HH:MM)"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            cadence_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.engine.log_level);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&Path>,
) -> Result<CadenceConfig, Vec<cadence_config::ConfigError>> {
    match path {
        Some(path) => cadence_config::load_and_validate_path(path),
        None => cadence_config::load_and_validate(),
    }
}

async fn run(command: Commands, config: CadenceConfig) -> Result<(), CadenceError> {
    match command {
        Commands::Serve => serve::run_serve(config).await,
        command => {
            let app = App::open(config).await?;
            let result = run_once(&app, command).await;
            app.close().await?;
            result
        }
    }
}

/// Runs a one-shot operator command against an opened [`App`].
async fn run_once(app: &App, command: Commands) -> Result<(), CadenceError> {
    let now = Utc::now();
    match command {
        Commands::Serve => Err(CadenceError::Internal("serve is not a one-shot command".into())),
        Commands::Pulse { target } => {
            match target {
                PulseTarget::Dispatcher => {
                    let summary = app.dispatcher()?.tick(now).await;
                    println!("dispatcher: {summary}");
                }
                PulseTarget::Sequences => {
                    let summary = app.engine.run_due(now).await;
                    println!("sequences: {summary}");
                }
                PulseTarget::Radar => {
                    let summary = app.radar()?.pulse(now).await;
                    println!("radar: {summary}");
                }
            }
            Ok(())
        }
        Commands::Enroll {
            sequence_id,
            contact_ids,
            deep_enrich,
        } => {
            let created = app
                .engine
                .enroll_contacts(&sequence_id, &contact_ids, deep_enrich, now)
                .await?;
            println!("enrolled {created} of {} contact(s) in {sequence_id}", contact_ids.len());
            Ok(())
        }
        Commands::Safety {
            tenant,
            daily_limit,
            min_delay,
            jitter,
            business_start,
            business_end,
            utc_offset,
        } => {
            let update = SafetyUpdate {
                daily_limit,
                min_delay_seconds: min_delay,
                jitter_seconds: jitter,
                business_hours: business_start.zip(business_end),
                utc_offset_minutes: utc_offset,
            };
            let config = app.quota.update_safety_config(&tenant, &update, now).await?;
            println!(
                "{tenant}: daily_limit={} min_delay={}s jitter={}s window={}-{} offset={}m",
                config.daily_limit,
                config.min_delay_seconds,
                config.jitter_seconds,
                config.business_start.format("%H:%M"),
                config.business_end.format("%H:%M"),
                config.utc_offset_minutes,
            );
            Ok(())
        }
        Commands::Cancel { item_id } => {
            if app.queue.cancel(item_id, now).await? {
                println!("cancelled queue item {item_id}");
            } else {
                println!("queue item {item_id} is not pending; nothing cancelled");
            }
            Ok(())
        }
        Commands::Clear { tenant } => {
            let cleared = app.queue.clear_pending(&tenant, now).await?;
            println!("cancelled {cleared} pending item(s) for {tenant}");
            Ok(())
        }
        Commands::Import { file } => import::run_import(app, &file, now).await,
        Commands::Status { tenant, json } => status::run_status(app, &tenant, json, now).await,
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cadence={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
