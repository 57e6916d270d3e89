//! # lapline
//!
//! Command-line station for lapline race timing.
//!
//! ## Commands
//!
//! - `init`: Create a capture session (local, or paired through a token resolution)
//! - `sessions` / `use`: List sessions and switch the active one
//! - `scan`, `start`, `undo`, `clear`: Capture events into the active session
//! - `standings`: Show derived runner state
//! - `sync`: Push and pull once
//! - `watch`: Run the background sync loop until Ctrl-C
//! - `status`: Show session and sync status
//!
//! ## Example
//!
//! ```bash
//! # Pair with a remote session
//! lapline init --resolution heat1.json --credential "$TOKEN" --remote https://timing.example.org/api
//!
//! # Capture laps at the lap-counter station
//! lapline scan 42
//! lapline scan 17
//!
//! # Oops
//! lapline undo --last 17
//!
//! # Sync and show standings
//! lapline sync
//! lapline standings
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lapline_client::RunnerIdFormat;
use lapline_core::{Enforcement, TemplateKey};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{capture, init, sessions, standings, status, sync, watch};

/// Command-line station for lapline race timing.
#[derive(Parser, Debug)]
#[command(name = "lapline")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for configuration, database and the active session
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a capture session and make it active
    Init {
        /// Session name
        #[arg(long, short, required_unless_present = "resolution")]
        name: Option<String>,

        /// Course template
        #[arg(long, short, default_value = "lap-only", value_parser = parse_template)]
        template: TemplateKey,

        /// Laps required to complete the run
        #[arg(long, short, default_value_t = 1)]
        laps: u32,

        /// Accepted runner-id shape (any, numeric, alphanumeric)
        #[arg(long, default_value = "any", value_parser = parse_format)]
        format: RunnerIdFormat,

        /// Checkpoint enforcement (off, soft, strict)
        #[arg(long, value_parser = parse_enforcement)]
        enforcement: Option<Enforcement>,

        /// Uniform minimum gap between scans at a station, in milliseconds
        #[arg(long)]
        scan_gap_ms: Option<i64>,

        /// Token resolution JSON file from the remote
        #[arg(long, requires = "credential", conflicts_with_all = ["name", "enforcement", "scan_gap_ms"])]
        resolution: Option<PathBuf>,

        /// Pairing credential used as bearer token
        #[arg(long, requires = "resolution")]
        credential: Option<String>,

        /// Remote base URL to store in lapline.toml
        #[arg(long)]
        remote: Option<String>,
    },

    /// List sessions
    Sessions,

    /// Make another session active
    Use {
        /// Session id
        session_id: String,
    },

    /// Record a scan
    Scan {
        /// Runner id
        runner: String,

        /// Station (defaults to the lap-counter station)
        #[arg(long, short)]
        station: Option<String>,

        /// Capture time in milliseconds since the Unix epoch (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Record a manual start for one or more runners
    Start {
        /// Runner ids
        #[arg(required = true)]
        runners: Vec<String>,

        /// Capture time in milliseconds since the Unix epoch (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Retract an event
    Undo {
        /// Event id to retract
        #[arg(required_unless_present = "last", conflicts_with = "last")]
        event_id: Option<String>,

        /// Retract this runner's latest scan or start instead
        #[arg(long, value_name = "RUNNER")]
        last: Option<String>,

        /// Capture time in milliseconds since the Unix epoch (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Reset one runner, or every runner with --all
    Clear {
        /// Runner id
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        runner: Option<String>,

        /// Reset every runner
        #[arg(long)]
        all: bool,

        /// Station the reset is recorded at
        #[arg(long, short)]
        station: Option<String>,

        /// Capture time in milliseconds since the Unix epoch (defaults to now)
        #[arg(long)]
        at: Option<i64>,
    },

    /// Show derived runner standings
    Standings {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Push and pull once
    Sync,

    /// Sync in the background until Ctrl-C
    Watch,

    /// Show session and sync status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists; it holds pairing credentials
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    match cli.command {
        Commands::Init {
            name,
            template,
            laps,
            format,
            enforcement,
            scan_gap_ms,
            resolution,
            credential,
            remote,
        } => {
            if let Some(url) = remote.as_deref() {
                init::set_remote(&data_dir, url)?;
            }
            match (resolution, credential) {
                (Some(path), Some(credential)) => {
                    init::run_paired(&data_dir, &path, &credential, format).await?;
                }
                _ => {
                    let name = name.context("--name is required without --resolution")?;
                    let new = init::NewSession {
                        name,
                        template,
                        laps,
                        format,
                        enforcement,
                        scan_gap_ms,
                    };
                    init::run(&data_dir, new).await?;
                }
            }
        }
        Commands::Sessions => {
            sessions::list(&data_dir).await?;
        }
        Commands::Use { session_id } => {
            sessions::select(&data_dir, &session_id).await?;
        }
        Commands::Scan {
            runner,
            station,
            at,
        } => {
            capture::scan(&data_dir, &runner, station.as_deref(), at).await?;
        }
        Commands::Start { runners, at } => {
            capture::start(&data_dir, &runners, at).await?;
        }
        Commands::Undo {
            event_id,
            last,
            at,
        } => {
            let target = match (event_id, last) {
                (_, Some(runner)) => capture::UndoTarget::LastOf(runner),
                (Some(id), None) => capture::UndoTarget::Event(id),
                (None, None) => anyhow::bail!("Must specify an event id or --last <runner>"),
            };
            capture::undo(&data_dir, target, at).await?;
        }
        Commands::Clear {
            runner,
            all,
            station,
            at,
        } => {
            if all {
                capture::clear_all(&data_dir, station.as_deref(), at).await?;
            } else if let Some(runner) = runner {
                capture::clear(&data_dir, &runner, station.as_deref(), at).await?;
            } else {
                anyhow::bail!("Must specify a runner or --all");
            }
        }
        Commands::Standings { json } => {
            standings::run(&data_dir, json).await?;
        }
        Commands::Sync => {
            sync::run(&data_dir).await?;
        }
        Commands::Watch => {
            watch::run(&data_dir).await?;
        }
        Commands::Status => {
            status::run(&data_dir).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for lapline.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "lapline", "lapline")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

fn parse_template(s: &str) -> Result<TemplateKey, String> {
    TemplateKey::ALL
        .into_iter()
        .find(|key| key.as_str() == s)
        .ok_or_else(|| {
            let known: Vec<&str> = TemplateKey::ALL.iter().map(|k| k.as_str()).collect();
            format!("unknown template {s:?} (expected one of: {})", known.join(", "))
        })
}

fn parse_format(s: &str) -> Result<RunnerIdFormat, String> {
    RunnerIdFormat::parse(s)
        .ok_or_else(|| format!("unknown format {s:?} (expected any, numeric or alphanumeric)"))
}

fn parse_enforcement(s: &str) -> Result<Enforcement, String> {
    s.parse().map_err(|e: lapline_core::UnknownEnforcement| e.to_string())
}
