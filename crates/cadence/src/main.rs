//! Cadence: recurring content posting queue and scheduler.
//!
//! Subcommands:
//! - `daemon`: run the processing loop until shutdown
//! - `process-once`: run a single processing pass and exit
//! - `health`: print queue health counters for an owner

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod clients;
mod daemon;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Recurring content posting queue and scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the processing daemon (dispatch, materialization, cleanup)
    Daemon {
        /// Path to the SQLite database
        #[arg(long, env = "CADENCE_DB", default_value = "cadence.db")]
        database: PathBuf,

        /// Directory holding the content library
        #[arg(long, env = "CADENCE_LIBRARY")]
        library: Option<PathBuf>,

        /// Destination accounts, as comma-separated `id=kind` pairs
        /// (kinds: bluesky, mastodon, instagram, twitter)
        #[arg(long, env = "CADENCE_ACCOUNTS", default_value = "")]
        accounts: String,

        /// Seconds between processing passes
        #[arg(long, default_value = "300")]
        interval: u64,

        /// Maximum due entries dispatched per pass
        #[arg(long, default_value = "10")]
        batch_size: u32,

        /// How many days ahead schedules are materialized
        #[arg(long, default_value = "3")]
        horizon_days: u32,
    },

    /// Run a single processing pass and exit
    ProcessOnce {
        /// Path to the SQLite database
        #[arg(long, env = "CADENCE_DB", default_value = "cadence.db")]
        database: PathBuf,

        /// Directory holding the content library
        #[arg(long, env = "CADENCE_LIBRARY")]
        library: Option<PathBuf>,

        /// Destination accounts, as comma-separated `id=kind` pairs
        #[arg(long, env = "CADENCE_ACCOUNTS", default_value = "")]
        accounts: String,

        /// Process only this entry, instead of a full pass
        #[arg(long)]
        entry: Option<Uuid>,
    },

    /// Print queue health counters for an owner
    Health {
        /// Path to the SQLite database
        #[arg(long, env = "CADENCE_DB", default_value = "cadence.db")]
        database: PathBuf,

        /// Owner whose queue to inspect
        #[arg(long)]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "cadence=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            database,
            library,
            accounts,
            interval,
            batch_size,
            horizon_days,
        } => {
            daemon::run(daemon::DaemonConfig {
                database,
                library,
                accounts,
                interval,
                batch_size,
                horizon_days,
            })
            .await
        }

        Commands::ProcessOnce {
            database,
            library,
            accounts,
            entry,
        } => daemon::process_once(&database, library, &accounts, entry).await,

        Commands::Health { database, owner } => daemon::print_health(&database, &owner),
    }
}
