//! # Health Sync CLI (`hsync`)
//!
//! ## Usage
//!
//! ```bash
//! hsync --config ./config/hsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hsync metrics` | List supported metrics and their destinations |
//! | `hsync sync <metric>` | Scan the export and upload one metric |
//! | `hsync sync all` | Sync every metric in turn |
//! | `hsync sources` | List the account's remote data sources |
//!
//! Summaries go to stdout; logs and progress go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use health_sync::config::{self, Config};
use health_sync::credentials;
use health_sync::google_fit::GoogleFitClient;
use health_sync::ingest::{self, SyncOptions};
use health_sync::progress::ProgressMode;
use health_sync::sources;

/// Health Sync: move an Apple Health export into Google Fit.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hsync",
    about = "Stream an Apple Health export and upload it to Google Fit",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hsync.toml")]
    config: PathBuf,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported metrics.
    ///
    /// Shows each metric's source record type, aggregation, destination
    /// data type, and stream name.
    Metrics,

    /// Scan the export and upload a metric.
    ///
    /// Metric format: a name from `hsync metrics`, or `all`.
    Sync {
        /// Metric name (`weight`, `steps`, `sleep`, ...) or `all`.
        metric: String,

        /// Scan and aggregate only; print counts without uploading.
        #[arg(long)]
        dry_run: bool,

        /// Points per upload call (overrides config).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Progress on stderr: `off`, `human`, or `json`. Defaults to human on a TTY.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,

        /// Exit 0 even if some chunks or sessions failed to upload.
        #[arg(long)]
        allow_partial: bool,
    },

    /// List the account's remote data sources.
    Sources,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s)
        .ok_or_else(|| format!("invalid progress mode '{}': use off, human, or json", s))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Listing the catalog works without a config file.
    if let Commands::Metrics = cli.command {
        let cfg = config::load_config(&cli.config)
            .unwrap_or_else(|_| Config::for_export(PathBuf::new()));
        sources::list_metrics(&cfg);
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let api = GoogleFitClient::from_config(&cfg.upload)?;
    let creds = credentials::from_config(&cfg.auth);

    match cli.command {
        Commands::Metrics => {}
        Commands::Sync {
            metric,
            dry_run,
            chunk_size,
            progress,
            allow_partial,
        } => {
            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let options = SyncOptions {
                dry_run,
                chunk_size,
                allow_partial,
            };
            ingest::run_sync(&cfg, &metric, &options, &api, creds.as_ref(), reporter.as_ref())
                .await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg, &api, creds.as_ref()).await?;
        }
    }

    Ok(())
}
