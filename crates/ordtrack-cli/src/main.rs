use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ordtrack")]
#[command(about = "Order lifecycle tracker: paper workflows and latency reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Summarize a latency CSV and print a histogram
    LatencyReport {
        /// Latency log written by a workflow run
        #[arg(long, default_value = "data/latency.csv")]
        csv: PathBuf,

        /// Histogram bin width in milliseconds
        #[arg(long, default_value_t = 1.0)]
        bin_ms: f64,

        /// Upper edge of the last regular bin; grows to fit the data when
        /// the largest sample is far above it
        #[arg(long, default_value_t = 20.0)]
        max_ms: f64,

        /// Width of the longest bar in characters
        #[arg(long, default_value_t = 40)]
        width: usize,
    },

    /// Run a workflow against the in-process paper venue
    PaperRun {
        /// Layered config paths in merge order (defaults when omitted)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// simple-repeat | layer | replace | ratchet | cancel | ladder-multi
        #[arg(long)]
        mode: String,

        /// Override latency.csv_path
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let loaded = ordtrack_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::LatencyReport {
            csv,
            bin_ms,
            max_ms,
            width,
        } => commands::latency::run_report(&csv, bin_ms, max_ms, width)?,

        Commands::PaperRun {
            config_paths,
            mode,
            csv,
            json,
        } => commands::paper::run_paper(&config_paths, &mode, csv, json)?,
    }

    Ok(())
}

/// Logs go to stderr; stdout carries command output.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
