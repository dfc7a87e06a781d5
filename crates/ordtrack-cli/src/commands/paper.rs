use std::path::PathBuf;
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use ordtrack_execution::{InboundHandler, UuidIdGenerator};
use ordtrack_runtime::{session_from_config, WorkflowDriver, WorkflowMode, WorkflowParams};
use ordtrack_venue_paper::{PaperBehavior, PaperVenue};
use tracing::info;

use super::load_client_config;

pub fn run_paper(
    config_paths: &[String],
    mode: &str,
    csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mode: WorkflowMode = mode.parse()?;
    let (loaded, mut cfg) = load_client_config(config_paths)?;
    if csv.is_some() {
        cfg.latency.csv_path = csv;
    }
    let params = WorkflowParams::from_config(&cfg)?;
    info!(config_hash = %loaded.config_hash, mode = %mode, "paper run");

    let venue = Arc::new(PaperVenue::spawn(PaperBehavior::default())?);
    let session = Arc::new(session_from_config(&cfg, venue.clone(), Arc::new(UuidIdGenerator))?);
    venue.attach(Arc::downgrade(&session) as Weak<dyn InboundHandler>);

    let report = WorkflowDriver::new(session.clone(), params)
        .run(mode)
        .with_context(|| format!("workflow {mode} failed"))?;
    venue.shutdown();

    if json {
        println!("{}", serde_json::to_string(&report).context("serialize report")?);
        return Ok(());
    }
    println!("config_hash={}", loaded.config_hash);
    println!("mode={mode}");
    println!("{report}");
    if let Some(lat) = session.latency() {
        println!("latency {}", lat.summary());
        if let Some(path) = lat.path() {
            println!("latency_csv={}", path.display());
        }
    }
    Ok(())
}
