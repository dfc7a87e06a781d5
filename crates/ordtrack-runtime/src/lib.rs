//! ordtrack-runtime
//!
//! Wires the tracker, correlator and latency recorder around a protocol
//! engine ([`OrderSession`]) and runs the order-entry workflows on top of it
//! ([`WorkflowDriver`]).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ordtrack_config::ClientConfig;
use ordtrack_execution::{IdGenerator, ProtocolEngine, RejectPolicy};
use ordtrack_latency::LatencyRecorder;

mod session;
mod workflow;

pub use session::{Amend, OrderSession, SendError};
pub use workflow::{UnknownModeError, WorkflowDriver, WorkflowMode, WorkflowParams, WorkflowReport};

/// Build a session from a validated config.
///
/// The latency log is opened (and its header written) here when
/// `latency.csv_path` is set; otherwise samples stay in memory.
pub fn session_from_config<E: ProtocolEngine>(
    cfg: &ClientConfig,
    engine: E,
    ids: Arc<dyn IdGenerator>,
) -> Result<OrderSession<E>> {
    let policy = RejectPolicy::new(cfg.venue.liveness_clearing_reject_codes.iter().copied());
    let recorder = match &cfg.latency.csv_path {
        Some(path) => LatencyRecorder::open(path, cfg.latency.summary_every)
            .with_context(|| format!("open latency log {}", path.display()))?,
        None => LatencyRecorder::in_memory(),
    };
    Ok(OrderSession::new(engine, ids, policy)
        .with_ack_retention(Duration::from_millis(cfg.workflow.ack_retention_ms))
        .with_latency(Arc::new(recorder)))
}
