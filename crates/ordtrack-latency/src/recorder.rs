use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use ordtrack_execution::{micros_to_price, AckKind, ClOrdId, ExecutionReport, OrdStatus};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::stats::{summarize, LatencySummary};

/// Column order of the durable latency log.
pub const LOG_HEADER: [&str; 9] = [
    "utc_ts",
    "clordid",
    "orderid",
    "exectype",
    "ordstatus",
    "latency_ms",
    "price",
    "qty",
    "symbol",
];

/// Emit a `[STATS]` line every this many samples unless configured otherwise.
pub const DEFAULT_SUMMARY_EVERY: usize = 50;

/// Fields of one acknowledgment that end up in a latency row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckSample {
    pub cl_ord_id: ClOrdId,
    pub venue_order_id: Option<String>,
    pub kind: AckKind,
    pub ord_status: Option<OrdStatus>,
    pub price: Option<i64>,
    pub quantity: Option<i64>,
    pub symbol: Option<String>,
}

impl AckSample {
    pub fn new(cl_ord_id: impl Into<ClOrdId>, kind: AckKind) -> Self {
        Self {
            cl_ord_id: cl_ord_id.into(),
            venue_order_id: None,
            kind,
            ord_status: None,
            price: None,
            quantity: None,
            symbol: None,
        }
    }
}

impl From<&ExecutionReport> for AckSample {
    fn from(r: &ExecutionReport) -> Self {
        Self {
            cl_ord_id: r.cl_ord_id.clone(),
            venue_order_id: r.venue_order_id.clone(),
            kind: r.kind,
            ord_status: r.ord_status,
            price: r.price,
            quantity: r.quantity,
            symbol: r.symbol.clone(),
        }
    }
}

#[derive(Serialize)]
struct LogRow<'a> {
    utc_ts: String,
    clordid: &'a str,
    orderid: &'a str,
    exectype: String,
    ordstatus: String,
    latency_ms: String,
    price: Option<f64>,
    qty: Option<i64>,
    symbol: &'a str,
}

struct LatencyLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl LatencyLog {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open latency log {:?}", path))?;
        let fresh = file
            .metadata()
            .with_context(|| format!("stat latency log {:?}", path))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer
                .write_record(LOG_HEADER)
                .with_context(|| format!("write latency log header {:?}", path))?;
            writer.flush().context("flush latency log failed")?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    fn append(&mut self, sample: &AckSample, latency_ms: f64) -> Result<()> {
        let row = LogRow {
            utc_ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            clordid: sample.cl_ord_id.as_str(),
            orderid: sample.venue_order_id.as_deref().unwrap_or(""),
            exectype: sample.kind.to_string(),
            ordstatus: sample
                .ord_status
                .map(|s| s.code().to_string())
                .unwrap_or_default(),
            latency_ms: format!("{latency_ms:.3}"),
            price: sample.price.map(micros_to_price),
            qty: sample.quantity,
            symbol: sample.symbol.as_deref().unwrap_or(""),
        };
        self.writer
            .serialize(&row)
            .context("serialize latency row failed")?;
        self.writer.flush().context("flush latency log failed")?;
        Ok(())
    }
}

struct Inner {
    sent: HashMap<ClOrdId, Instant>,
    done: HashSet<ClOrdId>,
    samples: Vec<f64>,
    reported: usize,
    log: Option<LatencyLog>,
}

/// Submission-to-first-acknowledgment latency, per original order.
///
/// One mutex covers the send-time map, the recorded set, the sample array
/// and the log writer, so rows are never interleaved or duplicated when acks
/// for the same order race on several threads.
pub struct LatencyRecorder {
    inner: Mutex<Inner>,
    summary_every: usize,
}

impl LatencyRecorder {
    /// Open (or create) the durable log at `path`. The header is written only
    /// when the file is empty. `summary_every == 0` disables `[STATS]` lines.
    pub fn open(path: impl AsRef<Path>, summary_every: usize) -> Result<Self> {
        let log = LatencyLog::open(path.as_ref())?;
        info!(path = ?log.path, "latency log opened");
        Ok(Self::with_log(Some(log), summary_every))
    }

    /// Recorder without a durable log.
    pub fn in_memory() -> Self {
        Self::with_log(None, DEFAULT_SUMMARY_EVERY)
    }

    fn with_log(log: Option<LatencyLog>, summary_every: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sent: HashMap::new(),
                done: HashSet::new(),
                samples: Vec::new(),
                reported: 0,
                log,
            }),
            summary_every,
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().log.as_ref().map(|l| l.path.clone())
    }

    /// Stamp the send time of a brand-new order. Replace and cancel
    /// identifiers are not stamped.
    pub fn note_send(&self, first_id: &ClOrdId) {
        self.inner.lock().sent.insert(first_id.clone(), Instant::now());
    }

    /// Record the first acknowledgment for an order sent through
    /// [`note_send`](Self::note_send). Returns the elapsed milliseconds when a
    /// sample was taken, `None` when the identifier was never stamped or
    /// already has a sample.
    pub fn note_ack(&self, sample: AckSample) -> Option<f64> {
        let mut inner = self.inner.lock();
        if inner.done.contains(&sample.cl_ord_id) {
            return None;
        }
        let sent_at = inner.sent.remove(&sample.cl_ord_id)?;
        let latency_ms = sent_at.elapsed().as_secs_f64() * 1_000.0;

        inner.samples.push(latency_ms);
        inner.done.insert(sample.cl_ord_id.clone());

        if let Some(log) = inner.log.as_mut() {
            if let Err(e) = log.append(&sample, latency_ms) {
                error!(path = ?log.path, cl_ord_id = %sample.cl_ord_id, error = %e, "latency row not written");
            }
        }
        debug!(cl_ord_id = %sample.cl_ord_id, kind = %sample.kind, latency_ms, "latency sample");

        let n = inner.samples.len();
        if self.summary_every > 0 && n / self.summary_every > inner.reported / self.summary_every {
            inner.reported = n;
            info!("[STATS] {}", summarize(&inner.samples));
        }
        Some(latency_ms)
    }

    pub fn is_recorded(&self, id: &ClOrdId) -> bool {
        self.inner.lock().done.contains(id)
    }

    pub fn sample_count(&self) -> usize {
        self.inner.lock().samples.len()
    }

    pub fn summary(&self) -> LatencySummary {
        let samples = self.inner.lock().samples.clone();
        summarize(&samples)
    }
}
