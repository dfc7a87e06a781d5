//! ordtrack-latency
//!
//! Submission-to-first-acknowledgment latency:
//! - [`LatencyRecorder`] stamps sends, takes one sample per original order and
//!   appends it to a header-first CSV log
//! - [`summarize`] / [`LatencySummary`] give mean and nearest-rank percentiles
//! - [`read_latency_log`] and [`Histogram`] read a log back for reporting
//!
//! Log columns: `utc_ts,clordid,orderid,exectype,ordstatus,latency_ms,price,qty,symbol`.
//! Rows are in acknowledgment-arrival order.

mod recorder;
mod report;
mod stats;

pub use recorder::{AckSample, LatencyRecorder, DEFAULT_SUMMARY_EVERY, LOG_HEADER};
pub use report::{read_latency_log, Histogram};
pub use stats::{summarize, LatencySummary};
