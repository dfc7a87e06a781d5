//! Offline view of a latency log: load the `latency_ms` column, summarize it
//! and draw an ASCII histogram.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct LatencyColumn {
    latency_ms: Option<String>,
}

/// Read every parsable `latency_ms` value from a latency log. A missing file
/// yields an empty vector; rows that do not parse are skipped.
pub fn read_latency_log(path: impl AsRef<Path>) -> Result<Vec<f64>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open latency log {:?}", path))?;

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<LatencyColumn>() {
        match row
            .ok()
            .and_then(|r| r.latency_ms)
            .and_then(|v| v.trim().parse::<f64>().ok())
        {
            Some(v) => out.push(v),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(path = ?path, skipped, "unparsable latency rows skipped");
    }
    Ok(out)
}

/// Fixed-width histogram over `[0, max_ms)` with an overflow bucket for
/// `>= max_ms`. Bins are half-open `[lo, hi)`. Negative samples are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bin_ms: f64,
    max_ms: f64,
    counts: Vec<u64>,
    overflow: u64,
}

impl Histogram {
    /// When the largest sample exceeds `1.5 * max_ms`, the range is widened
    /// to the next multiple of `bin_ms` at or above that sample.
    pub fn build(samples: &[f64], bin_ms: f64, max_ms: f64) -> Result<Self> {
        ensure!(bin_ms.is_finite() && bin_ms > 0.0, "bin width must be positive, got {bin_ms}");
        ensure!(max_ms.is_finite() && max_ms > 0.0, "histogram range must be positive, got {max_ms}");

        let mut max_ms = max_ms;
        let data_max = samples
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        if data_max > max_ms * 1.5 {
            max_ms = (data_max / bin_ms).ceil() * bin_ms;
        }

        let n_bins = ((max_ms / bin_ms).ceil() as usize).max(1);
        let mut counts = vec![0u64; n_bins];
        let mut overflow = 0u64;
        for &x in samples {
            if !x.is_finite() || x < 0.0 {
                continue;
            }
            if x >= max_ms {
                overflow += 1;
            } else {
                let idx = ((x / bin_ms).floor() as usize).min(n_bins - 1);
                counts[idx] += 1;
            }
        }
        Ok(Self {
            bin_ms,
            max_ms,
            counts,
            overflow,
        })
    }

    pub fn max_ms(&self) -> f64 {
        self.max_ms
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum::<u64>() + self.overflow
    }

    /// `(lo, hi)` bounds of each bin.
    pub fn edges(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let w = self.bin_ms;
        (0..self.counts.len()).map(move |i| (i as f64 * w, (i + 1) as f64 * w))
    }

    /// Render one line per bin, bars scaled so the tallest bin is `width`
    /// characters wide.
    pub fn render(&self, width: usize) -> String {
        if self.total() == 0 {
            return "No histogram to display (no samples).".to_string();
        }
        let peak = self.counts.iter().copied().max().unwrap_or(0);
        let scale = if peak > 0 {
            width as f64 / peak as f64
        } else {
            1.0
        };
        let bar = |c: u64| "#".repeat((c as f64 * scale).round() as usize);

        let mut out = String::new();
        for ((lo, hi), &c) in self.edges().zip(&self.counts) {
            let label = format!("{lo:.2}-{hi:.2} ms");
            let _ = writeln!(out, "{label:>16} | {} {c}", bar(c));
        }
        if self.overflow > 0 {
            let top = self.counts.len() as f64 * self.bin_ms;
            let _ = writeln!(out, "{top:>6.2}ms+      | {} {}", bar(self.overflow), self.overflow);
        }
        out.truncate(out.trim_end().len());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_are_half_open() {
        let h = Histogram::build(&[0.0, 0.99, 1.0, 1.5, 2.0], 1.0, 3.0).unwrap();
        assert_eq!(h.counts(), &[2, 2, 1]);
        assert_eq!(h.overflow(), 0);
    }

    #[test]
    fn values_at_max_overflow() {
        let h = Histogram::build(&[1.0, 4.0, 4.5], 1.0, 4.0).unwrap();
        assert_eq!(h.counts().len(), 4);
        assert_eq!(h.overflow(), 2);
        assert_eq!(h.total(), 3);
    }

    #[test]
    fn range_expands_for_far_outliers() {
        // 31.2 > 1.5 * 20 so the range grows to 32.
        let h = Histogram::build(&[1.0, 31.2], 1.0, 20.0).unwrap();
        assert_eq!(h.max_ms(), 32.0);
        assert_eq!(h.counts().len(), 32);
        assert_eq!(h.overflow(), 0);
        assert_eq!(h.counts()[31], 1);
    }

    #[test]
    fn negatives_are_dropped() {
        let h = Histogram::build(&[-1.0, 0.5], 1.0, 2.0).unwrap();
        assert_eq!(h.total(), 1);
    }

    #[test]
    fn zero_bin_width_is_rejected() {
        assert!(Histogram::build(&[1.0], 0.0, 10.0).is_err());
    }

    #[test]
    fn render_scales_to_peak() {
        let h = Histogram::build(&[0.5, 0.5, 1.5], 1.0, 2.0).unwrap();
        let text = h.render(10);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| ########## 2"), "{}", lines[0]);
        assert!(lines[1].ends_with("| ##### 1"), "{}", lines[1]);
        assert!(lines[0].contains("0.00-1.00 ms"));
    }

    #[test]
    fn render_empty() {
        let h = Histogram::build(&[], 1.0, 2.0).unwrap();
        assert_eq!(h.render(40), "No histogram to display (no samples).");
    }
}
