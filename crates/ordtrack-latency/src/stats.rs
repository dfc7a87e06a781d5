use std::fmt;

/// Rolling statistics over recorded latency samples, in milliseconds.
///
/// A summary over zero samples has `count == 0` and every other field `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatencySummary {
    pub count: usize,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "n=0 (no samples yet)");
        }
        write!(
            f,
            "n={}  mean={:.2}ms  p50={:.2}ms  p90={:.2}ms  p99={:.2}ms  max={:.2}ms",
            self.count, self.mean_ms, self.p50_ms, self.p90_ms, self.p99_ms, self.max_ms
        )
    }
}

/// Summarize an unordered slice of samples. Non-finite values are ignored.
pub fn summarize(samples: &[f64]) -> LatencySummary {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return LatencySummary::default();
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    LatencySummary {
        count: n,
        mean_ms: mean,
        p50_ms: nearest_rank(&sorted, 0.50),
        p90_ms: nearest_rank(&sorted, 0.90),
        p99_ms: nearest_rank(&sorted, 0.99),
        max_ms: sorted[n - 1],
    }
}

/// Value at index `floor(p * (n - 1))` of an ascending slice. No
/// interpolation. `sorted` must be non-empty.
pub(crate) fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let last = sorted.len() - 1;
    let idx = (p * last as f64).floor() as usize;
    sorted[idx.min(last)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_samples_use_floor_index() {
        let s = summarize(&[5.0, 1.0, 4.0, 2.0, 3.0]);
        assert_eq!(s.count, 5);
        assert_eq!(s.p50_ms, 3.0);
        // floor(0.9 * 4) = 3
        assert_eq!(s.p90_ms, 4.0);
        assert_eq!(s.p99_ms, 4.0);
        assert_eq!(s.max_ms, 5.0);
        assert!((s.mean_ms - 3.0).abs() < 1e-12);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let s = summarize(&[7.5]);
        assert_eq!((s.p50_ms, s.p90_ms, s.p99_ms, s.max_ms), (7.5, 7.5, 7.5, 7.5));
    }

    #[test]
    fn empty_summary_renders_placeholder() {
        let s = summarize(&[]);
        assert!(s.is_empty());
        assert_eq!(s.to_string(), "n=0 (no samples yet)");
    }

    #[test]
    fn non_finite_samples_are_dropped() {
        let s = summarize(&[f64::NAN, 2.0, f64::INFINITY]);
        assert_eq!(s.count, 1);
        assert_eq!(s.max_ms, 2.0);
    }

    #[test]
    fn display_has_two_decimals() {
        let s = summarize(&[1.0, 2.0]);
        assert_eq!(
            s.to_string(),
            "n=2  mean=1.50ms  p50=1.00ms  p90=1.00ms  p99=1.00ms  max=2.00ms"
        );
    }
}
