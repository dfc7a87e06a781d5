use std::path::Path;

use anyhow::Result;
use ordtrack_latency::{read_latency_log, summarize, Histogram};

pub fn run_report(csv: &Path, bin_ms: f64, max_ms: f64, width: usize) -> Result<()> {
    let samples = read_latency_log(csv)?;
    println!("file={}", csv.display());
    println!("{}", summarize(&samples));

    let hist = Histogram::build(&samples, bin_ms, max_ms)?;
    if hist.max_ms() > max_ms {
        println!("max_ms expanded to {:.2}", hist.max_ms());
    }
    println!("{}", hist.render(width));
    Ok(())
}
