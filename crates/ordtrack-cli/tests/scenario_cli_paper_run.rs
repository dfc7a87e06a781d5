//! Scenario: CLI Surface
//!
//! # Invariants under test
//!
//! 1. `config-hash` prints a 64-hex hash and refuses secret literals.
//! 2. `paper-run` drives a workflow end to end and writes the latency log.
//! 3. Unknown workflow modes and out-of-range waits are rejected before
//!    anything is sent.
//! 4. `latency-report` summarizes an existing log and tolerates a missing one.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn ordtrack() -> Command {
    let mut cmd = Command::cargo_bin("ordtrack").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn write_config(dir: &Path, csv: &Path) -> String {
    let path = dir.join("client.yaml");
    let yaml = format!(
        "workflow:\n  max_loop: 3\n  pacing_ms: 0\n  ack_timeout_ms: 2000\n\
         ratchet:\n  repeats: 2\n  pause_ms: 0\n\
         latency:\n  csv_path: {}\n",
        csv.display()
    );
    fs::write(&path, yaml).unwrap();
    path.to_string_lossy().to_string()
}

// ---------------------------------------------------------------------------
// 1. config-hash
// ---------------------------------------------------------------------------

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write_config(dir.path(), &dir.path().join("lat.csv"));

    ordtrack()
        .args(["config-hash", &cfg])
        .assert()
        .success()
        .stdout(predicate::str::is_match("config_hash=[0-9a-f]{64}\n").unwrap())
        .stdout(predicate::str::contains("\"max_loop\":3"));
}

#[test]
fn config_hash_refuses_secret_literals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "order:\n  account: \"sk_live_0123456789\"\n").unwrap();

    ordtrack()
        .args(["config-hash", &path.to_string_lossy()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"));
}

// ---------------------------------------------------------------------------
// 2. paper-run
// ---------------------------------------------------------------------------

#[test]
fn paper_run_ratchet_reports_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("lat.csv");
    let cfg = write_config(dir.path(), &csv);

    ordtrack()
        .args(["paper-run", "--config", &cfg, "--mode", "ratchet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mode=ratchet"))
        .stdout(predicate::str::contains("sent=1 acked=1 replaced=2"))
        .stdout(predicate::str::contains("latency n=1"));

    let log = fs::read_to_string(&csv).unwrap();
    assert_eq!(log.lines().count(), 2);
}

#[test]
fn paper_run_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("lat.csv");
    let cfg = write_config(dir.path(), &csv);

    ordtrack()
        .args(["paper-run", "--config", &cfg, "--mode", "cancel", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"canceled\":3"));
}

// ---------------------------------------------------------------------------
// 3. Unknown mode
// ---------------------------------------------------------------------------

#[test]
fn unknown_mode_is_rejected() {
    ordtrack()
        .args(["paper-run", "--mode", "bounce"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown workflow mode"));
}

#[test]
fn oversized_ack_timeout_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slow.yaml");
    fs::write(&path, "workflow:\n  ack_timeout_ms: 18446744073709551615\n").unwrap();

    ordtrack()
        .args(["paper-run", "--config", &path.to_string_lossy(), "--mode", "simple-repeat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_INVALID"))
        .stderr(predicate::str::contains("/workflow/ack_timeout_ms"));
}

// ---------------------------------------------------------------------------
// 4. latency-report
// ---------------------------------------------------------------------------

#[test]
fn latency_report_after_run() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("lat.csv");
    let cfg = write_config(dir.path(), &csv);

    ordtrack()
        .args(["paper-run", "--config", &cfg, "--mode", "simple-repeat"])
        .assert()
        .success();

    ordtrack()
        .args(["latency-report", "--csv", &csv.to_string_lossy(), "--bin-ms", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("n=3"))
        .stdout(predicate::str::contains(" | "));
}

#[test]
fn latency_report_on_missing_log() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("absent.csv");

    ordtrack()
        .args(["latency-report", "--csv", &csv.to_string_lossy()])
        .assert()
        .success()
        .stdout(predicate::str::contains("n=0 (no samples yet)"))
        .stdout(predicate::str::contains("No histogram to display"));
}
