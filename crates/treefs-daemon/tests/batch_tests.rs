// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Batch mode over real command files

use std::collections::BTreeSet;
use std::sync::Arc;

use tempfile::TempDir;
use treefs_core::{FsConfig, FsCore};
use treefs_daemon::{run_batch, BatchOptions, BatchReport, Namespace};

fn options(threads: usize) -> BatchOptions {
    BatchOptions {
        threads,
        queue_capacity: 9,
        max_path_len: 100,
    }
}

type BatchRun = (Arc<FsCore>, anyhow::Result<BatchReport>, String);

fn run(dir: &TempDir, input: &str, threads: usize) -> BatchRun {
    run_with(dir, input, threads, FsConfig::default())
}

fn run_with(dir: &TempDir, input: &str, threads: usize, config: FsConfig) -> BatchRun {
    let input_path = dir.path().join("input.txt");
    let output_path = dir.path().join("output.txt");
    std::fs::write(&input_path, input).unwrap();

    let core = Arc::new(FsCore::new(config).unwrap());
    let ns: Arc<dyn Namespace> = core.clone();
    let report = run_batch(&input_path, &output_path, ns, &options(threads));
    let output = std::fs::read_to_string(&output_path).unwrap_or_default();
    (core, report, output)
}

#[test]
fn test_single_consumer_output() {
    let dir = TempDir::new().unwrap();
    let input = "\
# build a small tree
c /a d
c /a/b d
c /a/b/f f
c /e f
m /a/b/f /a/g
d /e
l /a/g
d /missing
";
    let (_core, report, output) = run(&dir, input, 1);
    let report = report.unwrap();
    assert_eq!(report.commands, 8);
    assert_eq!(report.failures, 1);
    assert_eq!(output, "/\n/a\n/a/b\n/a/g\n");
}

#[test]
fn test_many_consumers_independent_creates() {
    let dir = TempDir::new().unwrap();
    let input: String = (0..30).map(|i| format!("c /n{} f\n", i)).collect();
    let (core, report, output) = run_with(&dir, &input, 4, FsConfig::with_capacity(64, 32));
    let report = report.unwrap();
    assert_eq!(report.commands, 30);
    assert_eq!(report.failures, 0);

    let lines: BTreeSet<&str> = output.lines().collect();
    let mut expected: BTreeSet<String> = (0..30).map(|i| format!("/n{}", i)).collect();
    expected.insert("/".to_string());
    assert_eq!(lines, expected.iter().map(String::as_str).collect());
    assert_eq!(core.stats().in_use, 31);
}

#[test]
fn test_table_full_counts_as_failure() {
    let dir = TempDir::new().unwrap();
    // Default table holds 50 nodes including the root.
    let input: String = (0..20)
        .map(|d| format!("c /d{} d\nc /d{}/x f\nc /d{}/y f\n", d, d, d))
        .collect();
    let (core, report, _output) = run(&dir, &input, 1);
    let report = report.unwrap();
    assert_eq!(report.commands, 60);
    assert_eq!(core.stats().in_use, 50);
    assert_eq!(report.failures, 60 - 49);
}

#[test]
fn test_full_directory_counts_as_failure() {
    let dir = TempDir::new().unwrap();
    // Default directories hold 20 entries.
    let input: String = (0..30).map(|i| format!("c /n{} f\n", i)).collect();
    let (core, report, output) = run(&dir, &input, 4);
    let report = report.unwrap();
    assert_eq!(report.commands, 30);
    assert_eq!(report.failures, 10);
    assert_eq!(core.getattr("/").unwrap().entries, 20);
    assert_eq!(core.stats().in_use, 21);
    assert_eq!(output.lines().count(), 21);
}

#[test]
fn test_bad_line_stops_run() {
    let dir = TempDir::new().unwrap();
    let (core, report, _output) = run(&dir, "c /a d\nbogus\nc /b d\n", 2);
    let err = report.unwrap_err();
    assert!(format!("{:#}", err).contains("line 2"));
    // The command queued before the bad line still ran.
    assert!(core.lookup("/a").is_ok());
    assert!(core.lookup("/b").is_err());
}

#[test]
fn test_missing_input_file() {
    let dir = TempDir::new().unwrap();
    let core = Arc::new(FsCore::new(FsConfig::default()).unwrap());
    let err = run_batch(
        &dir.path().join("absent.txt"),
        &dir.path().join("out.txt"),
        core,
        &options(1),
    )
    .unwrap_err();
    assert!(err.to_string().contains("opening input file"));
}
