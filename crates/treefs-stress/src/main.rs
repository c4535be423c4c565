// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use treefs_core::{FileKind, FsConfig, FsCore, FsError};
use treefs_logging::{CliLogLevel, CliLoggingArgs};

const COMPONENT: &str = "treefs-stress";

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging
        .init_with_default_level(COMPONENT, CliLogLevel::Warn)
        .context("initializing logging")?;

    let (report, json_output, passed) = match cli.command {
        Command::Run(args) => {
            let json_output = args.json_output.clone();
            let report = run_workload(&args)?;
            let passed = report.status == STATUS_PASSED;
            (serde_json::to_value(&report)?, json_output, passed)
        }
        Command::Moves(args) => {
            let json_output = args.json_output.clone();
            let report = run_move_storm(&args)?;
            let passed = report.status == STATUS_PASSED;
            (serde_json::to_value(&report)?, json_output, passed)
        }
    };
    if let Some(path) = json_output {
        let file = File::create(&path)
            .with_context(|| format!("failed to create report {}", path.display()))?;
        serde_json::to_writer_pretty(file, &report)?;
    }
    write_json_to_stdout(&report)?;
    if !passed {
        bail!("stress run failed");
    }
    Ok(())
}

fn write_json_to_stdout<T: Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    out.flush()?;
    Ok(())
}

const STATUS_PASSED: &str = "passed";
const STATUS_FAILED: &str = "failed";

#[derive(Parser)]
#[command(author, version, about = "TreeFS in-process concurrency workload runner")]
struct Cli {
    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Weighted mix of every operation over a shared tree
    Run(RunArgs),
    /// Threads moving entries between sibling directories in opposite directions
    Moves(MovesArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Number of worker threads to spawn
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Duration of the workload in seconds
    #[arg(long, default_value_t = 10)]
    duration_sec: u64,

    /// Node table capacity
    #[arg(long, default_value_t = 512)]
    max_nodes: usize,

    /// Entry slots per directory
    #[arg(long, default_value_t = 32)]
    max_dir_entries: usize,

    /// Top-level directories the workers share
    #[arg(long, default_value_t = 4)]
    dirs: usize,

    /// Distinct names per level; smaller means more collisions
    #[arg(long, default_value_t = 12)]
    names: usize,

    /// Base RNG seed (defaults to the clock)
    #[arg(long)]
    seed: Option<u64>,

    /// Optional path for writing the JSON report
    #[arg(long)]
    json_output: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct MovesArgs {
    /// Number of worker threads; even and odd threads move in opposite directions
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Sibling directories entries move between
    #[arg(long, default_value_t = 2)]
    dirs: usize,

    /// Files spread across the sibling directories
    #[arg(long, default_value_t = 16)]
    entries: usize,

    /// Moves attempted by each thread
    #[arg(long, default_value_t = 2000)]
    rounds: usize,

    /// Retry budget per move (overrides moves.max-attempts)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Seconds before a stuck run is declared deadlocked
    #[arg(long, default_value_t = 60)]
    watchdog_sec: u64,

    /// Base RNG seed (defaults to the clock)
    #[arg(long)]
    seed: Option<u64>,

    /// Optional path for writing the JSON report
    #[arg(long)]
    json_output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Delete,
    Lookup,
    Move,
    List,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Delete => "delete",
            Operation::Lookup => "lookup",
            Operation::Move => "move",
            Operation::List => "list",
        }
    }
}

#[derive(Default, Serialize, Clone, Debug)]
struct OperationStats {
    create: u64,
    delete: u64,
    lookup: u64,
    #[serde(rename = "move")]
    moves: u64,
    list: u64,
}

impl OperationStats {
    fn increment(&mut self, op: Operation) {
        match op {
            Operation::Create => self.create += 1,
            Operation::Delete => self.delete += 1,
            Operation::Lookup => self.lookup += 1,
            Operation::Move => self.moves += 1,
            Operation::List => self.list += 1,
        }
    }

    fn total(&self) -> u64 {
        self.create + self.delete + self.lookup + self.moves + self.list
    }
}

impl std::ops::AddAssign<&OperationStats> for OperationStats {
    fn add_assign(&mut self, other: &OperationStats) {
        self.create += other.create;
        self.delete += other.delete;
        self.lookup += other.lookup;
        self.moves += other.moves;
        self.list += other.list;
    }
}

/// Tree state after the workers stopped
#[derive(Serialize, Clone, Debug)]
struct IntegritySummary {
    listed_nodes: usize,
    in_use: usize,
    duplicate_paths: usize,
    missing_roots: usize,
    consistent: bool,
}

#[derive(Serialize, Clone, Debug)]
struct RunReport {
    phase: String,
    threads: usize,
    duration_sec: u64,
    max_nodes: usize,
    dirs: usize,
    start_time: String,
    end_time: String,
    operations: OperationStats,
    total_ops: u64,
    benign_errors: BTreeMap<String, u64>,
    fatal_errors: BTreeMap<String, u64>,
    integrity: IntegritySummary,
    status: String,
}

#[derive(Serialize, Clone, Debug)]
struct MovesReport {
    phase: String,
    threads: usize,
    dirs: usize,
    entries: usize,
    rounds: usize,
    max_attempts: u32,
    start_time: String,
    end_time: String,
    elapsed_sec: f64,
    moved: u64,
    missed: u64,
    contention_exhausted: u64,
    entries_after: usize,
    fatal_errors: BTreeMap<String, u64>,
    status: String,
}

fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn seed_for(base: Option<u64>, worker_id: usize) -> u64 {
    let base = base.unwrap_or_else(|| {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        nanos ^ ((std::process::id() as u64) << 32)
    });
    base ^ (worker_id as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

fn merge_counts(target: &mut BTreeMap<String, u64>, source: &BTreeMap<String, u64>) {
    for (key, value) in source {
        *target.entry(key.clone()).or_insert(0) += value;
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn error_label(err: &FsError) -> &'static str {
    match err {
        FsError::NotFound => "not_found",
        FsError::NotADirectory => "not_a_directory",
        FsError::AlreadyExists => "already_exists",
        FsError::DirectoryNotEmpty => "directory_not_empty",
        FsError::TableFull => "table_full",
        FsError::SelfOrAncestorConflict => "self_or_ancestor",
        FsError::LockContention => "lock_contention",
        FsError::DirectoryFull => "directory_full",
        FsError::InvalidPath => "invalid_path",
        FsError::NameTooLong => "name_too_long",
        FsError::InvalidConfig(_) => "invalid_config",
        FsError::Io(_) => "io",
    }
}

enum OperationResult {
    Completed,
    Benign { label: String },
    Fatal { label: String, detail: String },
}

/// Errors a racing workload is expected to hit are benign; anything else
/// means the namespace misbehaved.
fn classify_error(op: Operation, err: FsError) -> OperationResult {
    let label = classify_label(op, &err);
    match err {
        FsError::NotFound
        | FsError::NotADirectory
        | FsError::AlreadyExists
        | FsError::DirectoryNotEmpty
        | FsError::TableFull
        | FsError::DirectoryFull
        | FsError::SelfOrAncestorConflict
        | FsError::LockContention => OperationResult::Benign { label },
        other => OperationResult::Fatal {
            label,
            detail: other.to_string(),
        },
    }
}

fn run_workload(args: &RunArgs) -> Result<RunReport> {
    if args.threads == 0 || args.dirs == 0 || args.names == 0 {
        bail!("--threads, --dirs and --names must be at least 1");
    }
    let core = Arc::new(
        FsCore::new(FsConfig::with_capacity(args.max_nodes, args.max_dir_entries))
            .context("failed to initialise namespace")?,
    );
    for dir in 0..args.dirs {
        core.create(&format!("/d{}", dir), FileKind::Directory)
            .with_context(|| format!("failed to create /d{}", dir))?;
    }

    info!(
        component = COMPONENT,
        threads = args.threads,
        duration_sec = args.duration_sec,
        dirs = args.dirs,
        "concurrency workload"
    );

    let start_time = chrono::Utc::now();
    let stop_at = Instant::now() + Duration::from_secs(args.duration_sec);

    let handles: Vec<_> = (0..args.threads)
        .map(|worker_id| {
            let worker = Worker {
                id: worker_id,
                core: Arc::clone(&core),
                run_until: stop_at,
                dirs: args.dirs,
                names: args.names,
                rng_seed: seed_for(args.seed, worker_id),
            };
            thread::spawn(move || worker.run())
        })
        .collect();

    let mut operations = OperationStats::default();
    let mut benign_errors = BTreeMap::new();
    let mut fatal_errors = BTreeMap::new();
    for handle in handles {
        match handle.join() {
            Ok(result) => {
                operations += &result.stats;
                merge_counts(&mut benign_errors, &result.benign_errors);
                merge_counts(&mut fatal_errors, &result.fatal_errors);
            }
            Err(panic) => {
                *fatal_errors.entry("thread_panic".to_string()).or_insert(0) += 1;
                warn!(component = COMPONENT, "worker thread panicked: {}", panic_message(&*panic));
            }
        }
    }
    let end_time = chrono::Utc::now();

    let integrity = verify_tree(&core, args.dirs)?;
    if !integrity.consistent {
        *fatal_errors.entry("integrity".to_string()).or_insert(0) += 1;
    }
    let status = if fatal_errors.is_empty() { STATUS_PASSED } else { STATUS_FAILED };

    Ok(RunReport {
        phase: "concurrency".to_string(),
        threads: args.threads,
        duration_sec: args.duration_sec,
        max_nodes: args.max_nodes,
        dirs: args.dirs,
        start_time: timestamp(start_time),
        end_time: timestamp(end_time),
        total_ops: operations.total(),
        operations,
        benign_errors,
        fatal_errors,
        integrity,
        status: status.to_string(),
    })
}

/// Every printed path is unique, the table holds exactly the printed nodes,
/// and the top-level directories are still there.
fn verify_tree(core: &FsCore, dirs: usize) -> Result<IntegritySummary> {
    let mut printed = Vec::new();
    core.print_tree(&mut printed).context("failed to print tree")?;
    let text = String::from_utf8(printed).context("tree listing is not UTF-8")?;

    let mut seen = HashSet::new();
    let mut duplicate_paths = 0;
    for line in text.lines() {
        if !seen.insert(line) {
            duplicate_paths += 1;
        }
    }
    let listed_nodes = text.lines().count().saturating_sub(1);
    let missing_roots = (0..dirs)
        .filter(|dir| !seen.contains(format!("/d{}", dir).as_str()))
        .count();
    let in_use = core.stats().in_use;

    Ok(IntegritySummary {
        listed_nodes,
        in_use,
        duplicate_paths,
        missing_roots,
        consistent: duplicate_paths == 0 && missing_roots == 0 && in_use == listed_nodes + 1,
    })
}

struct Worker {
    id: usize,
    core: Arc<FsCore>,
    run_until: Instant,
    dirs: usize,
    names: usize,
    rng_seed: u64,
}

struct WorkerResult {
    stats: OperationStats,
    benign_errors: BTreeMap<String, u64>,
    fatal_errors: BTreeMap<String, u64>,
}

impl Worker {
    fn run(self) -> WorkerResult {
        let mut rng = SmallRng::seed_from_u64(self.rng_seed);
        let mut stats = OperationStats::default();
        let mut benign_errors = BTreeMap::new();
        let mut fatal_errors = BTreeMap::new();

        while Instant::now() < self.run_until {
            let op = self.pick_operation(&mut rng);
            let result = match op {
                Operation::Create => {
                    let kind = if rng.gen_bool(0.4) { FileKind::Directory } else { FileKind::File };
                    self.core.create(&self.random_path(&mut rng), kind)
                }
                Operation::Delete => self.core.delete(&self.random_path(&mut rng)),
                Operation::Lookup => self.core.lookup(&self.random_path(&mut rng)).map(|_| ()),
                Operation::Move => {
                    let src = self.random_path(&mut rng);
                    let dest = self.random_path(&mut rng);
                    self.core.move_node(&src, &dest)
                }
                Operation::List => {
                    let dir = format!("/d{}", rng.gen_range(0..self.dirs));
                    self.core.list(&dir).map(|entries| {
                        entries.count();
                    })
                }
            };
            let outcome = match result {
                Ok(()) => OperationResult::Completed,
                Err(err) => classify_error(op, err),
            };

            match outcome {
                OperationResult::Completed => stats.increment(op),
                OperationResult::Benign { label } => {
                    *benign_errors.entry(label).or_insert(0) += 1;
                }
                OperationResult::Fatal { label, detail } => {
                    debug!(worker = self.id, "fatal {}: {}", label, detail);
                    *fatal_errors.entry(label).or_insert(0) += 1;
                }
            }
        }

        WorkerResult {
            stats,
            benign_errors,
            fatal_errors,
        }
    }

    fn pick_operation(&self, rng: &mut SmallRng) -> Operation {
        match rng.gen_range(0..100) {
            0..=29 => Operation::Create,
            30..=49 => Operation::Delete,
            50..=74 => Operation::Lookup,
            75..=94 => Operation::Move,
            _ => Operation::List,
        }
    }

    /// A path one or two levels below a shared top-level directory
    fn random_path(&self, rng: &mut SmallRng) -> String {
        let dir = rng.gen_range(0..self.dirs);
        let first = rng.gen_range(0..self.names);
        if rng.gen_bool(0.5) {
            format!("/d{}/n{}", dir, first)
        } else {
            format!("/d{}/n{}/n{}", dir, first, rng.gen_range(0..self.names))
        }
    }
}

fn run_move_storm(args: &MovesArgs) -> Result<MovesReport> {
    if args.threads == 0 || args.dirs < 2 || args.entries == 0 {
        bail!("--threads and --entries must be at least 1 and --dirs at least 2");
    }
    let mut config = FsConfig::with_capacity(1 + args.dirs + args.entries, args.entries.max(1));
    if let Some(max_attempts) = args.max_attempts {
        config.moves.max_attempts = max_attempts;
    }
    let max_attempts = config.moves.max_attempts;
    let core = Arc::new(FsCore::new(config).context("failed to initialise namespace")?);
    for dir in 0..args.dirs {
        core.create(&format!("/s{}", dir), FileKind::Directory)
            .with_context(|| format!("failed to create /s{}", dir))?;
    }
    for entry in 0..args.entries {
        core.create(&format!("/s{}/e{}", entry % args.dirs, entry), FileKind::File)
            .with_context(|| format!("failed to create entry {}", entry))?;
    }

    info!(
        component = COMPONENT,
        threads = args.threads,
        dirs = args.dirs,
        entries = args.entries,
        rounds = args.rounds,
        "move storm"
    );

    let start_time = chrono::Utc::now();
    let started = Instant::now();
    let (tx, rx) = mpsc::channel();
    for worker_id in 0..args.threads {
        let core = Arc::clone(&core);
        let tx = tx.clone();
        let args = args.clone();
        thread::Builder::new()
            .name(format!("mover-{}", worker_id))
            .spawn(move || {
                let _ = tx.send(storm_worker(&core, &args, worker_id));
            })
            .context("failed to spawn mover thread")?;
    }
    drop(tx);

    let mut tally = StormTally::default();
    let mut fatal_errors = BTreeMap::new();
    let deadline = started + Duration::from_secs(args.watchdog_sec);
    let mut finished = 0;
    while finished < args.threads {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(result) => {
                tally += &result;
                merge_counts(&mut fatal_errors, &result.fatal_errors);
                finished += 1;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // A mover dropped its sender without reporting
                let lost = (args.threads - finished) as u64;
                *fatal_errors.entry("thread_panic".to_string()).or_insert(0) += lost;
                warn!(component = COMPONENT, lost, "mover threads panicked");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                *fatal_errors.entry("watchdog_timeout".to_string()).or_insert(0) += 1;
                warn!(
                    component = COMPONENT,
                    watchdog_sec = args.watchdog_sec,
                    stuck = args.threads - finished,
                    "movers did not finish in time, possible deadlock"
                );
                break;
            }
        }
    }
    let elapsed = started.elapsed();
    let end_time = chrono::Utc::now();

    // Only count entries once every mover is done; a stuck run still holds locks.
    let entries_after = if fatal_errors.contains_key("watchdog_timeout") {
        0
    } else {
        let mut count = 0;
        for dir in 0..args.dirs {
            count += core.getattr(&format!("/s{}", dir))?.entries;
        }
        if count != args.entries {
            *fatal_errors.entry("entries_lost".to_string()).or_insert(0) += 1;
        }
        count
    };
    let status = if fatal_errors.is_empty() { STATUS_PASSED } else { STATUS_FAILED };

    Ok(MovesReport {
        phase: "moves".to_string(),
        threads: args.threads,
        dirs: args.dirs,
        entries: args.entries,
        rounds: args.rounds,
        max_attempts,
        start_time: timestamp(start_time),
        end_time: timestamp(end_time),
        elapsed_sec: elapsed.as_secs_f64(),
        moved: tally.moved,
        missed: tally.missed,
        contention_exhausted: tally.contention_exhausted,
        entries_after,
        fatal_errors,
        status: status.to_string(),
    })
}

#[derive(Default, Debug)]
struct StormTally {
    moved: u64,
    missed: u64,
    contention_exhausted: u64,
    fatal_errors: BTreeMap<String, u64>,
}

impl std::ops::AddAssign<&StormTally> for StormTally {
    fn add_assign(&mut self, other: &StormTally) {
        self.moved += other.moved;
        self.missed += other.missed;
        self.contention_exhausted += other.contention_exhausted;
    }
}

/// Even workers move entries from `/s<j>` to `/s<j+1>`, odd workers the
/// other way, so pairs of moves constantly lock the same two directories in
/// opposite argument order.
fn storm_worker(core: &FsCore, args: &MovesArgs, worker_id: usize) -> StormTally {
    let mut rng = SmallRng::seed_from_u64(seed_for(args.seed, worker_id));
    let mut tally = StormTally::default();
    for _ in 0..args.rounds {
        let entry = rng.gen_range(0..args.entries);
        let near = rng.gen_range(0..args.dirs);
        let far = (near + 1) % args.dirs;
        let (from, to) = if worker_id % 2 == 0 { (near, far) } else { (far, near) };
        let src = format!("/s{}/e{}", from, entry);
        let dest = format!("/s{}/e{}", to, entry);
        match core.move_node(&src, &dest) {
            Ok(()) => tally.moved += 1,
            Err(FsError::NotFound | FsError::AlreadyExists) => tally.missed += 1,
            Err(FsError::LockContention) => tally.contention_exhausted += 1,
            Err(err) => {
                let label = classify_label(Operation::Move, &err);
                debug!(
                    worker = worker_id,
                    src = %src,
                    dest = %dest,
                    error = %err,
                    "unexpected move failure"
                );
                *tally.fatal_errors.entry(label).or_insert(0) += 1;
            }
        }
    }
    tally
}

fn classify_label(op: Operation, err: &FsError) -> String {
    format!("{}_{}", op.label(), error_label(err))
}
