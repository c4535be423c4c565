// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Batch runner: replay a command file through a worker pool

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use treefs_proto::Command;

use crate::dispatch::Namespace;
use crate::queue::CommandQueue;
use crate::server::RequestHandler;

const COMPONENT: &str = "treefs-daemon";

/// Outcome of a batch run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchReport {
    pub commands: usize,
    pub failures: usize,
    pub elapsed: Duration,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeFS completed in {:.4} seconds.", self.elapsed.as_secs_f64())
    }
}

#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub threads: usize,
    pub queue_capacity: usize,
    pub max_path_len: usize,
}

/// Execute every command in `input` with `options.threads` consumers, then
/// write the final tree to `output`.
///
/// A line that does not parse stops the run with an error naming the line;
/// commands already queued still complete first.
pub fn run_batch(
    input: &Path,
    output: &Path,
    ns: Arc<dyn Namespace>,
    options: &BatchOptions,
) -> Result<BatchReport> {
    let file =
        File::open(input).with_context(|| format!("opening input file {}", input.display()))?;
    let reader = BufReader::new(file);

    let started = Instant::now();
    let queue = Arc::new(CommandQueue::<Command>::new(options.queue_capacity));
    let handler = Arc::new(RequestHandler::new(Arc::clone(&ns), options.max_path_len));
    let failures = Arc::new(AtomicUsize::new(0));

    let consumers: Vec<_> = (0..options.threads.max(1))
        .map(|consumer_id| {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let failures = Arc::clone(&failures);
            thread::spawn(move || {
                while let Some(command) = queue.pop() {
                    let status = handler.execute(&command);
                    if !status.is_ok() {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!(consumer_id, command = %command, status = %status, "executed");
                }
            })
        })
        .collect();

    let produced = produce(reader, &queue);
    queue.close();
    for consumer in consumers {
        consumer.join().map_err(|_| anyhow!("batch consumer panicked"))?;
    }
    let commands = produced.with_context(|| format!("reading {}", input.display()))?;
    let elapsed = started.elapsed();

    let lines = ns
        .print(output)
        .with_context(|| format!("writing tree to {}", output.display()))?;
    let report = BatchReport {
        commands,
        failures: failures.load(Ordering::Relaxed),
        elapsed,
    };
    info!(
        component = COMPONENT,
        commands = report.commands,
        failures = report.failures,
        tree_lines = lines,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "batch finished"
    );
    Ok(report)
}

fn produce(reader: impl BufRead, queue: &CommandQueue<Command>) -> Result<usize> {
    let mut count = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let Some(command) = Command::parse_line(&line)
            .with_context(|| format!("line {}: invalid command '{}'", index + 1, line.trim()))?
        else {
            continue;
        };
        queue.push(command)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_produce_skips_comments() {
        let queue = CommandQueue::new(8);
        let input = Cursor::new("# setup\nc /a d\n\nl /a\n");
        assert_eq!(produce(input, &queue).unwrap(), 2);
        assert_eq!(queue.pop(), Some(Command::create("/a", treefs_core::FileKind::Directory)));
        assert_eq!(queue.pop(), Some(Command::lookup("/a")));
    }

    #[test]
    fn test_produce_names_bad_line() {
        let queue = CommandQueue::new(8);
        let input = Cursor::new("c /a d\nq /a\n");
        let err = produce(input, &queue).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_report_message() {
        let report = BatchReport {
            commands: 3,
            failures: 0,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(report.to_string(), "TreeFS completed in 1.5000 seconds.");
    }
}
