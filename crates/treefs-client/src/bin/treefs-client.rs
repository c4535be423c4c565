// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Replays a command file against a running TreeFS daemon

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use treefs_client::{ClientConfig, TfsClient};
use treefs_logging::{CliLogLevel, CliLoggingArgs};
use treefs_proto::Command;

const COMPONENT: &str = "treefs-client";

#[derive(Parser)]
#[command(name = "treefs-client")]
#[command(about = "Send TreeFS commands from a file to a daemon")]
#[command(version, long_about = None)]
struct Cli {
    /// Command file, one command per line
    input: PathBuf,

    /// Daemon socket path
    server: PathBuf,

    /// Directory for this client's reply socket
    #[arg(long)]
    socket_dir: Option<PathBuf>,

    /// Seconds to wait for each reply
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!(component = COMPONENT, "{:#}", err);
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    cli.logging
        .init_with_default_level(COMPONENT, CliLogLevel::Warn)
        .context("initializing logging")?;

    let mut builder = ClientConfig::builder(&cli.server)
        .read_timeout(Some(Duration::from_secs(cli.timeout_secs.max(1))));
    if let Some(dir) = &cli.socket_dir {
        builder = builder.socket_dir(dir);
    }
    let client = TfsClient::connect(&builder.build()?)?;

    let file = File::open(&cli.input)
        .with_context(|| format!("opening input file {}", cli.input.display()))?;
    let started = Instant::now();
    let mut sent = 0usize;
    let mut failed = 0usize;

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", cli.input.display()))?;
        let Some(command) = Command::parse_line(&line)
            .with_context(|| format!("line {}: invalid command '{}'", index + 1, line.trim()))?
        else {
            continue;
        };
        let status = client.send(&command)?;
        sent += 1;
        if !status.is_ok() {
            failed += 1;
        }
        println!("{}: {}", command, status);
    }

    info!(
        component = COMPONENT,
        sent,
        failed,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "replay finished"
    );
    Ok(())
}
