// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! TreeFS Daemon executable

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use treefs_core::FsCore;
use treefs_daemon::{run_batch, BatchOptions, DaemonConfig, Namespace, Server};
use treefs_logging::CliLoggingArgs;

const COMPONENT: &str = "treefs-daemon";

#[derive(Parser)]
#[command(name = "treefs-daemon")]
#[command(about = "TreeFS - concurrent in-memory namespace server")]
#[command(version, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Worker threads (overrides server.threads)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve requests on a Unix datagram socket until killed
    Serve {
        /// Socket path to bind
        socket: PathBuf,
    },
    /// Run a command file and write the final tree to an output file
    Batch {
        /// Command file, one command per line
        input: PathBuf,
        /// Where the final tree is printed
        output: PathBuf,
    },
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
    let config = DaemonConfig::load_or_default(cli.config.as_deref())?;
    cli.logging
        .with_config_defaults(&config.logging)
        .init(COMPONENT)
        .context("initializing logging")?;

    let threads = cli.threads.unwrap_or(config.server.threads);
    anyhow::ensure!(threads > 0, "--threads must be at least 1");

    let core = Arc::new(FsCore::new(config.fs.clone()).context("initializing namespace")?);
    let ns: Arc<dyn Namespace> = core.clone();

    match cli.command {
        Mode::Serve { socket } => {
            let server = Server::bind(&socket, Arc::clone(&ns), config.server.clone())?;
            let handle = server.spawn(threads)?;
            info!(component = COMPONENT, socket = %socket.display(), threads, "serving");
            handle.join();
        }
        Mode::Batch { input, output } => {
            let options = BatchOptions {
                threads,
                queue_capacity: config.server.queue_capacity,
                max_path_len: config.server.max_path_len,
            };
            let report = run_batch(&input, &output, ns, &options)?;
            println!("{}", report);
        }
    }

    if let Ok(core) = Arc::try_unwrap(core) {
        let stats = core.shutdown();
        info!(component = COMPONENT, in_use = stats.in_use, capacity = stats.capacity, "exiting");
    }
    Ok(())
}
