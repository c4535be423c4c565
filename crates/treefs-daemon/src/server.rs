// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Unix datagram server with a fixed worker pool.
//!
//! Each request is one datagram carrying a text command; each reply is one
//! datagram carrying a four-byte status, sent back to the sender's socket
//! path.

use std::io::ErrorKind;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use treefs_proto::{validate_command, Command, ErrorCode, Status};

use crate::config::ServerConfig;
use crate::dispatch::{dispatch, Namespace};
use crate::gate::PrintGate;

const COMPONENT: &str = "treefs-daemon";

/// Everything a worker needs to answer a request
pub struct RequestHandler {
    ns: Arc<dyn Namespace>,
    gate: PrintGate,
    max_path_len: usize,
}

impl RequestHandler {
    pub fn new(ns: Arc<dyn Namespace>, max_path_len: usize) -> Self {
        Self {
            ns,
            gate: PrintGate::new(),
            max_path_len,
        }
    }

    /// Parse, validate and run one request
    pub fn handle(&self, datagram: &[u8]) -> Status {
        let Ok(text) = std::str::from_utf8(datagram) else {
            warn!(component = COMPONENT, len = datagram.len(), "request is not UTF-8");
            return Status::error(ErrorCode::InvalidCommand);
        };
        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(err) => {
                warn!(
                    component = COMPONENT,
                    request = %text.trim_end_matches('\0'),
                    error = %err,
                    "rejecting request"
                );
                return Status::error(ErrorCode::InvalidCommand);
            }
        };
        self.execute(&command)
    }

    /// Validate and run an already parsed command
    pub fn execute(&self, command: &Command) -> Status {
        if let Err(err) = validate_command(command, self.max_path_len) {
            warn!(component = COMPONENT, command = %command, error = %err, "invalid command");
            return Status::error(err.code());
        }
        self.gate.run(command, || dispatch(self.ns.as_ref(), command))
    }
}

/// Bound but not yet serving
pub struct Server {
    socket: UnixDatagram,
    path: PathBuf,
    handler: Arc<RequestHandler>,
    config: ServerConfig,
}

impl Server {
    /// Bind `socket_path`, replacing a stale socket file left by an earlier run
    pub fn bind(
        socket_path: impl AsRef<Path>,
        ns: Arc<dyn Namespace>,
        config: ServerConfig,
    ) -> Result<Self> {
        let path = socket_path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing stale socket {}", path.display()))?;
        }
        let socket = UnixDatagram::bind(&path)
            .with_context(|| format!("binding datagram socket {}", path.display()))?;
        socket.set_read_timeout(Some(config.recv_timeout()))?;
        info!(component = COMPONENT, socket = %path.display(), "listening");
        Ok(Self {
            socket,
            path,
            handler: Arc::new(RequestHandler::new(ns, config.max_path_len)),
            config,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }

    /// Start `threads` workers on the bound socket
    pub fn spawn(self, threads: usize) -> Result<ServerHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let served = Arc::new(AtomicU64::new(0));
        let mut workers = Vec::with_capacity(threads);

        for worker_id in 0..threads.max(1) {
            let socket = self.socket.try_clone().context("cloning server socket")?;
            let handler = Arc::clone(&self.handler);
            let shutdown = Arc::clone(&shutdown);
            let served = Arc::clone(&served);
            let max_datagram = self.config.max_datagram;
            let worker = thread::Builder::new()
                .name(format!("treefs-worker-{}", worker_id))
                .spawn(move || {
                    worker_loop(worker_id, &socket, &handler, &shutdown, &served, max_datagram)
                })
                .context("spawning worker thread")?;
            workers.push(worker);
        }
        info!(component = COMPONENT, threads = workers.len(), "server started");

        Ok(ServerHandle {
            shutdown,
            served,
            workers,
            path: self.path,
        })
    }
}

fn worker_loop(
    worker_id: usize,
    socket: &UnixDatagram,
    handler: &RequestHandler,
    shutdown: &AtomicBool,
    served: &AtomicU64,
    max_datagram: usize,
) {
    let mut buf = vec![0u8; max_datagram];
    while !shutdown.load(Ordering::Acquire) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                error!(component = COMPONENT, worker_id, error = %err, "receive failed");
                continue;
            }
        };

        let status = if len >= max_datagram {
            warn!(component = COMPONENT, worker_id, len, "request too large");
            Status::error(ErrorCode::InvalidCommand)
        } else {
            handler.handle(&buf[..len])
        };
        served.fetch_add(1, Ordering::Relaxed);

        match peer.as_pathname() {
            Some(reply_to) => {
                if let Err(err) = socket.send_to(&status.to_bytes(), reply_to) {
                    warn!(
                        component = COMPONENT,
                        worker_id,
                        peer = %reply_to.display(),
                        error = %err,
                        "failed to send reply"
                    );
                }
            }
            None => debug!(component = COMPONENT, worker_id, "unnamed sender, reply dropped"),
        }
    }
    debug!(component = COMPONENT, worker_id, "worker stopped");
}

/// Running server; stops and removes its socket when shut down or dropped
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    served: Arc<AtomicU64>,
    workers: Vec<JoinHandle<()>>,
    path: PathBuf,
}

impl ServerHandle {
    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Requests answered so far
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Block until the workers exit
    pub fn join(mut self) {
        self.join_workers();
    }

    /// Stop the workers, wait for them and return the request count
    pub fn shutdown(mut self) -> u64 {
        self.stop();
        self.served()
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.join_workers();
    }

    fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!(component = COMPONENT, "worker thread panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(
                    component = COMPONENT,
                    socket = %self.path.display(),
                    error = %err,
                    "failed to remove socket"
                );
            }
        }
        info!(component = COMPONENT, served = self.served(), "server stopped");
    }
}
