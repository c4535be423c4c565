// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Client for the TreeFS daemon.
//!
//! Each request is one text datagram sent from a client-owned socket file;
//! the daemon answers with a four-byte status sent back to that file. A
//! [`TfsClient`] owns its socket file and removes it when dropped.

use std::io::ErrorKind;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, warn};
use treefs_proto::{validate_status, Command, FileKind, Status};

/// Reply timeout used unless the builder overrides it
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_SOCKET: AtomicUsize = AtomicUsize::new(0);

/// Where the daemon listens and where the client binds its reply socket
#[derive(Clone, Debug)]
pub struct ClientConfig {
    server: PathBuf,
    socket_dir: PathBuf,
    read_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Start building configuration for a client of the daemon at `server`.
    pub fn builder(server: impl Into<PathBuf>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            server: server.into(),
            socket_dir: None,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }

    pub fn server(&self) -> &Path {
        &self.server
    }

    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    server: PathBuf,
    socket_dir: Option<PathBuf>,
    read_timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Directory for the client's own socket file (defaults to the system temp dir).
    pub fn socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = Some(dir.into());
        self
    }

    /// How long to wait for each reply. `None` waits forever.
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Finalise the configuration.
    pub fn build(self) -> Result<ClientConfig> {
        if self.server.as_os_str().is_empty() {
            bail!("server socket path missing");
        }
        if self.read_timeout == Some(Duration::ZERO) {
            bail!("read timeout must be non-zero");
        }
        Ok(ClientConfig {
            server: self.server,
            socket_dir: self.socket_dir.unwrap_or_else(std::env::temp_dir),
            read_timeout: self.read_timeout,
        })
    }
}

/// Datagram connection to the TreeFS daemon.
pub struct TfsClient {
    socket: UnixDatagram,
    local_path: PathBuf,
    server: PathBuf,
}

impl TfsClient {
    /// Bind `treefs-client-<pid>-<n>` under the configured socket dir and
    /// connect it to the server.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let local_path = config.socket_dir.join(format!(
            "treefs-client-{}-{}",
            std::process::id(),
            NEXT_SOCKET.fetch_add(1, Ordering::Relaxed)
        ));
        if local_path.exists() {
            std::fs::remove_file(&local_path)
                .with_context(|| format!("removing stale socket {}", local_path.display()))?;
        }

        let socket = UnixDatagram::bind(&local_path)
            .with_context(|| format!("failed to bind {}", local_path.display()))?;
        // From here on Drop owns the socket file.
        let client = Self {
            socket,
            local_path,
            server: config.server.clone(),
        };
        client
            .socket
            .set_read_timeout(config.read_timeout)
            .context("failed to set read timeout")?;
        client
            .socket
            .connect(&client.server)
            .with_context(|| format!("failed to connect to {}", client.server.display()))?;
        debug!(
            local = %client.local_path.display(),
            server = %client.server.display(),
            "client connected"
        );
        Ok(client)
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn server(&self) -> &Path {
        &self.server
    }

    /// Send one command and wait for its status.
    ///
    /// Transport failures and undecodable replies are errors; a negative
    /// status from the daemon is returned as-is. Replies left over from
    /// requests that timed out are discarded before sending.
    pub fn send(&self, command: &Command) -> Result<Status> {
        let request = command.encode();
        let stale = self.discard_stale_replies()?;
        if stale > 0 {
            warn!(request = %request, stale, "dropped late replies to earlier requests");
        }
        self.socket
            .send(request.as_bytes())
            .with_context(|| format!("failed to send '{}'", request))?;

        let mut reply = [0u8; 16];
        let len = self.socket.recv(&mut reply).map_err(|err| match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                anyhow!("no reply to '{}' from {}", request, self.server.display())
            }
            _ => anyhow::Error::new(err)
                .context(format!("failed to receive reply to '{}'", request)),
        })?;
        let status = Status::from_bytes(&reply[..len])
            .ok_or_else(|| anyhow!("short reply ({} bytes) to '{}'", len, request))?;
        let status = validate_status(status)?;
        debug!(request = %request, status = %status, "reply");
        Ok(status)
    }

    /// Drain replies that arrived after their request timed out
    fn discard_stale_replies(&self) -> Result<usize> {
        self.socket
            .set_nonblocking(true)
            .context("failed to switch socket to non-blocking")?;
        let mut scratch = [0u8; 16];
        let mut dropped = 0;
        let drained = loop {
            match self.socket.recv(&mut scratch) {
                Ok(_) => dropped += 1,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(dropped),
                Err(err) => break Err(err),
            }
        };
        self.socket
            .set_nonblocking(false)
            .context("failed to restore blocking socket")?;
        drained.context("failed to drain stale replies")
    }

    pub fn create(&self, path: &str, kind: FileKind) -> Result<Status> {
        self.send(&Command::create(path, kind))
    }

    pub fn delete(&self, path: &str) -> Result<Status> {
        self.send(&Command::delete(path))
    }

    /// Node index on success
    pub fn lookup(&self, path: &str) -> Result<Status> {
        self.send(&Command::lookup(path))
    }

    pub fn rename(&self, src: &str, dest: &str) -> Result<Status> {
        self.send(&Command::rename(src, dest))
    }

    /// Ask the daemon to print its tree into `output` (a path on the daemon's host)
    pub fn print(&self, output: impl Into<PathBuf>) -> Result<Status> {
        self.send(&Command::print(output))
    }
}

impl Drop for TfsClient {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.local_path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(
                    socket = %self.local_path.display(),
                    error = %err,
                    "failed to remove client socket"
                );
            }
        }
    }
}
