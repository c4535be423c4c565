// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Daemon configuration file

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use treefs_core::FsConfig;
use treefs_logging::LoggingConfig;
use treefs_proto::DEFAULT_MAX_PATH_LEN;

/// `[server]` table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Worker threads serving requests
    pub threads: usize,
    /// Receive buffer size; longer datagrams are truncated and rejected
    pub max_datagram: usize,
    /// How often idle workers wake up to check for shutdown
    pub recv_timeout_ms: u64,
    /// Longest path operand accepted in a command
    pub max_path_len: usize,
    /// Capacity of the batch runner's command queue
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            max_datagram: 1024,
            recv_timeout_ms: 100,
            max_path_len: DEFAULT_MAX_PATH_LEN,
            queue_capacity: 9,
        }
    }
}

impl ServerConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms.max(1))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DaemonConfig {
    pub fs: FsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.fs.validate().context("invalid [fs] section")?;
        anyhow::ensure!(self.server.threads > 0, "server.threads must be at least 1");
        anyhow::ensure!(
            self.server.max_datagram >= 8,
            "server.max-datagram must be at least 8 bytes"
        );
        anyhow::ensure!(
            self.server.queue_capacity > 0,
            "server.queue-capacity must be at least 1"
        );
        Ok(())
    }
}
