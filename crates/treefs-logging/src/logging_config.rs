// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging section of a configuration file

use serde::{Deserialize, Serialize};

use crate::{CliLogLevel, CliLoggingArgs, LogFormat};

/// `[logging]` table; command-line flags take precedence over it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub log_level: Option<CliLogLevel>,
    pub log_format: Option<LogFormat>,
    pub log_dir: Option<String>,
    pub log_file: Option<String>,
}

impl CliLoggingArgs {
    /// Fill every option not given on the command line from `config`
    pub fn with_config_defaults(mut self, config: &LoggingConfig) -> Self {
        self.log_level = self.log_level.or(config.log_level);
        self.log_format = self.log_format.or(config.log_format);
        if self.log_dir.is_none() {
            self.log_dir = config.log_dir.clone();
        }
        if self.log_file.is_none() {
            self.log_file = config.log_file.clone();
        }
        self
    }
}
