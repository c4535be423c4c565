// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Namespace configuration

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Capacity limits of the node table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FsLimits {
    /// Total nodes including the root
    pub max_nodes: usize,
    /// Entry slots per directory
    pub max_dir_entries: usize,
    /// Longest single path component, in bytes
    pub max_name_len: usize,
}

impl Default for FsLimits {
    fn default() -> Self {
        Self {
            max_nodes: 50,
            max_dir_entries: 20,
            max_name_len: 100,
        }
    }
}

/// Retry budget for moves that lose a lock race on their second path
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MovePolicy {
    pub max_attempts: u32,
    pub backoff_micros: u64,
}

impl Default for MovePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 64,
            backoff_micros: 50,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FsConfig {
    pub limits: FsLimits,
    pub moves: MovePolicy,
}

impl FsConfig {
    pub fn validate(&self) -> FsResult<()> {
        if self.limits.max_nodes == 0 {
            return Err(FsError::InvalidConfig("limits.max-nodes must be at least 1".into()));
        }
        // Node indices travel as non-negative i32 status words
        if self.limits.max_nodes > i32::MAX as usize {
            return Err(FsError::InvalidConfig(
                "limits.max-nodes must not exceed 2147483647".into(),
            ));
        }
        if self.limits.max_dir_entries == 0 {
            return Err(FsError::InvalidConfig(
                "limits.max-dir-entries must be at least 1".into(),
            ));
        }
        if self.limits.max_name_len == 0 {
            return Err(FsError::InvalidConfig("limits.max-name-len must be at least 1".into()));
        }
        if self.moves.max_attempts == 0 {
            return Err(FsError::InvalidConfig("moves.max-attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Config with the given table capacity and default everything else
    pub fn with_capacity(max_nodes: usize, max_dir_entries: usize) -> Self {
        Self {
            limits: FsLimits {
                max_nodes,
                max_dir_entries,
                ..FsLimits::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = FsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.max_nodes, 50);
        assert_eq!(config.limits.max_dir_entries, 20);
        assert_eq!(config.moves.max_attempts, 64);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = FsConfig::with_capacity(0, 4);
        assert!(matches!(config.validate(), Err(FsError::InvalidConfig(_))));

        let config = FsConfig::with_capacity(4, 0);
        assert!(matches!(config.validate(), Err(FsError::InvalidConfig(_))));

        let mut config = FsConfig::default();
        config.moves.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_nodes_fits_status_word() {
        let at_limit = FsConfig::with_capacity(i32::MAX as usize, 4);
        assert!(at_limit.validate().is_ok());

        let over = FsConfig::with_capacity(i32::MAX as usize + 1, 4);
        assert!(matches!(over.validate(), Err(FsError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: FsConfig = toml::from_str(
            r#"
            [limits]
            max-nodes = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_nodes, 1024);
        assert_eq!(config.limits.max_dir_entries, 20);
        assert_eq!(config.moves, MovePolicy::default());
    }

    #[test]
    fn test_serializes_kebab_case() {
        let json = serde_json::to_value(FsConfig::default()).unwrap();
        assert_eq!(json["limits"]["max-dir-entries"], 20);
        assert_eq!(json["moves"]["backoff-micros"], 50);
    }
}
