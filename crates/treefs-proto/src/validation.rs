// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Validation of parsed commands before they reach the core

use crate::messages::*;
use crate::status::{ErrorCode, Status};
use thiserror::Error;

/// Longest path accepted on the wire, matching the default name limit
pub const DEFAULT_MAX_PATH_LEN: usize = 100;

/// Validation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyOperand { field: &'static str },
    #[error("{field} is {len} bytes, limit is {max}")]
    PathTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{field} contains a NUL byte")]
    EmbeddedNul { field: &'static str },
    #[error("status {0} does not map to a known error code")]
    UnknownStatus(i32),
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::PathTooLong { .. } => ErrorCode::NameTooLong,
            _ => ErrorCode::InvalidCommand,
        }
    }
}

fn check_operand(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyOperand { field });
    }
    if value.contains('\0') {
        return Err(ValidationError::EmbeddedNul { field });
    }
    if value.len() > max {
        return Err(ValidationError::PathTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

/// Validate a parsed command against the transport's operand limits
pub fn validate_command(command: &Command, max_path_len: usize) -> Result<(), ValidationError> {
    match command {
        Command::Create { path, .. } | Command::Delete { path } | Command::Lookup { path } => {
            check_operand("path", path, max_path_len)
        }
        Command::Move { src, dest } => {
            check_operand("source", src, max_path_len)?;
            check_operand("destination", dest, max_path_len)
        }
        Command::Print { output } => {
            // Output files live on the daemon host and are not bound by the namespace limit
            let text = output.to_string_lossy();
            check_operand("output file", &text, usize::MAX)
        }
    }
}

/// Validate a status received from a server
pub fn validate_status(status: Status) -> Result<Status, ValidationError> {
    if status.is_ok() || status.error_code().is_some() {
        Ok(status)
    } else {
        Err(ValidationError::UnknownStatus(status.0))
    }
}
