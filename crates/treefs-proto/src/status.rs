// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Response status word

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error kinds carried in a negative status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    NotFound = -1,
    NotADirectory = -2,
    AlreadyExists = -3,
    DirectoryNotEmpty = -4,
    TableFull = -5,
    SelfOrAncestorConflict = -6,
    LockContention = -7,
    DirectoryFull = -8,
    InvalidPath = -9,
    NameTooLong = -10,
    InvalidCommand = -11,
    Io = -12,
    Internal = -13,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 13] = [
        ErrorCode::NotFound,
        ErrorCode::NotADirectory,
        ErrorCode::AlreadyExists,
        ErrorCode::DirectoryNotEmpty,
        ErrorCode::TableFull,
        ErrorCode::SelfOrAncestorConflict,
        ErrorCode::LockContention,
        ErrorCode::DirectoryFull,
        ErrorCode::InvalidPath,
        ErrorCode::NameTooLong,
        ErrorCode::InvalidCommand,
        ErrorCode::Io,
        ErrorCode::Internal,
    ];

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_i32() == value)
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "no such file or directory",
            ErrorCode::NotADirectory => "not a directory",
            ErrorCode::AlreadyExists => "already exists",
            ErrorCode::DirectoryNotEmpty => "directory not empty",
            ErrorCode::TableFull => "node table full",
            ErrorCode::SelfOrAncestorConflict => "destination inside source",
            ErrorCode::LockContention => "lock contention, retry",
            ErrorCode::DirectoryFull => "directory full",
            ErrorCode::InvalidPath => "invalid path",
            ErrorCode::NameTooLong => "name too long",
            ErrorCode::InvalidCommand => "invalid command",
            ErrorCode::Io => "i/o error",
            ErrorCode::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

/// Signed status returned for every request.
///
/// Non-negative values are success (a node index for lookup, zero otherwise);
/// negative values are an [`ErrorCode`]. On the wire it is four little-endian
/// bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const WIRE_LEN: usize = 4;

    pub fn ok(value: u32) -> Self {
        Status(i32::try_from(value).unwrap_or(i32::MAX))
    }

    pub fn error(code: ErrorCode) -> Self {
        Status(code.as_i32())
    }

    pub fn is_ok(&self) -> bool {
        self.0 >= 0
    }

    pub fn value(&self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }

    /// `None` for success, or for a negative value no known code matches
    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.is_ok() {
            None
        } else {
            ErrorCode::from_i32(self.0)
        }
    }

    pub fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; Self::WIRE_LEN] = bytes.get(..Self::WIRE_LEN)?.try_into().ok()?;
        Some(Status(i32::from_le_bytes(raw)))
    }
}

impl From<ErrorCode> for Status {
    fn from(code: ErrorCode) -> Self {
        Status::error(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_code() {
            Some(code) => write!(f, "error: {}", code),
            None if self.is_ok() => write!(f, "ok {}", self.0),
            None => write!(f, "error: unknown status {}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct_and_negative() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::ALL {
            assert!(code.as_i32() < 0);
            assert!(seen.insert(code.as_i32()));
            assert_eq!(ErrorCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ErrorCode::from_i32(0), None);
        assert_eq!(ErrorCode::from_i32(-99), None);
    }

    #[test]
    fn test_status_wire_format_is_little_endian() {
        assert_eq!(Status::ok(7).to_bytes(), [7, 0, 0, 0]);
        assert_eq!(
            Status::error(ErrorCode::NotFound).to_bytes(),
            [0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(
            Status::from_bytes(&[0xfd, 0xff, 0xff, 0xff]),
            Some(Status::error(ErrorCode::AlreadyExists))
        );
        assert_eq!(Status::from_bytes(&[1, 2]), None);
    }

    #[test]
    fn test_status_classification() {
        let ok = Status::ok(12);
        assert!(ok.is_ok());
        assert_eq!(ok.value(), Some(12));
        assert_eq!(ok.error_code(), None);

        let err = Status::from(ErrorCode::TableFull);
        assert!(!err.is_ok());
        assert_eq!(err.value(), None);
        assert_eq!(err.error_code(), Some(ErrorCode::TableFull));
        assert!(err.to_string().contains("node table full"));

        assert_eq!(Status(-1000).error_code(), None);
        assert!(Status(-1000).to_string().contains("unknown"));
    }
}
