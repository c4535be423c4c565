// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for TreeFS Core

use std::io;

use treefs_proto::ErrorCode;

/// Core namespace error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("node table full")]
    TableFull,
    #[error("destination is the source or one of its descendants")]
    SelfOrAncestorConflict,
    #[error("lock contended by another operation")]
    LockContention,
    #[error("directory has no free entry slots")]
    DirectoryFull,
    #[error("invalid path")]
    InvalidPath,
    #[error("name too long")]
    NameTooLong,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, FsError::LockContention)
    }

    /// Wire error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            FsError::NotFound => ErrorCode::NotFound,
            FsError::NotADirectory => ErrorCode::NotADirectory,
            FsError::AlreadyExists => ErrorCode::AlreadyExists,
            FsError::DirectoryNotEmpty => ErrorCode::DirectoryNotEmpty,
            FsError::TableFull => ErrorCode::TableFull,
            FsError::SelfOrAncestorConflict => ErrorCode::SelfOrAncestorConflict,
            FsError::LockContention => ErrorCode::LockContention,
            FsError::DirectoryFull => ErrorCode::DirectoryFull,
            FsError::InvalidPath => ErrorCode::InvalidPath,
            FsError::NameTooLong => ErrorCode::NameTooLong,
            FsError::InvalidConfig(_) => ErrorCode::Internal,
            FsError::Io(_) => ErrorCode::Io,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
