// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! TreeFS Core: a shared in-memory namespace for concurrent workers.
//!
//! Nodes live in a fixed-capacity [`table::NodeTable`] with one
//! reader-writer lock per slot. Every operation locks the nodes along its
//! path through [`locker`], resolves names against the locks it holds and
//! mutates entries only under write locks.

pub mod config;
pub mod error;
pub mod list;
pub mod locker;
pub mod path;
pub mod resolver;
pub mod table;
pub mod types;
pub mod vfs;

pub use config::{FsConfig, FsLimits, MovePolicy};
pub use error::{FsError, FsResult};
pub use list::TreeList;
pub use locker::LockSet;
pub use path::FsPath;
pub use types::*;
pub use vfs::FsCore;
