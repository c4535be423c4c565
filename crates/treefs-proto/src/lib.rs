// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! TreeFS Protocol: command grammar and status encoding
//!
//! This crate defines the textual request format (`<op> <path> [<arg>]`) sent
//! as a single datagram to the TreeFS daemon, and the signed status word the
//! daemon sends back: non-negative for success, negative for an error kind.

pub mod messages;
pub mod status;
pub mod validation;

// Re-export key types
pub use messages::{Command, FileKind, ParseError};
pub use status::{ErrorCode, Status};
pub use validation::*;
