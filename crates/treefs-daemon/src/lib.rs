// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! TreeFS Daemon
//!
//! Serves a [`treefs_core::FsCore`] namespace over a Unix datagram socket,
//! or replays a command file against it in batch mode. Both paths run each
//! command through the same [`server::RequestHandler`]: parse, validate,
//! pass the print gate, dispatch exactly one namespace operation.

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod gate;
pub mod queue;
pub mod server;

pub use batch::{run_batch, BatchOptions, BatchReport};
pub use config::{DaemonConfig, ServerConfig};
pub use dispatch::{dispatch, Namespace};
pub use gate::PrintGate;
pub use queue::{CommandQueue, QueueClosed, DEFAULT_QUEUE_CAPACITY};
pub use server::{RequestHandler, Server, ServerHandle};
