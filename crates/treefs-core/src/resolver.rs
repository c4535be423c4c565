// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path resolution

use crate::error::{FsError, FsResult};
use crate::locker::{lock_path, LockSet};
use crate::path::FsPath;
use crate::table::{NodeData, NodeTable};
use crate::types::{LockIntent, NodeId};

/// Nodes whose contents the caller may read without further locking
pub trait NodeView {
    fn node(&self, id: NodeId) -> Option<&NodeData>;
}

impl NodeView for LockSet<'_> {
    fn node(&self, id: NodeId) -> Option<&NodeData> {
        LockSet::node(self, id)
    }
}

/// Resolve `segments` from the root using only nodes visible through `view`.
///
/// Performs no locking; the caller already holds the locks of every node the
/// walk can reach. A missing component is `NotFound`, a file in the middle of
/// the path is `NotADirectory`.
pub fn resolve_in<'s, V>(view: &V, segments: impl IntoIterator<Item = &'s str>) -> FsResult<NodeId>
where
    V: NodeView + ?Sized,
{
    let mut current = NodeId::ROOT;
    for name in segments {
        let data = view.node(current).ok_or(FsError::NotFound)?;
        current = data.directory()?.find(name).ok_or(FsError::NotFound)?;
    }
    Ok(current)
}

/// Standalone lookup: read-lock the path, resolve it, release.
pub fn resolve(table: &NodeTable, path: &FsPath<'_>) -> FsResult<NodeId> {
    let set = lock_path(table, path, LockIntent::Read)?;
    resolve_in(&set, path.segments())
}
