// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path locking.
//!
//! A single path is locked top-down from the root. With write intent the
//! modified parent and the target are locked Write and every ancestor above
//! them Read, so unrelated operations only ever share Read locks on common
//! ancestors.
//!
//! Two paths (move) are ordered by [`FsPath::lock_cmp`]. The first is locked
//! blocking; the second is locked with non-blocking attempts only, skipping
//! nodes the first path already holds. Any refusal on the second path aborts
//! the whole acquisition with [`FsError::LockContention`]. A thread therefore
//! only ever waits while holding a root-down prefix of one path, which rules
//! out wait cycles between movers.

use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::error::{FsError, FsResult};
use crate::path::FsPath;
use crate::table::{NodeData, NodeGuard, NodeTable};
use crate::types::{LockIntent, LockMode, NodeId};

/// Ordered collection of held node locks, released in reverse order on drop
pub struct LockSet<'a> {
    held: Vec<(NodeId, NodeGuard<'a>)>,
}

impl<'a> LockSet<'a> {
    pub(crate) fn new() -> Self {
        Self { held: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        self.held.iter().position(|(held, _)| *held == id)
    }

    pub fn mode_of(&self, id: NodeId) -> Option<LockMode> {
        self.position(id).map(|pos| self.held[pos].1.mode())
    }

    /// Held nodes in acquisition order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, LockMode)> + '_ {
        self.held.iter().map(|(id, guard)| (*id, guard.mode()))
    }

    /// Read access to a held node
    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.position(id).map(|pos| &*self.held[pos].1)
    }

    /// Write access to a node held in Write mode
    pub fn node_mut(&mut self, id: NodeId) -> FsResult<&mut NodeData> {
        let pos = self.position(id).ok_or(FsError::NotFound)?;
        self.held[pos].1.data_mut().ok_or(FsError::LockContention)
    }

    pub(crate) fn push(&mut self, id: NodeId, guard: NodeGuard<'a>) {
        self.held.push((id, guard));
    }

    /// Remove a node's guard from the set, handing ownership to the caller
    pub(crate) fn take(&mut self, id: NodeId) -> Option<NodeGuard<'a>> {
        let pos = self.position(id)?;
        Some(self.held.remove(pos).1)
    }

    /// Release everything now, newest first
    pub fn release(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let count = self.held.len();
        while let Some((id, guard)) = self.held.pop() {
            trace!(node = %id, mode = ?guard.mode(), "unlocking node");
            drop(guard);
        }
        debug!(count, "released lock set");
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for LockSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.nodes()).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Acquire {
    Blocking,
    NonBlocking,
}

fn acquire_node<'a>(
    table: &'a NodeTable,
    set: &mut LockSet<'a>,
    id: NodeId,
    mode: LockMode,
    acquire: Acquire,
) -> FsResult<()> {
    if let Some(held) = set.mode_of(id) {
        // Shared with the first path of a move
        return if held.satisfies(mode) {
            Ok(())
        } else {
            Err(FsError::LockContention)
        };
    }
    let guard = match acquire {
        Acquire::Blocking => table.lock(id, mode)?,
        Acquire::NonBlocking => table.try_lock(id, mode)?.ok_or(FsError::LockContention)?,
    };
    set.push(id, guard);
    Ok(())
}

/// Lock the nodes along `path` into `set`, root first.
///
/// The walk stops early at the first component that does not exist or whose
/// parent is a file; the caller's resolution under the lock reports why.
/// Returns the ids of the path nodes reached, root first.
pub(crate) fn walk<'a>(
    table: &'a NodeTable,
    set: &mut LockSet<'a>,
    path: &FsPath<'_>,
    intent: LockIntent,
    acquire: Acquire,
) -> FsResult<Vec<NodeId>> {
    let segments = path.depth();
    let mut names = path.segments();
    let mut chain = Vec::with_capacity(segments + 1);
    let mut current = NodeId::ROOT;

    for depth in 0..=segments {
        acquire_node(table, set, current, intent.mode_at(depth, segments), acquire)?;
        chain.push(current);

        let Some(name) = names.next() else { break };
        let Some(data) = set.node(current) else { break };
        let Ok(dir) = data.directory() else { break };
        match dir.find(name) {
            Some(child) => current = child,
            None => break,
        }
    }
    Ok(chain)
}

/// Lock a single path, blocking until every lock is granted
pub fn lock_path<'a>(
    table: &'a NodeTable,
    path: &FsPath<'_>,
    intent: LockIntent,
) -> FsResult<LockSet<'a>> {
    let mut set = LockSet::new();
    walk(table, &mut set, path, intent, Acquire::Blocking)?;
    debug!(path = %path, ?intent, locks = set.len(), "acquired path lock set");
    Ok(set)
}

/// Locks held for a move, plus the nodes each path reached
#[derive(Debug)]
pub struct PairLock<'a> {
    pub set: LockSet<'a>,
    pub src_chain: Vec<NodeId>,
    pub dest_chain: Vec<NodeId>,
}

/// Lock both paths of a move with write intent.
///
/// Fails with [`FsError::LockContention`] without waiting when any node of
/// the second path is held by another operation; nothing stays locked then.
pub fn lock_pair<'a>(
    table: &'a NodeTable,
    src: &FsPath<'_>,
    dest: &FsPath<'_>,
) -> FsResult<PairLock<'a>> {
    let src_first = src.lock_cmp(dest) != Ordering::Greater;
    let (first, second) = if src_first { (src, dest) } else { (dest, src) };

    let mut set = LockSet::new();
    let first_chain = walk(table, &mut set, first, LockIntent::Write, Acquire::Blocking)?;
    let second_chain =
        match walk(table, &mut set, second, LockIntent::Write, Acquire::NonBlocking) {
            Ok(chain) => chain,
            Err(err) => {
                debug!(first = %first, second = %second, error = %err, "aborting pair lock");
                return Err(err);
            }
        };
    debug!(src = %src, dest = %dest, locks = set.len(), "acquired pair lock set");

    let (src_chain, dest_chain) = if src_first {
        (first_chain, second_chain)
    } else {
        (second_chain, first_chain)
    };
    Ok(PairLock {
        set,
        src_chain,
        dest_chain,
    })
}
