// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Lazy pre-order tree enumeration

use tracing::trace;

use crate::locker::LockSet;
use crate::table::{NodeGuard, NodeTable};
use crate::types::{ListEntry, LockMode};

struct Frame<'a> {
    dir: NodeGuard<'a>,
    cursor: usize,
    depth: usize,
}

/// Iterator over everything beneath a directory.
///
/// Each directory is read-locked when entered and unlocked once all of its
/// entries have been produced; the ancestors of the listed directory stay
/// read-locked until the iterator is exhausted or dropped.
pub struct TreeList<'a> {
    table: &'a NodeTable,
    stack: Vec<Frame<'a>>,
    ancestors: LockSet<'a>,
}

impl<'a> TreeList<'a> {
    pub(crate) fn new(table: &'a NodeTable, ancestors: LockSet<'a>, root: NodeGuard<'a>) -> Self {
        Self {
            table,
            stack: vec![Frame {
                dir: root,
                cursor: 0,
                depth: 0,
            }],
            ancestors,
        }
    }

    fn finish(&mut self) {
        while let Some(frame) = self.stack.pop() {
            drop(frame);
        }
        self.ancestors.release();
    }
}

impl Iterator for TreeList<'_> {
    type Item = ListEntry;

    fn next(&mut self) -> Option<ListEntry> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.ancestors.release();
                return None;
            };
            let cursor = frame.cursor;
            let next = frame
                .dir
                .directory()
                .ok()
                .and_then(|dir| dir.next_occupied(cursor))
                .map(|(pos, entry)| (pos, entry.name.clone(), entry.child));
            let Some((pos, name, child)) = next else {
                trace!(depth = frame.depth, "directory fully listed");
                self.stack.pop();
                continue;
            };
            frame.cursor = pos + 1;
            let depth = frame.depth + 1;

            // The parent is read-locked, so the entry cannot go stale here
            let Ok(guard) = self.table.lock(child, LockMode::Read) else {
                continue;
            };
            let Some(kind) = guard.kind() else {
                continue;
            };
            if kind.is_dir() {
                self.stack.push(Frame {
                    dir: guard,
                    cursor: 0,
                    depth,
                });
            }
            return Some(ListEntry { depth, name, kind });
        }
    }
}

impl Drop for TreeList<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
