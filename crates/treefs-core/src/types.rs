// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for TreeFS

use serde::{Deserialize, Serialize};

pub use treefs_proto::FileKind;

/// Handle to a node table slot.
///
/// The generation is bumped every time the slot is freed, so a handle kept
/// across a delete never aliases a node later allocated in the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub const ROOT: NodeId = NodeId {
        index: 0,
        generation: 0,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index, the number reported to clients
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_root(&self) -> bool {
        self.index == 0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// Mode in which a node lock is held
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockMode {
    Read,
    Write,
}

impl LockMode {
    /// Whether holding `self` grants everything `needed` does
    pub fn satisfies(self, needed: LockMode) -> bool {
        self == LockMode::Write || needed == LockMode::Read
    }
}

/// What an operation intends to do at the end of a path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockIntent {
    /// lookup and list
    Read,
    /// create, delete and both sides of move
    Write,
}

impl LockIntent {
    /// Mode for the node at `depth` (root is 0) of a path with `segments` components.
    ///
    /// With write intent the last two nodes, the modified parent and the
    /// target, are locked Write and everything above them Read.
    pub fn mode_at(self, depth: usize, segments: usize) -> LockMode {
        match self {
            LockIntent::Read => LockMode::Read,
            LockIntent::Write if depth + 1 >= segments => LockMode::Write,
            LockIntent::Write => LockMode::Read,
        }
    }
}

/// Attributes of a resolved node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttr {
    pub id: NodeId,
    pub kind: FileKind,
    /// Occupied entries, zero for files
    pub entries: usize,
}

/// One item of a tree listing. Depth is relative to the listed directory,
/// whose direct children are at depth 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub depth: usize,
    pub name: String,
    pub kind: FileKind,
}

/// Node table occupancy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStats {
    pub capacity: usize,
    pub in_use: usize,
    pub directories: usize,
    pub files: usize,
}
