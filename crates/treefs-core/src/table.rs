// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-capacity node table with one reader-writer lock per slot.
//!
//! The table never locks on behalf of callers: [`NodeTable::lock`] and
//! [`NodeTable::try_lock`] hand out guards, and all entry reads and writes go
//! through a guard the caller already holds.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{
    Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};

use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::types::{FileKind, FsStats, LockMode, NodeId};

/// Occupied directory slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub child: NodeId,
}

/// Fixed-size entry array of a directory node
#[derive(Debug)]
pub struct Directory {
    slots: Box<[Option<DirEntry>]>,
}

impl Directory {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.iter().find(|e| e.name == name).map(|e| e.child)
    }

    pub fn contains_child(&self, child: NodeId) -> bool {
        self.iter().any(|e| e.child == child)
    }

    pub fn insert(&mut self, name: &str, child: NodeId) -> FsResult<()> {
        if self.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self.slots.iter_mut().find(|s| s.is_none()).ok_or(FsError::DirectoryFull)?;
        *slot = Some(DirEntry {
            name: name.to_string(),
            child,
        });
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<NodeId> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|e| e.name == name))?;
        slot.take().map(|e| e.child)
    }

    /// Rename an entry in place, keeping its slot
    pub fn rename(&mut self, from: &str, to: &str) -> FsResult<()> {
        if self.find(to).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let entry = self
            .slots
            .iter_mut()
            .flatten()
            .find(|e| e.name == from)
            .ok_or(FsError::NotFound)?;
        entry.name = to.to_string();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.slots.iter().flatten()
    }

    /// First occupied slot at or after `from`, with its position
    pub fn next_occupied(&self, from: usize) -> Option<(usize, &DirEntry)> {
        self.slots
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(pos, slot)| slot.as_ref().map(|e| (pos, e)))
    }
}

#[derive(Debug)]
pub enum NodeBody {
    Directory(Directory),
    File,
}

/// Contents of one table slot. `body` is `None` while the slot is free.
#[derive(Debug)]
pub struct NodeData {
    generation: u32,
    body: Option<NodeBody>,
}

impl NodeData {
    fn free_slot() -> Self {
        Self {
            generation: 0,
            body: None,
        }
    }

    pub fn kind(&self) -> Option<FileKind> {
        match self.body {
            Some(NodeBody::Directory(_)) => Some(FileKind::Directory),
            Some(NodeBody::File) => Some(FileKind::File),
            None => None,
        }
    }

    /// Whether this slot currently holds the node `id` refers to
    pub fn is_live(&self, id: NodeId) -> bool {
        self.body.is_some() && self.generation == id.generation
    }

    pub fn directory(&self) -> FsResult<&Directory> {
        match &self.body {
            Some(NodeBody::Directory(dir)) => Ok(dir),
            Some(NodeBody::File) => Err(FsError::NotADirectory),
            None => Err(FsError::NotFound),
        }
    }

    pub fn directory_mut(&mut self) -> FsResult<&mut Directory> {
        match &mut self.body {
            Some(NodeBody::Directory(dir)) => Ok(dir),
            Some(NodeBody::File) => Err(FsError::NotADirectory),
            None => Err(FsError::NotFound),
        }
    }

    /// Occupied entry count, zero for files
    pub fn entry_count(&self) -> usize {
        self.directory().map(Directory::len).unwrap_or(0)
    }
}

/// A held node lock
pub enum NodeGuard<'a> {
    Read(RwLockReadGuard<'a, NodeData>),
    Write(RwLockWriteGuard<'a, NodeData>),
}

impl NodeGuard<'_> {
    pub fn mode(&self) -> LockMode {
        match self {
            NodeGuard::Read(_) => LockMode::Read,
            NodeGuard::Write(_) => LockMode::Write,
        }
    }

    /// Mutable access, only through a write lock
    pub fn data_mut(&mut self) -> Option<&mut NodeData> {
        match self {
            NodeGuard::Read(_) => None,
            NodeGuard::Write(guard) => Some(guard),
        }
    }
}

impl Deref for NodeGuard<'_> {
    type Target = NodeData;

    fn deref(&self) -> &NodeData {
        match self {
            NodeGuard::Read(guard) => guard,
            NodeGuard::Write(guard) => guard,
        }
    }
}

pub struct NodeTable {
    slots: Box<[RwLock<NodeData>]>,
    free: Mutex<Vec<u32>>,
    dir_capacity: usize,
    directories: AtomicUsize,
    files: AtomicUsize,
}

impl NodeTable {
    /// Build a table of `capacity` slots with the root directory in slot 0
    pub fn new(capacity: usize, dir_capacity: usize) -> FsResult<Self> {
        if capacity == 0 || capacity > u32::MAX as usize {
            return Err(FsError::InvalidConfig(format!(
                "node table capacity {} out of range",
                capacity
            )));
        }
        let slots: Box<[RwLock<NodeData>]> =
            (0..capacity).map(|_| RwLock::new(NodeData::free_slot())).collect();
        {
            let mut root = slots[0].write().unwrap_or_else(PoisonError::into_inner);
            root.body = Some(NodeBody::Directory(Directory::with_capacity(dir_capacity)));
        }
        // Popped from the back, so low indices are handed out first
        let free = (1..capacity as u32).rev().collect();
        Ok(Self {
            slots,
            free: Mutex::new(free),
            dir_capacity,
            directories: AtomicUsize::new(1),
            files: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, id: NodeId) -> FsResult<&RwLock<NodeData>> {
        self.slots.get(id.index as usize).ok_or(FsError::NotFound)
    }

    /// Claim a free slot and initialise it as an unreachable node of `kind`.
    /// The node becomes visible only once the caller links it into a parent.
    pub fn allocate(&self, kind: FileKind) -> FsResult<NodeId> {
        let index = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(FsError::TableFull)?;
        let mut data = self.slots[index as usize].write().unwrap_or_else(PoisonError::into_inner);
        data.body = Some(match kind {
            FileKind::Directory => {
                self.directories.fetch_add(1, Ordering::Relaxed);
                NodeBody::Directory(Directory::with_capacity(self.dir_capacity))
            }
            FileKind::File => {
                self.files.fetch_add(1, Ordering::Relaxed);
                NodeBody::File
            }
        });
        let id = NodeId::new(index, data.generation);
        trace!(node = %id, ?kind, "allocated node");
        Ok(id)
    }

    /// Release a node through its write guard. The caller must already have
    /// removed the only entry referencing it.
    pub fn free(&self, id: NodeId, mut guard: NodeGuard<'_>) -> FsResult<()> {
        if id.is_root() {
            return Err(FsError::InvalidPath);
        }
        let data = guard.data_mut().ok_or(FsError::LockContention)?;
        if !data.is_live(id) {
            return Err(FsError::NotFound);
        }
        match data.body.take() {
            Some(NodeBody::Directory(_)) => self.directories.fetch_sub(1, Ordering::Relaxed),
            Some(NodeBody::File) => self.files.fetch_sub(1, Ordering::Relaxed),
            None => 0,
        };
        data.generation = data.generation.wrapping_add(1);
        drop(guard);
        self.free.lock().unwrap_or_else(PoisonError::into_inner).push(id.index);
        trace!(node = %id, "freed node");
        Ok(())
    }

    /// Block until `id` is locked in `mode`. Fails with `NotFound` when the
    /// handle is stale.
    pub fn lock(&self, id: NodeId, mode: LockMode) -> FsResult<NodeGuard<'_>> {
        let slot = self.slot(id)?;
        let guard = match mode {
            LockMode::Read => NodeGuard::Read(slot.read().unwrap_or_else(PoisonError::into_inner)),
            LockMode::Write => {
                NodeGuard::Write(slot.write().unwrap_or_else(PoisonError::into_inner))
            }
        };
        if !guard.is_live(id) {
            return Err(FsError::NotFound);
        }
        trace!(node = %id, ?mode, "locked node");
        Ok(guard)
    }

    /// Lock `id` without waiting. `Ok(None)` means another holder has it.
    pub fn try_lock(&self, id: NodeId, mode: LockMode) -> FsResult<Option<NodeGuard<'_>>> {
        let slot = self.slot(id)?;
        let guard = match mode {
            LockMode::Read => match slot.try_read() {
                Ok(g) => NodeGuard::Read(g),
                Err(TryLockError::Poisoned(p)) => NodeGuard::Read(p.into_inner()),
                Err(TryLockError::WouldBlock) => return Ok(None),
            },
            LockMode::Write => match slot.try_write() {
                Ok(g) => NodeGuard::Write(g),
                Err(TryLockError::Poisoned(p)) => NodeGuard::Write(p.into_inner()),
                Err(TryLockError::WouldBlock) => return Ok(None),
            },
        };
        if !guard.is_live(id) {
            return Err(FsError::NotFound);
        }
        trace!(node = %id, ?mode, "try-locked node");
        Ok(Some(guard))
    }

    pub fn stats(&self) -> FsStats {
        let free = self.free.lock().unwrap_or_else(PoisonError::into_inner).len();
        FsStats {
            capacity: self.capacity(),
            in_use: self.capacity() - free,
            directories: self.directories.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
        }
    }
}
