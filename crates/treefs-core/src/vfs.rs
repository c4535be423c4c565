// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Tree mutator: the namespace operations

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::list::TreeList;
use crate::locker::{lock_pair, lock_path, LockSet, PairLock};
use crate::path::FsPath;
use crate::resolver::{resolve, resolve_in};
use crate::table::NodeTable;
use crate::types::{FileKind, FsStats, LockIntent, LockMode, NodeAttr, NodeId};

const COMPONENT: &str = "treefs-core";

/// The shared in-memory namespace
pub struct FsCore {
    config: FsConfig,
    table: NodeTable,
}

impl FsCore {
    /// Create the namespace with an empty root directory
    pub fn new(config: FsConfig) -> FsResult<Self> {
        config.validate()?;
        let table = NodeTable::new(config.limits.max_nodes, config.limits.max_dir_entries)?;
        info!(
            component = COMPONENT,
            max_nodes = config.limits.max_nodes,
            max_dir_entries = config.limits.max_dir_entries,
            "namespace initialised"
        );
        Ok(Self { config, table })
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    /// Tear the namespace down and report its final occupancy
    pub fn shutdown(self) -> FsStats {
        let stats = self.table.stats();
        info!(
            component = COMPONENT,
            in_use = stats.in_use,
            directories = stats.directories,
            files = stats.files,
            "namespace shut down"
        );
        stats
    }

    pub fn stats(&self) -> FsStats {
        self.table.stats()
    }

    fn check_name(&self, name: &str) -> FsResult<()> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(FsError::InvalidPath);
        }
        if name.len() > self.config.limits.max_name_len {
            return Err(FsError::NameTooLong);
        }
        Ok(())
    }

    /// Lock a single path and hand the lock set to the caller
    pub fn lock_path(&self, path: &str, intent: LockIntent) -> FsResult<LockSet<'_>> {
        lock_path(&self.table, &FsPath::new(path), intent)
    }

    pub fn create(&self, path: &str, kind: FileKind) -> FsResult<()> {
        let path = FsPath::new(path);
        let name = path.file_name().ok_or(FsError::InvalidPath)?;
        self.check_name(name)?;

        let mut set = lock_path(&self.table, &path, LockIntent::Write)?;
        let parent = resolve_in(&set, path.parent_segments())?;
        {
            let dir = set.node(parent).ok_or(FsError::NotFound)?.directory()?;
            if dir.find(name).is_some() {
                return Err(FsError::AlreadyExists);
            }
            if !dir.has_free_slot() {
                return Err(FsError::DirectoryFull);
            }
        }

        let child = self.table.allocate(kind)?;
        let linked = set
            .node_mut(parent)
            .and_then(|data| data.directory_mut())
            .and_then(|dir| dir.insert(name, child));
        if let Err(err) = linked {
            self.reclaim(child);
            return Err(err);
        }
        debug!(path = %path, ?kind, node = %child, "created");
        Ok(())
    }

    /// Free a node that was allocated but never linked
    fn reclaim(&self, id: NodeId) {
        let freed = self
            .table
            .lock(id, LockMode::Write)
            .and_then(|guard| self.table.free(id, guard));
        if let Err(err) = freed {
            warn!(component = COMPONENT, node = %id, error = %err, "failed to reclaim node");
        }
    }

    pub fn delete(&self, path: &str) -> FsResult<()> {
        let path = FsPath::new(path);
        let name = path.file_name().ok_or(FsError::InvalidPath)?;

        let mut set = lock_path(&self.table, &path, LockIntent::Write)?;
        let parent = resolve_in(&set, path.parent_segments())?;
        let target = set
            .node(parent)
            .ok_or(FsError::NotFound)?
            .directory()?
            .find(name)
            .ok_or(FsError::NotFound)?;
        if set.node(target).ok_or(FsError::NotFound)?.entry_count() > 0 {
            return Err(FsError::DirectoryNotEmpty);
        }

        set.node_mut(parent)?.directory_mut()?.remove(name);
        let guard = set.take(target).ok_or(FsError::NotFound)?;
        self.table.free(target, guard)?;
        debug!(path = %path, node = %target, "deleted");
        Ok(())
    }

    pub fn lookup(&self, path: &str) -> FsResult<NodeId> {
        resolve(&self.table, &FsPath::new(path))
    }

    pub fn getattr(&self, path: &str) -> FsResult<NodeAttr> {
        let path = FsPath::new(path);
        let set = lock_path(&self.table, &path, LockIntent::Read)?;
        let id = resolve_in(&set, path.segments())?;
        let data = set.node(id).ok_or(FsError::NotFound)?;
        Ok(NodeAttr {
            id,
            kind: data.kind().ok_or(FsError::NotFound)?,
            entries: data.entry_count(),
        })
    }

    /// One move attempt. Surfaces `LockContention` as soon as the second
    /// path cannot be locked without waiting.
    pub fn try_move(&self, src: &str, dest: &str) -> FsResult<()> {
        let src = FsPath::new(src);
        let dest = FsPath::new(dest);
        let src_name = src.file_name().ok_or(FsError::InvalidPath)?;
        let dest_name = dest.file_name().ok_or(FsError::InvalidPath)?;
        self.check_name(dest_name)?;
        if dest.is_within(&src) {
            return Err(FsError::SelfOrAncestorConflict);
        }

        let PairLock {
            mut set,
            dest_chain,
            ..
        } = lock_pair(&self.table, &src, &dest)?;

        let src_parent = resolve_in(&set, src.parent_segments())?;
        let node = set
            .node(src_parent)
            .ok_or(FsError::NotFound)?
            .directory()?
            .find(src_name)
            .ok_or(FsError::NotFound)?;
        let dest_parent = resolve_in(&set, dest.parent_segments())?;
        let dest_has_room = {
            let dir = set.node(dest_parent).ok_or(FsError::NotFound)?.directory()?;
            if dir.find(dest_name).is_some() {
                return Err(FsError::AlreadyExists);
            }
            dir.has_free_slot()
        };
        if dest_chain.contains(&node) {
            return Err(FsError::SelfOrAncestorConflict);
        }

        if src_parent == dest_parent {
            set.node_mut(src_parent)?.directory_mut()?.rename(src_name, dest_name)?;
        } else {
            if !dest_has_room {
                return Err(FsError::DirectoryFull);
            }
            // Link under the destination before unlinking the source
            set.node_mut(dest_parent)?.directory_mut()?.insert(dest_name, node)?;
            set.node_mut(src_parent)?.directory_mut()?.remove(src_name);
        }
        debug!(src = %src, dest = %dest, node = %node, "moved");
        Ok(())
    }

    /// Move `src` to `dest`, retrying lost lock races with jittered
    /// exponential backoff.
    pub fn move_node(&self, src: &str, dest: &str) -> FsResult<()> {
        let policy = &self.config.moves;
        let mut rng = rand::thread_rng();
        for attempt in 0..policy.max_attempts {
            match self.try_move(src, dest) {
                Err(FsError::LockContention) => {
                    let ceiling = policy.backoff_micros.saturating_mul(1 << attempt.min(10));
                    let pause = rng.gen_range(0..=ceiling);
                    debug!(src, dest, attempt, pause_us = pause, "move contended, backing off");
                    thread::sleep(Duration::from_micros(pause));
                }
                result => return result,
            }
        }
        warn!(
            component = COMPONENT,
            src,
            dest,
            attempts = policy.max_attempts,
            "move gave up after repeated lock contention"
        );
        Err(FsError::LockContention)
    }

    /// Everything beneath the directory at `path`, pre-order
    pub fn list(&self, path: &str) -> FsResult<TreeList<'_>> {
        let path = FsPath::new(path);
        let mut set = lock_path(&self.table, &path, LockIntent::Read)?;
        let target = resolve_in(&set, path.segments())?;
        let guard = set.take(target).ok_or(FsError::NotFound)?;
        guard.directory()?;
        Ok(TreeList::new(&self.table, set, guard))
    }

    /// Write every path in the tree, one per line, root first as `/`.
    /// Returns the number of lines written.
    pub fn print_tree<W: Write>(&self, out: &mut W) -> FsResult<usize> {
        writeln!(out, "/")?;
        let mut names: Vec<String> = Vec::new();
        let mut lines = 1;
        for entry in self.list("/")? {
            names.truncate(entry.depth.saturating_sub(1));
            names.push(entry.name);
            writeln!(out, "/{}", names.join("/"))?;
            lines += 1;
        }
        Ok(lines)
    }

    pub fn print_tree_to(&self, path: &Path) -> FsResult<usize> {
        let mut out = BufWriter::new(File::create(path)?);
        let lines = self.print_tree(&mut out)?;
        out.flush()?;
        info!(component = COMPONENT, output = %path.display(), lines, "tree printed");
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_fs() -> FsCore {
        FsCore::new(FsConfig::with_capacity(16, 4)).unwrap()
    }

    fn listing(fs: &FsCore, path: &str) -> Vec<(usize, String, FileKind)> {
        fs.list(path).unwrap().map(|e| (e.depth, e.name, e.kind)).collect()
    }

    #[test]
    fn test_create_then_lookup() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/f", FileKind::File).unwrap();

        let attr = fs.getattr("/a/f").unwrap();
        assert_eq!(attr.kind, FileKind::File);
        assert_eq!(fs.lookup("/a/f").unwrap(), attr.id);
        assert_eq!(fs.getattr("/a").unwrap().entries, 1);
        assert_eq!(fs.lookup("/").unwrap(), NodeId::ROOT);
    }

    #[test]
    fn test_create_errors() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/f", FileKind::File).unwrap();

        assert!(matches!(fs.create("/a", FileKind::File), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.create("/x/y", FileKind::File), Err(FsError::NotFound)));
        assert!(matches!(fs.create("/f/y", FileKind::File), Err(FsError::NotADirectory)));
        assert!(matches!(fs.create("/", FileKind::Directory), Err(FsError::InvalidPath)));
        assert!(matches!(fs.create("/a/..", FileKind::File), Err(FsError::InvalidPath)));
        let long = format!("/{}", "n".repeat(101));
        assert!(matches!(fs.create(&long, FileKind::File), Err(FsError::NameTooLong)));
    }

    #[test]
    fn test_directory_full_and_table_full() {
        let fs = FsCore::new(FsConfig::with_capacity(4, 2)).unwrap();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/b", FileKind::Directory).unwrap();
        assert!(matches!(fs.create("/c", FileKind::File), Err(FsError::DirectoryFull)));

        fs.create("/a/x", FileKind::File).unwrap();
        assert!(matches!(fs.create("/a/y", FileKind::File), Err(FsError::TableFull)));
        assert_eq!(fs.stats().in_use, 4);
    }

    #[test]
    fn test_delete_rules() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/f", FileKind::File).unwrap();

        assert!(matches!(fs.delete("/a"), Err(FsError::DirectoryNotEmpty)));
        assert_eq!(listing(&fs, "/").len(), 2);

        fs.delete("/a/f").unwrap();
        fs.delete("/a").unwrap();
        assert!(matches!(fs.lookup("/a"), Err(FsError::NotFound)));
        assert!(matches!(fs.delete("/a"), Err(FsError::NotFound)));
        assert!(matches!(fs.delete("/"), Err(FsError::InvalidPath)));
        assert_eq!(fs.stats().in_use, 1);
    }

    #[test]
    fn test_stale_id_is_not_reused_silently() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::File).unwrap();
        let old = fs.lookup("/a").unwrap();
        fs.delete("/a").unwrap();
        fs.create("/b", FileKind::File).unwrap();
        let new = fs.lookup("/b").unwrap();
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
    }

    #[test]
    fn test_move_between_directories() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/b", FileKind::Directory).unwrap();
        fs.create("/a/f", FileKind::File).unwrap();
        let id = fs.lookup("/a/f").unwrap();

        fs.move_node("/a/f", "/b/g").unwrap();
        assert!(matches!(fs.lookup("/a/f"), Err(FsError::NotFound)));
        assert_eq!(fs.lookup("/b/g").unwrap(), id);
    }

    #[test]
    fn test_move_rename_in_place() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/old", FileKind::Directory).unwrap();
        fs.create("/a/old/inner", FileKind::File).unwrap();

        fs.move_node("/a/old", "/a/new").unwrap();
        assert!(fs.lookup("/a/new/inner").is_ok());
        assert!(matches!(fs.lookup("/a/old"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_move_rejects_cycles_and_conflicts() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/b", FileKind::Directory).unwrap();
        fs.create("/c", FileKind::File).unwrap();

        assert!(matches!(fs.move_node("/a", "/a"), Err(FsError::SelfOrAncestorConflict)));
        assert!(matches!(
            fs.move_node("/a", "/a/b/z"),
            Err(FsError::SelfOrAncestorConflict)
        ));
        assert!(matches!(fs.move_node("/a/b", "/c"), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.move_node("/a/b", "/a"), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.move_node("/nope", "/z"), Err(FsError::NotFound)));
        assert!(matches!(fs.move_node("/a", "/missing/z"), Err(FsError::NotFound)));
        assert!(matches!(fs.move_node("/a", "/c/z"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.move_node("/", "/z"), Err(FsError::InvalidPath)));

        assert_eq!(
            listing(&fs, "/"),
            vec![
                (1, "a".to_string(), FileKind::Directory),
                (2, "b".to_string(), FileKind::Directory),
                (1, "c".to_string(), FileKind::File),
            ]
        );
    }

    #[test]
    fn test_move_into_full_directory() {
        let fs = FsCore::new(FsConfig::with_capacity(8, 1)).unwrap();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/x", FileKind::File).unwrap();
        assert!(matches!(fs.move_node("/a/x", "/y"), Err(FsError::DirectoryFull)));
        assert!(fs.lookup("/a/x").is_ok());
    }

    #[test]
    fn test_list_is_pre_order() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/b", FileKind::Directory).unwrap();
        fs.create("/a/b/f", FileKind::File).unwrap();
        fs.create("/c", FileKind::Directory).unwrap();

        assert_eq!(
            listing(&fs, "/"),
            vec![
                (1, "a".to_string(), FileKind::Directory),
                (2, "b".to_string(), FileKind::Directory),
                (3, "f".to_string(), FileKind::File),
                (1, "c".to_string(), FileKind::Directory),
            ]
        );
        assert_eq!(listing(&fs, "/a/b"), vec![(1, "f".to_string(), FileKind::File)]);
        assert!(listing(&fs, "/c").is_empty());
        assert!(matches!(fs.list("/a/b/f"), Err(FsError::NotADirectory)));
        assert!(matches!(fs.list("/zz"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_dropped_listing_releases_locks() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/f", FileKind::File).unwrap();

        let mut list = fs.list("/").unwrap();
        assert_eq!(list.next().map(|e| e.name), Some("a".to_string()));
        drop(list);
        // Would block forever if any read lock survived
        fs.create("/b", FileKind::File).unwrap();
        fs.delete("/a/f").unwrap();
    }

    #[test]
    fn test_print_tree_full_paths() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/b", FileKind::File).unwrap();
        fs.create("/c", FileKind::File).unwrap();

        let mut out = Vec::new();
        assert_eq!(fs.print_tree(&mut out).unwrap(), 4);
        assert_eq!(String::from_utf8(out).unwrap(), "/\n/a\n/a/b\n/c\n");
    }

    #[test]
    fn test_print_tree_to_file() {
        let fs = create_test_fs();
        fs.create("/docs", FileKind::Directory).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tree.txt");

        fs.print_tree_to(&out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "/\n/docs\n");
        assert!(matches!(
            fs.print_tree_to(&dir.path().join("missing/tree.txt")),
            Err(FsError::Io(_))
        ));
    }

    #[test]
    fn test_shutdown_reports_stats() {
        let fs = create_test_fs();
        fs.create("/a", FileKind::Directory).unwrap();
        fs.create("/a/f", FileKind::File).unwrap();
        let stats = fs.shutdown();
        assert_eq!(stats.capacity, 16);
        assert_eq!(stats.in_use, 3);
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.files, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            FsCore::new(FsConfig::with_capacity(0, 1)),
            Err(FsError::InvalidConfig(_))
        ));
    }
}
