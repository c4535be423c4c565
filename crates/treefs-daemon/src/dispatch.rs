// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mapping of protocol commands onto namespace operations

use std::path::Path;

use tracing::debug;
use treefs_core::{FileKind, FsCore, FsResult};
use treefs_proto::{Command, Status};

/// Operations the daemon serves
#[cfg_attr(test, mockall::automock)]
pub trait Namespace: Send + Sync {
    fn create(&self, path: &str, kind: FileKind) -> FsResult<()>;
    fn delete(&self, path: &str) -> FsResult<()>;
    /// Node index of `path`
    fn lookup(&self, path: &str) -> FsResult<u32>;
    fn rename(&self, src: &str, dest: &str) -> FsResult<()>;
    /// Write the whole tree to `output`, returning the number of lines
    fn print(&self, output: &Path) -> FsResult<usize>;
}

impl Namespace for FsCore {
    fn create(&self, path: &str, kind: FileKind) -> FsResult<()> {
        FsCore::create(self, path, kind)
    }

    fn delete(&self, path: &str) -> FsResult<()> {
        FsCore::delete(self, path)
    }

    fn lookup(&self, path: &str) -> FsResult<u32> {
        FsCore::lookup(self, path).map(|id| id.index())
    }

    fn rename(&self, src: &str, dest: &str) -> FsResult<()> {
        self.move_node(src, dest)
    }

    fn print(&self, output: &Path) -> FsResult<usize> {
        self.print_tree_to(output)
    }
}

/// Run exactly one namespace operation for `command`
pub fn dispatch(ns: &dyn Namespace, command: &Command) -> Status {
    let result = match command {
        Command::Create { path, kind } => ns.create(path, *kind).map(|()| 0),
        Command::Delete { path } => ns.delete(path).map(|()| 0),
        Command::Lookup { path } => ns.lookup(path),
        Command::Move { src, dest } => ns.rename(src, dest).map(|()| 0),
        Command::Print { output } => ns.print(output).map(|_| 0),
    };
    match result {
        Ok(value) => Status::ok(value),
        Err(err) => {
            debug!(op = command.op_name(), command = %command, error = %err, "command failed");
            Status::error(err.code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use treefs_core::FsError;
    use treefs_proto::ErrorCode;

    #[test]
    fn test_lookup_returns_node_index() {
        let mut ns = MockNamespace::new();
        ns.expect_lookup().with(eq("/a/b")).times(1).returning(|_| Ok(7));

        let status = dispatch(&ns, &Command::lookup("/a/b"));
        assert_eq!(status, Status::ok(7));
    }

    #[test]
    fn test_mutations_return_zero() {
        let mut ns = MockNamespace::new();
        ns.expect_create()
            .with(eq("/d"), eq(FileKind::Directory))
            .times(1)
            .returning(|_, _| Ok(()));
        ns.expect_delete().with(eq("/d")).times(1).returning(|_| Ok(()));
        ns.expect_rename().with(eq("/x"), eq("/y")).times(1).returning(|_, _| Ok(()));
        ns.expect_print().times(1).returning(|_| Ok(12));

        assert_eq!(dispatch(&ns, &Command::create("/d", FileKind::Directory)), Status::OK);
        assert_eq!(dispatch(&ns, &Command::delete("/d")), Status::OK);
        assert_eq!(dispatch(&ns, &Command::rename("/x", "/y")), Status::OK);
        assert_eq!(dispatch(&ns, &Command::print("/tmp/out")), Status::OK);
    }

    #[test]
    fn test_errors_become_negative_codes() {
        let mut ns = MockNamespace::new();
        ns.expect_delete().returning(|_| Err(FsError::DirectoryNotEmpty));
        ns.expect_rename().returning(|_, _| Err(FsError::SelfOrAncestorConflict));

        assert_eq!(
            dispatch(&ns, &Command::delete("/a")).error_code(),
            Some(ErrorCode::DirectoryNotEmpty)
        );
        assert_eq!(
            dispatch(&ns, &Command::rename("/a", "/a/b")).error_code(),
            Some(ErrorCode::SelfOrAncestorConflict)
        );
    }

    #[test]
    fn test_real_core_round_trip() {
        let core = FsCore::new(Default::default()).unwrap();
        assert!(dispatch(&core, &Command::create("/a", FileKind::Directory)).is_ok());
        let status = dispatch(&core, &Command::lookup("/a"));
        assert_eq!(status, Status::ok(1));
        assert_eq!(
            dispatch(&core, &Command::lookup("/zz")).error_code(),
            Some(ErrorCode::NotFound)
        );
    }
}
