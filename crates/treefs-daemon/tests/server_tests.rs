// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Datagram round trips against a live server

use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use treefs_client::{ClientConfig, TfsClient};
use treefs_core::{FsConfig, FsCore};
use treefs_daemon::{Server, ServerConfig, ServerHandle};
use treefs_proto::{ErrorCode, FileKind, Status};

fn start_server(dir: &TempDir, threads: usize) -> (Arc<FsCore>, ServerHandle) {
    let core = Arc::new(FsCore::new(FsConfig::default()).unwrap());
    let config = ServerConfig {
        recv_timeout_ms: 20,
        ..ServerConfig::default()
    };
    let server = Server::bind(dir.path().join("daemon.sock"), core.clone(), config).unwrap();
    let handle = server.spawn(threads).unwrap();
    (core, handle)
}

fn connect(dir: &TempDir, server: &Path) -> TfsClient {
    let config = ClientConfig::builder(server)
        .socket_dir(dir.path())
        .read_timeout(Some(Duration::from_secs(5)))
        .build()
        .unwrap();
    TfsClient::connect(&config).unwrap()
}

#[test]
fn test_client_session() {
    let dir = TempDir::new().unwrap();
    let (core, handle) = start_server(&dir, 2);
    let client = connect(&dir, handle.socket_path());

    assert_eq!(client.create("/a", FileKind::Directory).unwrap(), Status::OK);
    assert_eq!(client.create("/a/b", FileKind::File).unwrap(), Status::OK);
    assert_eq!(
        client.create("/a/b", FileKind::File).unwrap().error_code(),
        Some(ErrorCode::AlreadyExists)
    );

    let index = client.lookup("/a/b").unwrap().value().unwrap();
    assert_eq!(core.lookup("/a/b").unwrap().index(), index);
    assert_eq!(client.lookup("/x").unwrap().error_code(), Some(ErrorCode::NotFound));

    assert_eq!(client.rename("/a/b", "/c").unwrap(), Status::OK);
    assert_eq!(
        client.rename("/a", "/a/z").unwrap().error_code(),
        Some(ErrorCode::SelfOrAncestorConflict)
    );
    assert_eq!(
        client.delete("/c/d").unwrap().error_code(),
        Some(ErrorCode::NotADirectory)
    );

    let output = dir.path().join("tree.txt");
    assert_eq!(client.print(&output).unwrap(), Status::OK);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "/\n/a\n/c\n");

    let socket = handle.socket_path().to_path_buf();
    drop(client);
    assert_eq!(handle.shutdown(), 9);
    assert!(!socket.exists());
}

#[test]
fn test_garbage_gets_invalid_command() {
    let dir = TempDir::new().unwrap();
    let (_core, handle) = start_server(&dir, 1);

    let raw_path = dir.path().join("raw.sock");
    let raw = UnixDatagram::bind(&raw_path).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut reply = [0u8; 4];

    for request in [&b"x /a"[..], b"c /a", b"", &[0xff, 0x00, 0x41]] {
        raw.send_to(request, handle.socket_path()).unwrap();
        let len = raw.recv(&mut reply).unwrap();
        let status = Status::from_bytes(&reply[..len]).unwrap();
        assert_eq!(status.error_code(), Some(ErrorCode::InvalidCommand));
    }

    // Still serving afterwards
    let client = connect(&dir, handle.socket_path());
    assert_eq!(client.create("/ok", FileKind::File).unwrap(), Status::OK);
}

#[test]
fn test_overlong_path_rejected() {
    let dir = TempDir::new().unwrap();
    let (core, handle) = start_server(&dir, 1);
    let client = connect(&dir, handle.socket_path());

    let long = format!("/{}", "n".repeat(200));
    assert_eq!(
        client.create(&long, FileKind::File).unwrap().error_code(),
        Some(ErrorCode::NameTooLong)
    );
    assert_eq!(core.stats().in_use, 1);
}

#[test]
fn test_concurrent_clients() {
    let dir = TempDir::new().unwrap();
    let (core, handle) = start_server(&dir, 4);
    let socket = handle.socket_path().to_path_buf();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let socket = socket.clone();
            let socket_dir = dir.path().to_path_buf();
            thread::spawn(move || {
                let config = ClientConfig::builder(socket)
                    .socket_dir(socket_dir)
                    .build()
                    .unwrap();
                let client = TfsClient::connect(&config).unwrap();
                let base = format!("/t{}", t);
                assert_eq!(client.create(&base, FileKind::Directory).unwrap(), Status::OK);
                for i in 0..5 {
                    let path = format!("{}/f{}", base, i);
                    assert_eq!(client.create(&path, FileKind::File).unwrap(), Status::OK);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let stats = core.stats();
    assert_eq!(stats.in_use, 1 + 4 * 6);
    assert_eq!(stats.directories, 1 + 4);
    for t in 0..4 {
        for i in 0..5 {
            assert!(core.lookup(&format!("/t{}/f{}", t, i)).is_ok());
        }
    }
    assert_eq!(handle.shutdown(), 24);
}
