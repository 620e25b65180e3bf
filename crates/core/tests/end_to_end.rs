//! End-to-end transfers over real loopback UDP sockets (spec.md §8
//! "End-to-end scenarios").

use std::sync::mpsc;
use std::time::Duration;

use core::{ClientConfig, Device, Server, ServerConfig, Status};
use protocol::header::MAX_PAYLOAD;

fn fast_server_config() -> ServerConfig {
    ServerConfig::builder()
        .negotiation_wait(Duration::from_secs(1))
        .done_wait(Duration::from_secs(10))
        .build()
}

fn fast_client_config(dir: &std::path::Path) -> ClientConfig {
    ClientConfig::builder()
        .idle_timeout(Duration::from_secs(2))
        .staging_dir(dir.to_path_buf())
        .build()
}

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Scenario 1: a multi-packet file transfers completely and the client
/// callback observes the exact bytes and version.
#[test]
fn transfers_a_multi_packet_file() {
    let dir = tempfile::tempdir().unwrap();
    let contents = vec![0xABu8; 4096];
    let source = write_file(&dir, "source.bin", &contents);

    let client = core::Client::with_config(0, 0, fast_client_config(dir.path())).unwrap();
    let client_port = client.local_addr().unwrap().port();

    let (tx, rx) = mpsc::channel();
    client.attach_handler(move |path, version| {
        let bytes = std::fs::read(path).unwrap();
        tx.send((bytes, version)).unwrap();
    });

    let server = Server::with_config(0, fast_server_config()).unwrap();
    let status = server
        .start_transfer(&format!("127.0.0.1:{client_port}"), &source, 7, Device { id: 0 })
        .unwrap();

    assert_eq!(status, Status::Fin);
    let (received, version) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received, contents);
    assert_eq!(version, 7);
}

/// Scenario 2: a file exactly one packet long still round-trips.
#[test]
fn transfers_a_single_packet_file() {
    let dir = tempfile::tempdir().unwrap();
    let contents = vec![0x42u8; MAX_PAYLOAD];
    let source = write_file(&dir, "source.bin", &contents);

    let client = core::Client::with_config(0, 0, fast_client_config(dir.path())).unwrap();
    let client_port = client.local_addr().unwrap().port();

    let (tx, rx) = mpsc::channel();
    client.attach_handler(move |path, _version| {
        tx.send(std::fs::read(path).unwrap()).unwrap();
    });

    let server = Server::with_config(0, fast_server_config()).unwrap();
    let status = server
        .start_transfer(&format!("127.0.0.1:{client_port}"), &source, 1, Device { id: 0 })
        .unwrap();

    assert_eq!(status, Status::Fin);
    let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received, contents);
}

/// Scenario 3: no client listening at the target port resolves to `NTF`
/// within the negotiation wait window.
#[test]
fn returns_ntf_when_no_client_is_listening() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_file(&dir, "source.bin", b"hello");

    let server = Server::with_config(0, fast_server_config()).unwrap();
    let status = server
        .start_transfer("127.0.0.1:1", &source, 1, Device { id: 0 })
        .unwrap();

    assert_eq!(status, Status::Ntf);
}

/// Scenario 6: a second transfer to the same client IP while one is active
/// is rejected synchronously rather than queued or interleaved.
#[test]
fn duplicate_transaction_to_same_peer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_file(&dir, "source.bin", &vec![0u8; 16 * 1024]);

    let client = core::Client::with_config(0, 0, fast_client_config(dir.path())).unwrap();
    let client_port = client.local_addr().unwrap().port();
    let client_uri = format!("127.0.0.1:{client_port}");

    let server = std::sync::Arc::new(Server::with_config(0, fast_server_config()).unwrap());
    let first = {
        let server = std::sync::Arc::clone(&server);
        let source = source.clone();
        let client_uri = client_uri.clone();
        std::thread::spawn(move || server.start_transfer(&client_uri, &source, 1, Device { id: 0 }))
    };

    std::thread::sleep(Duration::from_millis(20));
    let second = server.start_transfer(&client_uri, &source, 1, Device { id: 0 });
    assert!(matches!(second, Err(core::TransferError::DuplicateTransaction(_))));

    first.join().unwrap().unwrap();
}
