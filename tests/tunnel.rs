//! End-to-end tunnel tests over loopback TCP.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use aohttp::app::{Acceptor, Initiator};
use aohttp::config::{ClientConfig, ServerConfig};
use aohttp::{Address, Error};

fn socket(addr: Address) -> SocketAddr {
    match addr {
        Address::Socket(addr) => addr,
        other => panic!("expected a socket address, got {}", other),
    }
}

/// A port nothing listens on
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start an acceptor bridging to `backend_port`; returns its address
async fn start_acceptor(backend_port: u16) -> SocketAddr {
    let config = ServerConfig {
        bind_address: "127.0.0.1".into(),
        bind_port: 0,
        target_port: backend_port,
        ..Default::default()
    };
    let acceptor = Acceptor::bind(&config).await.unwrap();
    let addr = socket(acceptor.local_addr().unwrap());
    tokio::spawn(acceptor.run());
    addr
}

fn client_config(port: u16) -> ClientConfig {
    ClientConfig {
        listen: "127.0.0.1".into(),
        listen_port: 0,
        target: "127.0.0.1".into(),
        port,
        ..Default::default()
    }
}

async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_tunnel_carries_bytes_both_ways() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_port = backend.local_addr().unwrap().port();
    let backend_task = tokio::spawn(async move {
        let (mut stream, _) = backend.accept().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        stream.write_all(b"reply from backend").await.unwrap();
        received
    });

    let acceptor = start_acceptor(backend_port).await;

    let initiator = Initiator::new(client_config(acceptor.port())).unwrap();
    let listener = initiator.bind().await.unwrap();
    let local = socket(listener.local_addr().unwrap());
    let tunnel = tokio::spawn(async move { initiator.run_with(listener.as_ref()).await });

    let mut app = TcpStream::connect(local).await.unwrap();
    app.write_all(b"hello through the tunnel").await.unwrap();
    app.shutdown().await.unwrap();

    let mut reply = Vec::new();
    app.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"reply from backend");
    assert_eq!(backend_task.await.unwrap(), b"hello through the tunnel");

    let stats = tunnel.await.unwrap().unwrap();
    assert_eq!(stats.upload, 24);
    assert_eq!(stats.download, 18);
}

#[tokio::test]
async fn test_unknown_path_gets_404_and_listener_survives() {
    let acceptor = start_acceptor(closed_port().await).await;
    let request = b"GET /other HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: aohttp\r\nHost: localhost\r\n\r\n";

    for _ in 0..3 {
        let response = raw_exchange(acceptor, request).await;
        assert_eq!(response, b"HTTP/1.1 404 Not found\r\n\r\n");
    }
}

#[tokio::test]
async fn test_missing_upgrade_gets_426() {
    let acceptor = start_acceptor(closed_port().await).await;
    let response = raw_exchange(acceptor, b"GET /aohttp HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert_eq!(response, b"HTTP/1.1 426 Upgrade required\r\n\r\n");
}

#[tokio::test]
async fn test_initiator_times_out_without_response() {
    let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent_port = silent.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut stream, _) = silent.accept().await.unwrap();
        // Swallow the request and never answer
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink).await;
    });

    let config = ClientConfig {
        response_timeout_secs: 1,
        ..client_config(silent_port)
    };
    let initiator = Initiator::new(config).unwrap();
    let listener = initiator.bind().await.unwrap();
    let local = socket(listener.local_addr().unwrap());
    let tunnel = tokio::spawn(async move { initiator.run_with(listener.as_ref()).await });

    let mut app = TcpStream::connect(local).await.unwrap();
    app.write_all(b"never relayed").await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), tunnel)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::ReadTimeout(_)));

    // The local connection is closed without any bytes coming back
    let mut received = Vec::new();
    let _ = app.read_to_end(&mut received).await;
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_backend_down_gets_500() {
    let acceptor = start_acceptor(closed_port().await).await;
    let request = b"GET /aohttp HTTP/1.1\r\nUser-Agent: AoHTTP\r\nConnection: Upgrade\r\nUpgrade: aohttp\r\nHost: localhost\r\n\r\n";

    let response = raw_exchange(acceptor, request).await;
    assert_eq!(response, b"HTTP/1.1 500 Internal server error\r\n\r\n");
}

#[tokio::test]
async fn test_initiator_rejected_by_acceptor() {
    let acceptor = start_acceptor(closed_port().await).await;

    let config = ClientConfig {
        path: "/wrong".into(),
        ..client_config(acceptor.port())
    };
    let initiator = Initiator::new(config).unwrap();
    let listener = initiator.bind().await.unwrap();
    let local = socket(listener.local_addr().unwrap());
    let tunnel = tokio::spawn(async move { initiator.run_with(listener.as_ref()).await });

    let _app = TcpStream::connect(local).await.unwrap();
    let err = tunnel.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::UnexpectedStatus { code: 404, .. }));
    assert!(!err.is_fatal());
}
