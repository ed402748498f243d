//! Integration tests for the portal server.
//!
//! These tests start a real server, drive it with network events and talk to
//! it over TCP.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use devcfg_core::{Entry, EntryType, MemoryBackend, Namespace, Registry, Setting};
use devcfg_portal::{DeviceControl, Portal, PortalConfig};
use devcfg_server::{NetworkEvent, PortalServer, ServerConfig, ServerError, ServerEvent};
use devcfg_web::{create_router, WebState};

#[derive(Default)]
struct CountingControl(AtomicUsize);

impl DeviceControl for CountingControl {
    fn restart(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Find an available port for testing.
async fn find_available_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a test server and return the address, event sender and the port
/// setting it serves.
async fn start_test_server() -> (
    SocketAddr,
    tokio::sync::mpsc::Sender<ServerEvent>,
    tokio::task::JoinHandle<()>,
    Setting<u16>,
) {
    let addr = find_available_port().await;

    let mut registry = Registry::init(Arc::new(MemoryBackend::new())).unwrap();
    let id = registry
        .register_namespace(Namespace::new("net", "Network", 2))
        .unwrap();
    let port = Setting::new(80u16);
    registry
        .register_entry(id, Entry::new("port", "Port", EntryType::U16, port.clone(), 80u16))
        .unwrap();

    let portal = Portal::new(registry.into_shared(), PortalConfig::default());
    let state = WebState::new(portal, Arc::new(CountingControl::default()));
    let server = PortalServer::new(ServerConfig { bind_addr: addr }, create_router(state));
    let event_tx = server.event_sender();

    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, event_tx, handle, port)
}

/// Send a GET request and return the raw HTTP response.
async fn http_get(addr: SocketAddr, target: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}

/// Retry until the server answers, or give up after a second.
async fn wait_for_server(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server at {addr} did not come up");
}

#[tokio::test]
async fn test_not_listening_before_network_is_up() {
    let (addr, event_tx, handle, _) = start_test_server().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(TcpStream::connect(addr).await.is_err());

    event_tx.send(ServerEvent::Shutdown).await.unwrap();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_serves_portal_after_got_ip() {
    let (addr, event_tx, handle, port) = start_test_server().await;

    event_tx
        .send(NetworkEvent::StationGotIp.into())
        .await
        .unwrap();
    wait_for_server(addr).await;

    let response = http_get(addr, "/setup?namespace=net&port=8080").await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.to_ascii_lowercase().contains("cache-control: no-cache"));
    assert_eq!(port.get(), 8080);

    let response = http_get(addr, "/get?namespace=net&entry=port").await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("\r\n\r\n8080"));

    event_tx.send(ServerEvent::Shutdown).await.unwrap();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stops_when_link_is_lost() {
    let (addr, event_tx, handle, _) = start_test_server().await;

    event_tx
        .send(NetworkEvent::AccessPointStarted.into())
        .await
        .unwrap();
    wait_for_server(addr).await;

    event_tx
        .send(NetworkEvent::AccessPointStopped.into())
        .await
        .unwrap();

    let mut refused = false;
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refused, "portal still listening after AP stopped");

    event_tx.send(ServerEvent::Shutdown).await.unwrap();
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_returned() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();

    let registry = Registry::init(Arc::new(MemoryBackend::new())).unwrap();
    let portal = Portal::new(registry.into_shared(), PortalConfig::default());
    let state = WebState::new(portal, Arc::new(CountingControl::default()));
    let server = PortalServer::new(ServerConfig { bind_addr: addr }, create_router(state));
    let event_tx = server.event_sender();
    let handle = tokio::spawn(server.run());

    event_tx
        .send(NetworkEvent::StationGotIp.into())
        .await
        .unwrap();
    let result = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    match result {
        Err(ServerError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
        other => panic!("expected bind error, got {other:?}"),
    }
    drop(taken);
}
