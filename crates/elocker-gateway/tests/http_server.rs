//! HTTP over a real loopback socket.

use elocker_core::Thresholds;
use elocker_gateway::http::serve;
use elocker_gateway::link::Link;
use elocker_gateway::lock::LockController;
use elocker_gateway::store::ThresholdStore;
use elocker_gateway::{Gateway, GatewayState};
use elocker_protocol::DeviceReading;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_server(dir: &TempDir) -> (SocketAddr, Arc<Gateway>) {
    // no lock commands are expected; the device side may go away
    let (link, _device) = Link::pair(8);

    let state = Arc::new(GatewayState::new(Thresholds::default(), false));
    let store = ThresholdStore::new(dir.path().join("store.json"));
    let lock = LockController::new(link.writer, 0, Duration::ZERO);
    let gateway = Arc::new(Gateway::new(state, store, lock, None));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, gateway.clone()));
    (addr, gateway)
}

async fn post(addr: SocketAddr, path: &str, body: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response[9..12].parse().unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn test_get_status_over_socket() {
    let dir = TempDir::new().unwrap();
    let (addr, gateway) = start_server(&dir).await;
    gateway
        .ingest_readings(&[DeviceReading::new(7, 310, 5)])
        .await;

    let (status, body) = post(addr, "/getStatus", "").await;
    assert_eq!(status, 200);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["results"][0]["id"], 7);
    assert_eq!(json["results"][0]["V"], 5);
    assert_eq!(json["results"][0]["status"], "charging");
}

#[tokio::test]
async fn test_set_threshold_over_socket() {
    let dir = TempDir::new().unwrap();
    let (addr, gateway) = start_server(&dir).await;

    let (status, body) = post(
        addr,
        "/setThreshold",
        r#"{"fullcharged": 320, "notcharged": 110}"#,
    )
    .await;
    assert_eq!(status, 200);
    assert!(body.contains("Full Charged: 320(mA), Not Charged: 110(mA)"));
    assert_eq!(gateway.state().thresholds().notcharged_ma, 110.0);

    let (status, body) = post(addr, "/setThreshold", "{oops").await;
    assert_eq!(status, 400);
    assert_eq!(body, "Invalid JSON");
}

#[tokio::test]
async fn test_unknown_path_over_socket() {
    let dir = TempDir::new().unwrap();
    let (addr, _gateway) = start_server(&dir).await;

    let (status, body) = post(addr, "/reboot", "{}").await;
    assert_eq!(status, 404);
    assert_eq!(body, "Not found");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let dir = TempDir::new().unwrap();
    let (addr, _gateway) = start_server(&dir).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /unlock HTTP/1.1\r\nContent-Length: 100000\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 413"));
}

#[tokio::test]
async fn test_oversized_request_line_rejected() {
    let dir = TempDir::new().unwrap();
    let (addr, _gateway) = start_server(&dir).await;

    // 8 KiB without a line ending
    let mut request = b"GET /".to_vec();
    request.resize(8 * 1024, b'a');

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&request).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 413"));
}

#[tokio::test]
async fn test_header_flood_rejected() {
    let dir = TempDir::new().unwrap();
    let (addr, _gateway) = start_server(&dir).await;

    let mut request = b"GET /status HTTP/1.1\r\n".to_vec();
    while request.len() < 8 * 1024 {
        request.extend_from_slice(b"X-Filler: aaaaaaaaaaaaaaaa\r\n");
    }
    request.truncate(8 * 1024);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&request).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 413"));
}
