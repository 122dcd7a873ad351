//! Shared helpers for the integration tests: a loopback WebSocket listener
//! standing in for the translation service's control channel, and a canned
//! HTTP endpoint standing in for the session-allocation REST API.

#![allow(dead_code)] // not every test binary uses every helper

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Install a test subscriber so `RUST_LOG` works inside tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Bind a loopback listener and return it with its `ws://` URL.
pub async fn ws_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{addr}/ws"))
}

/// Spawn an HTTP endpoint that answers every request with the given status
/// line and JSON body. Returns the `http://` base URL.
pub async fn spawn_http_endpoint(status_line: &'static str, body: serde_json::Value) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = body.to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let body = body.clone();
            tokio::spawn(async move {
                read_http_request(&mut stream).await;
                let response = format!(
                    "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Spawn the session-allocation endpoint, answering with credentials that
/// point the control channel at `control_url`.
pub async fn spawn_session_endpoint(control_url: &str) -> String {
    spawn_http_endpoint(
        "HTTP/1.1 200 OK",
        serde_json::json!({
            "ok": true,
            "data": {
                "publisher": "integration-token",
                "room_name": "integration-room",
                "ws_url": control_url,
            }
        }),
    )
    .await
}

/// Runtime tuning with the protocol waits shrunk so the suite stays fast.
pub fn fast_tuning() -> parla_client::RuntimeTuning {
    parla_client::RuntimeTuning {
        connect_timeout: std::time::Duration::from_secs(5),
        provisioning_delay: std::time::Duration::ZERO,
        quiescence_window: std::time::Duration::from_millis(200),
        max_drain_wait: std::time::Duration::from_secs(3),
        progress_interval: std::time::Duration::from_secs(1),
        trailing_drain: std::time::Duration::from_millis(100),
        close_grace: std::time::Duration::from_secs(1),
        cancel_close_grace: std::time::Duration::from_secs(2),
    }
}

/// Read one HTTP request: headers, then as much of the body as
/// `Content-Length` announces.
async fn read_http_request(stream: &mut tokio::net::TcpStream) {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0_u8; 1024];
    let mut header_end = None;

    while header_end.is_none() {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        header_end = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    }

    let header_end = header_end.unwrap();
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut remaining = (header_end + content_length).saturating_sub(buf.len());
    while remaining > 0 {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        remaining = remaining.saturating_sub(n);
    }
}
