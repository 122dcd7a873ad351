//! Control channel lifecycle against a loopback peer: reconnects after an
//! unsolicited close, queueing across the gap, terminal handshake
//! rejections, and the exhausted-attempts failure.

mod common;

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use parla_client::{ChannelState, ControlChannel};

#[tokio::test]
async fn unsolicited_close_triggers_reconnect_and_flushes_queued_sends() {
    common::init_tracing();

    let (listener, ws_url) = common::ws_listener().await;
    let channel = ControlChannel::new(&ws_url, "tok", false);

    let server = tokio::spawn(async move {
        // First connection: open, then drop without a goodbye.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);

        // Second connection: report the first frame that arrives.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (_write, mut read) = ws.split();
        while let Some(Ok(message)) = read.next().await {
            if let Message::Text(text) = message {
                return Some(text);
            }
        }
        None
    });

    channel.connect().await.unwrap();

    // Wait until the unsolicited close has been observed, then send while
    // the channel is down. The send must enqueue, not fail.
    let observed = timeout(Duration::from_secs(3), async {
        while channel.state() != ChannelState::Reconnecting {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(observed.is_ok(), "peer close was never observed");

    channel
        .send(&json!({"message_type": "probe", "data": {}}))
        .await
        .unwrap();

    // Reconnect fires after the 1 s delay and flushes the queue in order.
    let delivered = timeout(Duration::from_secs(5), server)
        .await
        .expect("reconnect did not happen in time")
        .unwrap()
        .expect("no frame reached the second connection");
    let frame: serde_json::Value = serde_json::from_str(&delivered).unwrap();
    assert_eq!(frame["message_type"], "probe");

    channel.close(Duration::from_secs(1)).await;
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn handshake_rejected_with_4xx_is_terminal() {
    common::init_tracing();

    // An HTTP endpoint that answers the upgrade request with 403.
    let base = common::spawn_http_endpoint("HTTP/1.1 403 Forbidden", json!({})).await;
    let ws_url = base.replace("http://", "ws://");

    let channel = ControlChannel::new(&ws_url, "tok", false);
    let err = timeout(Duration::from_secs(5), channel.connect())
        .await
        .expect("terminal rejection must not wait out the retry budget")
        .unwrap_err();

    assert_eq!(err.kind(), "authentication");
    assert_eq!(channel.state(), ChannelState::Failed);

    // A failed channel rejects further work.
    let err = channel.send(&json!({"message_type": "x"})).await.unwrap_err();
    assert_eq!(err.kind(), "transport");
}

#[tokio::test]
async fn exhausted_reconnect_attempts_surface_transport() {
    common::init_tracing();

    // Allocate a port, then free it so every connect is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let channel = ControlChannel::new(&format!("ws://{addr}/ws"), "tok", false);
    let err = timeout(Duration::from_secs(30), channel.connect())
        .await
        .expect("attempt budget must be finite")
        .unwrap_err();

    assert_eq!(err.kind(), "transport");
    assert_eq!(channel.state(), ChannelState::Failed);
}
