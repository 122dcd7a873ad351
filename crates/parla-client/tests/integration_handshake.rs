//! The REST session handshake against a canned loopback endpoint.

mod common;

use serde_json::json;

use parla_client::{SessionClient, SessionError};
use parla_core::Credentials;

fn credentials(api_base: String) -> Credentials {
    Credentials::new("it-client", "it-secret")
        .unwrap()
        .with_api_base(api_base)
}

#[tokio::test]
async fn create_session_extracts_credentials() {
    common::init_tracing();

    let api_base = common::spawn_session_endpoint("wss://stream.example.com/ws").await;
    let client = SessionClient::new(credentials(api_base)).unwrap();

    let session = client.create_session().await.unwrap();
    assert_eq!(session.publisher_token, "integration-token");
    assert_eq!(session.room_name.as_deref(), Some("integration-room"));
    assert_eq!(session.control_url, "wss://stream.example.com/ws");
}

#[tokio::test]
async fn server_error_surfaces_title_and_detail() {
    common::init_tracing();

    let api_base = common::spawn_http_endpoint(
        "HTTP/1.1 200 OK",
        json!({
            "ok": false,
            "errors": [{"title": "quota", "detail": "exceeded", "status": 429}],
        }),
    )
    .await;
    let client = SessionClient::new(credentials(api_base)).unwrap();

    let err = client.create_session().await.unwrap_err();
    match err {
        SessionError::SessionCreation { status, message } => {
            assert_eq!(status, 429);
            assert!(message.contains("quota - exceeded"));
        }
        other => panic!("expected SessionCreation, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_error_details_yield_the_fixed_message() {
    common::init_tracing();

    let api_base =
        common::spawn_http_endpoint("HTTP/1.1 500 Internal Server Error", json!({"ok": false}))
            .await;
    let client = SessionClient::new(credentials(api_base)).unwrap();

    let err = client.create_session().await.unwrap_err();
    assert_eq!(err.kind(), "session_creation");
    assert!(err.to_string().contains("no error details provided"));
}
