//! Session acquisition over the authenticated REST handshake.
//!
//! One POST allocates one server-side session and returns the credentials
//! the control channel needs. There is no retry at this layer: every call
//! allocates a fresh session, so the caller decides whether a failure is
//! worth a second allocation.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use parla_core::credentials::{Credentials, SessionCredentials};

use crate::error::SessionError;

/// Connect timeout for the handshake request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of the session allocation endpoint, relative to the API base.
const SESSION_PATH: &str = "/session-storage/session";

/// REST client that allocates sessions.
pub struct SessionClient {
    http: reqwest::Client,
    credentials: Credentials,
}

impl SessionClient {
    /// Build a client around the given credentials.
    pub fn new(credentials: Credentials) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SessionError::Transport(format!("http client construction: {e}")))?;
        Ok(Self { http, credentials })
    }

    /// Allocate a session with the default shape: one publisher, no
    /// subscribers.
    pub async fn create_session(&self) -> Result<SessionCredentials, SessionError> {
        self.create_session_with(1, 0).await
    }

    /// Allocate a session with an explicit subscriber count.
    ///
    /// The server always allocates exactly one publisher per session;
    /// `publisher_count` is accepted for interface symmetry but does not
    /// travel on the wire.
    pub async fn create_session_with(
        &self,
        _publisher_count: u32,
        subscriber_count: u32,
    ) -> Result<SessionCredentials, SessionError> {
        let url = format!("{}{SESSION_PATH}", self.credentials.api_base());
        debug!(subscriber_count, "Allocating translation session");

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("ClientId", self.credentials.client_id())
            .header("ClientSecret", self.credentials.client_secret())
            .json(&serde_json::json!({
                "data": {
                    "subscriber_count": subscriber_count,
                    "publisher_can_subscribe": true,
                }
            }))
            .send()
            .await
            .map_err(|e| SessionError::Transport(format!("session handshake: {e}")))?;

        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .map_err(|e| SessionError::MalformedFrame(format!("session response body: {e}")))?;

        let creds = parse_session_response(status, &body)?;
        info!(room = ?creds.room_name, "Session allocated");
        Ok(creds)
    }
}

/// Interpret the handshake response envelope.
///
/// `{ok: true, data: {…}}` yields credentials; anything else is a
/// [`SessionError::SessionCreation`] (or [`SessionError::Authentication`]
/// for 401/403) carrying the first server-reported error.
pub(crate) fn parse_session_response(
    http_status: u16,
    body: &Value,
) -> Result<SessionCredentials, SessionError> {
    let ok = body["ok"].as_bool().unwrap_or(false);
    let data = &body["data"];

    if ok && data.is_object() {
        let publisher_token = data["publisher"]
            .as_str()
            .ok_or_else(|| SessionError::SessionCreation {
                status: http_status,
                message: "session response missing publisher token".to_owned(),
            })?
            .to_owned();

        // Later aliases take precedence over their webrtc_-prefixed forms.
        let control_url = pick_alias(data, &["ws_url", "control_url"])
            .ok_or_else(|| SessionError::SessionCreation {
                status: http_status,
                message: "session response missing control URL".to_owned(),
            })?;
        let room_name = pick_alias(data, &["webrtc_room_name", "room_name"]);
        let stream_url = pick_alias(data, &["webrtc_url", "stream_url"]);

        return Ok(SessionCredentials {
            room_name,
            publisher_token,
            subscriber_token: data["subscriber"].as_str().map(str::to_owned),
            control_url,
            stream_url,
        });
    }

    let (status, message) = first_error(http_status, body);
    if matches!(status, 401 | 403) {
        return Err(SessionError::Authentication(message));
    }
    Err(SessionError::SessionCreation { status, message })
}

/// Return the last present alias from `keys`, so later names win.
fn pick_alias(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .rev()
        .find_map(|k| data[*k].as_str())
        .map(str::to_owned)
}

/// Extract `(status, "title - detail")` from the first entry of the errors
/// array, falling back to the HTTP status and a fixed message.
fn first_error(http_status: u16, body: &Value) -> (u16, String) {
    let Some(first) = body["errors"].as_array().and_then(|a| a.first()) else {
        return (http_status, "no error details provided".to_owned());
    };

    let status = first["status"]
        .as_u64()
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(http_status);
    let title = first["title"].as_str().unwrap_or("unknown error");
    let detail = first["detail"].as_str().unwrap_or("");
    let message = if detail.is_empty() {
        title.to_owned()
    } else {
        format!("{title} - {detail}")
    };
    (status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_yields_credentials() {
        let body = serde_json::json!({
            "ok": true,
            "data": {
                "publisher": "pub-token",
                "subscriber": "sub-token",
                "room_name": "room-7",
                "ws_url": "wss://stream.example.com/ws",
            }
        });
        let creds = parse_session_response(200, &body).unwrap();
        assert_eq!(creds.publisher_token, "pub-token");
        assert_eq!(creds.subscriber_token.as_deref(), Some("sub-token"));
        assert_eq!(creds.room_name.as_deref(), Some("room-7"));
        assert_eq!(creds.control_url, "wss://stream.example.com/ws");
        assert!(creds.stream_url.is_none());
    }

    #[test]
    fn later_aliases_take_precedence() {
        let body = serde_json::json!({
            "ok": true,
            "data": {
                "publisher": "p",
                "webrtc_room_name": "legacy",
                "room_name": "current",
                "webrtc_url": "wss://legacy.example.com",
                "ws_url": "wss://legacy-ws.example.com",
                "control_url": "wss://current.example.com/ws",
                "stream_url": "https://media.example.com",
            }
        });
        let creds = parse_session_response(200, &body).unwrap();
        assert_eq!(creds.room_name.as_deref(), Some("current"));
        assert_eq!(creds.control_url, "wss://current.example.com/ws");
        assert_eq!(creds.stream_url.as_deref(), Some("https://media.example.com"));
    }

    #[test]
    fn server_error_carries_title_and_detail() {
        let body = serde_json::json!({
            "ok": false,
            "errors": [
                {"title": "quota", "detail": "exceeded", "status": 429},
                {"title": "second", "detail": "ignored"},
            ]
        });
        let err = parse_session_response(200, &body).unwrap_err();
        match err {
            SessionError::SessionCreation { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "quota - exceeded");
            }
            other => panic!("expected SessionCreation, got {other:?}"),
        }
    }

    #[test]
    fn missing_error_array_yields_fixed_message() {
        let body = serde_json::json!({"ok": false});
        let err = parse_session_response(500, &body).unwrap_err();
        match err {
            SessionError::SessionCreation { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "no error details provided");
            }
            other => panic!("expected SessionCreation, got {other:?}"),
        }
    }

    #[test]
    fn empty_error_array_yields_fixed_message() {
        let body = serde_json::json!({"ok": false, "errors": []});
        let err = parse_session_response(502, &body).unwrap_err();
        assert_eq!(err.kind(), "session_creation");
        assert!(err.to_string().contains("no error details provided"));
    }

    #[test]
    fn unauthorized_maps_to_authentication() {
        let body = serde_json::json!({
            "ok": false,
            "errors": [{"title": "unauthorized", "detail": "bad secret", "status": 401}]
        });
        let err = parse_session_response(401, &body).unwrap_err();
        assert_eq!(err.kind(), "authentication");
    }

    #[test]
    fn ok_without_data_is_a_creation_failure() {
        let body = serde_json::json!({"ok": true});
        let err = parse_session_response(200, &body).unwrap_err();
        assert_eq!(err.kind(), "session_creation");
    }

    #[test]
    fn missing_publisher_is_a_creation_failure() {
        let body = serde_json::json!({
            "ok": true,
            "data": {"ws_url": "wss://stream.example.com/ws"}
        });
        let err = parse_session_response(200, &body).unwrap_err();
        assert!(err.to_string().contains("publisher"));
    }
}
