//! API credentials and the session-scoped credentials derived from them.
//!
//! Both records hold secrets. Their `Debug` impls redact the secret fields so
//! that a stray `{:?}` in a log line can never leak a client secret or a
//! publisher token.

use std::env;
use std::fmt;

use crate::error::ConfigError;

/// Default API base used when the caller does not override it.
pub const DEFAULT_API_BASE: &str = "https://api.parla-rt.com";

/// Environment variable names recognised by [`Credentials::from_env`].
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const ENV_API_URL: &str = "API_URL";

// ── Credentials ───────────────────────────────────────────────────────────────

/// Long-lived API credentials, treated as opaque strings.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    api_base: String,
}

impl Credentials {
    /// Create credentials against the default API base.
    ///
    /// Fails with [`ConfigError::MissingCredentials`] when either string is
    /// empty — before any network traffic can happen.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(Self {
            client_id,
            client_secret,
            api_base: DEFAULT_API_BASE.to_owned(),
        })
    }

    /// Override the API base URL (trailing slashes are trimmed).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    /// Read credentials from `CLIENT_ID`, `CLIENT_SECRET` and (optionally)
    /// `API_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id =
            env::var(ENV_CLIENT_ID).map_err(|_| ConfigError::MissingEnvironment(ENV_CLIENT_ID))?;
        let client_secret = env::var(ENV_CLIENT_SECRET)
            .map_err(|_| ConfigError::MissingEnvironment(ENV_CLIENT_SECRET))?;
        let creds = Self::new(client_id, client_secret)?;
        Ok(match env::var(ENV_API_URL) {
            Ok(url) if !url.trim().is_empty() => creds.with_api_base(url),
            _ => creds,
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// API base URL without a trailing slash.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("api_base", &self.api_base)
            .finish()
    }
}

// ── SessionCredentials ────────────────────────────────────────────────────────

/// Credentials allocated by the server for one session.
///
/// Obtained from the REST handshake and valid until the session is terminated
/// by either side. The publisher token authenticates the control channel and
/// must never appear in logs, not even as part of a composed URL.
#[derive(Clone)]
pub struct SessionCredentials {
    /// Server-side room identifier, when reported.
    pub room_name: Option<String>,
    /// Token authenticating the publisher leg of the control channel.
    pub publisher_token: String,
    /// Optional token for a subscriber leg.
    pub subscriber_token: Option<String>,
    /// Base URL of the control channel (token not yet attached).
    pub control_url: String,
    /// Optional media stream URL.
    pub stream_url: Option<String>,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("room_name", &self.room_name)
            .field("publisher_token", &"***")
            .field(
                "subscriber_token",
                &self.subscriber_token.as_ref().map(|_| "***"),
            )
            .field("control_url", &self.control_url)
            .field("stream_url", &self.stream_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_are_rejected() {
        assert!(matches!(
            Credentials::new("", "secret"),
            Err(ConfigError::MissingCredentials)
        ));
        assert!(matches!(
            Credentials::new("id", "  "),
            Err(ConfigError::MissingCredentials)
        ));
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let creds = Credentials::new("id", "secret")
            .unwrap()
            .with_api_base("https://api.example.com/");
        assert_eq!(creds.api_base(), "https://api.example.com");
    }

    #[test]
    fn debug_never_prints_secrets() {
        let creds = Credentials::new("id", "super-secret").unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("super-secret"));

        let session = SessionCredentials {
            room_name: Some("room-1".to_owned()),
            publisher_token: "tok-abc".to_owned(),
            subscriber_token: Some("tok-def".to_owned()),
            control_url: "wss://stream.example.com/ws".to_owned(),
            stream_url: None,
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("tok-abc"));
        assert!(!rendered.contains("tok-def"));
    }
}
