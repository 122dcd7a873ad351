//! Session error taxonomy.
//!
//! Every failure the client can surface maps onto one of these variants.
//! [`SessionError::kind`] returns the stable label that goes into log lines;
//! details stay in the variant payloads. Token values and tokenised URLs are
//! never embedded in error messages.

use thiserror::Error;

use parla_core::error::{ConfigError, LanguageError};

/// Errors surfaced by a translation session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Caller-supplied configuration is malformed. Raised before any
    /// network I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ConfigError),

    /// The REST handshake was rejected.
    #[error("session creation failed (status {status}): {message}")]
    SessionCreation {
        /// HTTP status, or the server-reported error status when present.
        status: u16,
        /// `"{title} - {detail}"` of the first server error, or
        /// `"no error details provided"`.
        message: String,
    },

    /// Credentials or token were rejected (HTTP 401/403).
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// The control channel is gone: open failed after exhausted reconnects,
    /// or a send hit a closed channel.
    #[error("transport failed: {0}")]
    Transport(String),

    /// A frame could not be decoded (JSON parse, base64, missing field).
    /// Recovered locally — never terminates a session by itself.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A language tag was not in the closed registry.
    #[error(transparent)]
    UnknownLanguage(#[from] LanguageError),

    /// The outbound queue stayed saturated past the grace period.
    #[error("outbound queue saturated")]
    Backpressure,

    /// The caller requested cancellation. Expected, but surfaced so the
    /// caller can tell a cancelled run from a completed one.
    #[error("session cancelled")]
    Cancelled,

    /// The overall deadline elapsed before completion.
    #[error("session deadline elapsed")]
    Timeout,
}

impl SessionError {
    /// Stable kind label for structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::SessionCreation { .. } => "session_creation",
            Self::Authentication(_) => "authentication",
            Self::Transport(_) => "transport",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::UnknownLanguage(_) => "unknown_language",
            Self::Backpressure => "backpressure",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }

    /// Whether the error is an expected terminal outcome rather than a
    /// fault (cancellation, deadline).
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(SessionError::Backpressure.kind(), "backpressure");
        assert_eq!(SessionError::Cancelled.kind(), "cancelled");
        assert_eq!(
            SessionError::SessionCreation {
                status: 429,
                message: "quota - exceeded".to_owned(),
            }
            .kind(),
            "session_creation"
        );
    }

    #[test]
    fn config_errors_convert_to_invalid_argument() {
        let err: SessionError = ConfigError::NoTargets.into();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn cancellation_and_timeout_are_expected() {
        assert!(SessionError::Cancelled.is_expected());
        assert!(SessionError::Timeout.is_expected());
        assert!(!SessionError::Backpressure.is_expected());
    }
}
