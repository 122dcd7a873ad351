//! Domain error types.
//!
//! Each error here maps onto one stable kind in the client-side taxonomy:
//! [`LanguageError`] surfaces as `unknown_language`, [`ConfigError`] as
//! `invalid_argument`, and [`PortError`] as a transport-side adapter failure.

use thiserror::Error;

/// A language string could not be resolved against the closed registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    /// Neither the canonical code nor the primary subtag matched.
    #[error("unknown language: {0:?}")]
    UnknownLanguage(String),
}

/// Caller-supplied configuration is malformed.
///
/// All variants are raised before any network I/O happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Client id or client secret is empty.
    #[error("client credentials must not be empty")]
    MissingCredentials,

    /// A credential environment variable is unset.
    #[error("environment variable {0} is not set")]
    MissingEnvironment(&'static str),

    /// No audio source was configured.
    #[error("a session needs exactly one audio source")]
    MissingSource,

    /// The target list is empty.
    #[error("a session needs at least one translation target")]
    NoTargets,

    /// Two targets share the same sink handle.
    #[error("every translation target needs a distinct sink")]
    DuplicateSink,

    /// The stream format string is not in the supported set for its
    /// direction.
    #[error("unsupported {direction} stream format: {format}")]
    UnsupportedFormat {
        /// `"input"` or `"output"`.
        direction: &'static str,
        format: String,
    },

    /// The sample rate is outside the accepted 16000–48000 Hz window.
    #[error("sample rate {0} outside supported range 16000-48000")]
    SampleRateOutOfRange(u32),

    /// Only mono and stereo streams are accepted.
    #[error("unsupported channel count {0} (expected 1 or 2)")]
    InvalidChannelCount(u8),
}

/// An audio source or sink adapter failed.
///
/// The streaming core treats these as opaque: a source failure ends the
/// input pipeline, a sink failure is logged and skipped (best-effort
/// delivery).
#[derive(Debug, Error)]
pub enum PortError {
    /// Reading from the audio source failed.
    #[error("audio source read failed: {0}")]
    SourceRead(String),

    /// Writing to the audio sink failed.
    #[error("audio sink write failed: {0}")]
    SinkWrite(String),

    /// The adapter's backing transport is gone (channel closed, device
    /// disconnected).
    #[error("audio adapter disconnected: {0}")]
    Disconnected(String),
}
