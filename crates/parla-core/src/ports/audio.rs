//! `AudioSource` and `AudioSink` trait abstractions for session audio I/O.
//!
//! These traits decouple the streaming pipelines from any specific audio
//! backend. A source might wrap a capture device, a WAV reader, or an
//! in-process channel; a sink might wrap a playback device, a file writer,
//! or a network relay. The session core neither knows nor cares.
//!
//! Both traits are **object-safe** (`Arc<dyn AudioSource>` /
//! `Arc<dyn AudioSink>`). All methods take `&self`; implementations use
//! interior mutability (channels, atomic flags) for their state.
//!
//! ## Byte contract
//!
//! Sources produce and sinks consume raw PCM, signed 16-bit little-endian,
//! mono, at 48 kHz. Rate conversion to the 24 kHz wire format happens inside
//! the session core, never in an adapter.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::PortError;

// ── AudioSource ───────────────────────────────────────────────────────────────

/// Abstraction over an audio input (the capture side of a session).
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Read the next chunk of 48 kHz PCM16LE mono audio.
    ///
    /// Returns `Ok(None)` at end-of-stream and `Ok(Some(chunk))` otherwise.
    /// An **empty** chunk means "no data available yet, poll again" — it is
    /// not an end-of-stream marker.
    async fn read(&self) -> Result<Option<Bytes>, PortError>;

    /// Release the underlying resource. Idempotent.
    async fn close(&self);

    /// Whether the source can currently produce data.
    fn ready(&self) -> bool;
}

// ── AudioSink ─────────────────────────────────────────────────────────────────

/// Abstraction over an audio output (the playback side of a session).
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Deliver a chunk of 48 kHz PCM16LE mono audio.
    async fn write(&self, chunk: Bytes) -> Result<(), PortError>;

    /// Release the underlying resource. Idempotent.
    async fn close(&self);

    /// Whether the sink can currently accept data.
    fn ready(&self) -> bool;
}
