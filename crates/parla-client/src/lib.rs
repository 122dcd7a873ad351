//! Real-time speech-to-speech translation client.
//!
//! The crate wires one authenticated session end to end: a REST handshake
//! allocates the session, a persistent control channel carries typed JSON
//! messages (including base64 audio), and two pipelines stream audio
//! concurrently — capture→resample→encode→send and
//! receive→decode→resample→sink — under the [`SessionRuntime`]'s lifecycle
//! rules (pacing, backpressure, reconnects, draining, cooperative
//! cancellation).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use parla_client::adapters::{ChannelSink, ChannelSource};
//! use parla_client::{SessionRuntime, DEFAULT_CAPACITY};
//! use parla_core::{Credentials, Language, SessionConfig};
//!
//! # async fn demo() -> Result<(), parla_client::SessionError> {
//! let (source, audio_in) = ChannelSource::new(DEFAULT_CAPACITY);
//! let (sink, translated_out) = ChannelSink::new(DEFAULT_CAPACITY);
//!
//! let config = SessionConfig::builder()
//!     .source(Language::EnglishUs, Arc::new(source))
//!     .target(Language::Spanish, Arc::new(sink))
//!     .build()?;
//!
//! let runtime = SessionRuntime::new(Credentials::from_env()?);
//! runtime.run(config).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unused_crate_dependencies)]

pub mod adapters;
pub mod channel;
pub mod codec;
pub mod error;
pub mod input;
pub mod output;
pub mod protocol;
pub mod router;
pub mod runtime;
pub mod session;

// Re-export key types for convenience
pub use adapters::DEFAULT_CAPACITY;
pub use channel::{ChannelState, ControlChannel};
pub use error::SessionError;
pub use output::OutputStats;
pub use protocol::{ServerMessage, Transcription};
pub use router::MessageRouter;
pub use runtime::{RuntimeTuning, SessionRuntime};
pub use session::SessionClient;

// Exercised by the integration tests only
#[cfg(test)]
use tracing_subscriber as _;
