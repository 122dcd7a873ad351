//! Core domain types and port definitions for the parla translation client.
//!
//! This crate is transport-agnostic: it knows nothing about HTTP, WebSockets,
//! or wire codecs. It defines
//!
//! - the closed [`Language`] registry,
//! - [`Credentials`] and the session-scoped [`SessionCredentials`],
//! - the immutable [`SessionConfig`] record and its validation rules,
//! - the [`AudioSource`] / [`AudioSink`] port traits that decouple the
//!   streaming core from any concrete audio backend.
//!
//! The dependency arrow is one-way: `parla-client` depends on this crate,
//! never the other way around.

#![deny(unused_crate_dependencies)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod language;
pub mod ports;

// Re-export commonly used types for convenience
pub use config::{
    InputAudioFormat, InputStream, OutputAudioFormat, OutputStream, SessionConfig,
    SessionConfigBuilder, SourceSpec, SpeechTuning, StreamKind, StreamSpec, TargetSpec,
    TranscriptionTuning, TranslationTuning,
};
pub use credentials::{Credentials, SessionCredentials};
pub use error::{ConfigError, LanguageError, PortError};
pub use language::Language;
pub use ports::{AudioSink, AudioSource, TranscriptionEvent, TranscriptionHandler};
