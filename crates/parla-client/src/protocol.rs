//! Wire protocol types for the control channel.
//!
//! Every frame is a UTF-8 JSON envelope `{"message_type": …, "data": …}`.
//! Outbound frames are built here and serialised by the channel; inbound
//! frames are deserialised into [`InboundEnvelope`] and classified by the
//! router into the closed [`ServerMessage`] union.
//!
//! The server sometimes delivers `data` as a JSON object and sometimes as a
//! *string containing JSON*. [`normalize_payload`] folds the embedded-string
//! form into the object form at the boundary so nothing downstream has to
//! care.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parla_core::SessionConfig;
use parla_core::language::Language;

use crate::error::SessionError;

// ── Message type tags ─────────────────────────────────────────────────────────

/// Outbound: full pipeline configuration, sent once per session.
pub const MSG_SET_TASK: &str = "set_task";
/// Outbound: one base64 frame of 24 kHz wire audio.
pub const MSG_INPUT_AUDIO: &str = "input_audio_data";
/// Inbound: server-side task status.
pub const MSG_CURRENT_TASK: &str = "current_task";
/// Inbound: revisable transcription fragment.
pub const MSG_PARTIAL_TRANSCRIPTION: &str = "partial_transcription";
/// Inbound: confirmed transcription.
pub const MSG_FINAL_TRANSCRIPTION: &str = "final_transcription";
/// Inbound: one base64 frame of translated 24 kHz wire audio.
pub const MSG_OUTPUT_AUDIO: &str = "output_audio_data";
/// Inbound: server-reported error.
pub const MSG_ERROR: &str = "error";

// ── Outbound frames ───────────────────────────────────────────────────────────

/// An outbound envelope, ready for the channel to serialise.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    pub message_type: &'static str,
    pub data: Value,
}

/// The `set_task` payload: the declarative half of the session config,
/// shaped exactly like the configuration surface.
#[derive(Serialize)]
struct TaskSpec<'a> {
    source: &'a parla_core::SourceSpec,
    targets: &'a [parla_core::TargetSpec],
    input_stream: &'a parla_core::InputStream,
    output_stream: &'a parla_core::OutputStream,
}

/// Build the one-per-session `set_task` frame.
pub fn set_task_frame(config: &SessionConfig) -> Result<OutboundFrame, SessionError> {
    let spec = TaskSpec {
        source: &config.source,
        targets: &config.targets,
        input_stream: &config.input_stream,
        output_stream: &config.output_stream,
    };
    let data = serde_json::to_value(&spec)
        .map_err(|e| SessionError::Transport(format!("task spec did not serialise: {e}")))?;
    Ok(OutboundFrame {
        message_type: MSG_SET_TASK,
        data,
    })
}

/// Build one `input_audio_data` frame from an already base64-encoded chunk.
#[must_use]
pub fn input_audio_frame(base64_pcm: String) -> OutboundFrame {
    OutboundFrame {
        message_type: MSG_INPUT_AUDIO,
        data: serde_json::json!({ "data": base64_pcm }),
    }
}

// ── Inbound frames ────────────────────────────────────────────────────────────

/// A parsed inbound envelope, payload not yet interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    pub message_type: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Fold the two accepted payload shapes into one.
///
/// `data` may be a JSON object, a string containing JSON, or absent
/// (normalised to `null`). A string that does not itself parse as JSON is a
/// malformed frame.
pub fn normalize_payload(data: Option<Value>) -> Result<Value, SessionError> {
    match data {
        None | Some(Value::Null) => Ok(Value::Null),
        Some(Value::String(embedded)) => serde_json::from_str(&embedded).map_err(|e| {
            SessionError::MalformedFrame(format!("embedded payload is not JSON: {e}"))
        }),
        Some(other) => Ok(other),
    }
}

// ── Typed inbound messages ────────────────────────────────────────────────────

/// One transcription update as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub transcription_id: String,
    pub language: Language,
    pub text: String,
}

/// The closed union of recognised inbound messages.
///
/// Anything with an unrecognised `message_type` lands in `Generic` with its
/// payload preserved verbatim for observability.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// `current_task` — server-side pipeline status.
    TaskStatus { status: String },
    /// `partial_transcription` — may still be revised.
    PartialTranscription(Transcription),
    /// `final_transcription` — confirmed text.
    FinalTranscription(Transcription),
    /// `output_audio_data` — base64 payload, decoded by the output pipeline.
    Audio { data: String },
    /// `error` — server-reported failure.
    Error {
        error: String,
        details: Option<Value>,
    },
    /// Everything else, preserved byte-for-byte.
    Generic {
        message_type: String,
        payload: Value,
    },
}
