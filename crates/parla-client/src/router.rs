//! Inbound message classification.
//!
//! The router turns raw [`InboundEnvelope`]s into the typed
//! [`ServerMessage`] union. Dispatch is a literal match on `message_type`;
//! everything unrecognised is preserved verbatim as `Generic` so nothing the
//! server says is ever silently lost. Recognised payloads are normalised
//! first (the server sometimes embeds JSON in a string) and validated
//! field-by-field.
//!
//! The router also owns two session-scoped policies: the allowed-message
//! filter, and the suppression of consecutive identical partial
//! transcriptions.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::debug;

use parla_core::language::Language;

use crate::error::SessionError;
use crate::protocol::{
    InboundEnvelope, MSG_CURRENT_TASK, MSG_ERROR, MSG_FINAL_TRANSCRIPTION, MSG_OUTPUT_AUDIO,
    MSG_PARTIAL_TRANSCRIPTION, ServerMessage, Transcription, normalize_payload,
};

/// Classifies inbound envelopes into typed messages.
pub struct MessageRouter {
    /// Message types accepted for dispatch; empty accepts everything.
    allowed: HashSet<String>,
    /// Dedup key of the last delivered partial, for suppression of
    /// consecutive identical fragments.
    last_partial: Mutex<Option<String>>,
}

impl MessageRouter {
    #[must_use]
    pub fn new(allowed_message_types: &[String]) -> Self {
        Self {
            allowed: allowed_message_types.iter().cloned().collect(),
            last_partial: Mutex::new(None),
        }
    }

    /// Classify one envelope.
    ///
    /// `Ok(None)` means the message was intentionally dropped — filtered
    /// out, or a duplicate partial. Errors are recoverable: the caller logs
    /// them and keeps the session running.
    pub fn route(&self, envelope: InboundEnvelope) -> Result<Option<ServerMessage>, SessionError> {
        if !self.allowed.is_empty() && !self.allowed.contains(&envelope.message_type) {
            debug!(message_type = %envelope.message_type, "Message dropped by filter");
            return Ok(None);
        }

        let message_type = envelope.message_type;
        if !is_recognized(&message_type) {
            // Preserved exactly as received - no payload normalisation.
            return Ok(Some(ServerMessage::Generic {
                message_type,
                payload: envelope.data.unwrap_or(serde_json::Value::Null),
            }));
        }

        let payload = normalize_payload(envelope.data)?;
        match message_type.as_str() {
            MSG_CURRENT_TASK => {
                let status = require_str(&payload, "status")?;
                Ok(Some(ServerMessage::TaskStatus { status }))
            }
            MSG_OUTPUT_AUDIO => {
                let data = require_str(&payload, "data")?;
                Ok(Some(ServerMessage::Audio { data }))
            }
            MSG_PARTIAL_TRANSCRIPTION => {
                let transcription = parse_transcription(&payload)?;
                if self.is_duplicate_partial(&transcription) {
                    debug!(
                        transcription_id = %transcription.transcription_id,
                        "Duplicate partial suppressed"
                    );
                    return Ok(None);
                }
                Ok(Some(ServerMessage::PartialTranscription(transcription)))
            }
            MSG_FINAL_TRANSCRIPTION => {
                // A final ends the utterance; the next partial starts fresh.
                *self.last_partial.lock().unwrap() = None;
                Ok(Some(ServerMessage::FinalTranscription(parse_transcription(
                    &payload,
                )?)))
            }
            MSG_ERROR => {
                let error = payload["error"]
                    .as_str()
                    .map_or_else(|| payload["error"].to_string(), str::to_owned);
                let details = payload.get("details").filter(|d| !d.is_null()).cloned();
                Ok(Some(ServerMessage::Error { error, details }))
            }
            _ => unreachable!("is_recognized covers every literal arm"),
        }
    }

    /// True when this partial matches the immediately preceding one.
    fn is_duplicate_partial(&self, t: &Transcription) -> bool {
        let key = format!("{}\u{1f}{}\u{1f}{}", t.transcription_id, t.language, t.text);
        let mut last = self.last_partial.lock().unwrap();
        if last.as_deref() == Some(key.as_str()) {
            return true;
        }
        *last = Some(key);
        false
    }
}

fn is_recognized(message_type: &str) -> bool {
    matches!(
        message_type,
        MSG_CURRENT_TASK
            | MSG_OUTPUT_AUDIO
            | MSG_PARTIAL_TRANSCRIPTION
            | MSG_FINAL_TRANSCRIPTION
            | MSG_ERROR
    )
}

fn require_str(payload: &serde_json::Value, field: &str) -> Result<String, SessionError> {
    payload[field]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| SessionError::MalformedFrame(format!("payload missing field {field:?}")))
}

/// Extract `transcription.{transcription_id,language,text}`.
///
/// Language resolution tries the canonical code first, then the primary
/// subtag; a tag outside the registry is an [`SessionError::UnknownLanguage`].
fn parse_transcription(payload: &serde_json::Value) -> Result<Transcription, SessionError> {
    let t = &payload["transcription"];
    if !t.is_object() {
        return Err(SessionError::MalformedFrame(
            "payload missing transcription object".to_owned(),
        ));
    }
    let transcription_id = require_str(t, "transcription_id")?;
    let text = require_str(t, "text")?;
    let tag = require_str(t, "language")?;
    let language = Language::resolve(&tag)?;
    Ok(Transcription {
        transcription_id,
        language,
        text,
    })
}
