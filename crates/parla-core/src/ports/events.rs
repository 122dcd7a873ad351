//! Transcription events delivered to the embedding application.

use std::sync::Arc;

use crate::language::Language;

/// One transcription update, partial or final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionEvent {
    /// Server-assigned identity of the utterance this text belongs to.
    pub transcription_id: String,
    /// Resolved language of the text.
    pub language: Language,
    /// The transcribed or translated text.
    pub text: String,
    /// `false` for partial results that may still be revised.
    pub is_final: bool,
}

impl TranscriptionEvent {
    /// The primary language subtag (`"en"`), which is what UI layers
    /// typically key on.
    #[must_use]
    pub fn primary_subtag(&self) -> &'static str {
        self.language.primary()
    }
}

/// Callback invoked for each deduplicated transcription event.
///
/// Invoked from a pipeline task; implementations must not block.
pub type TranscriptionHandler = Arc<dyn Fn(TranscriptionEvent) + Send + Sync>;
