//! The immutable session configuration record.
//!
//! A [`SessionConfig`] is assembled once through [`SessionConfigBuilder`] and
//! never mutated after the runtime starts. It pairs the declarative half of
//! the configuration (languages, tuning, stream descriptors — everything that
//! travels to the server inside `set_task`) with the runtime half (the
//! [`AudioSource`] and [`AudioSink`] handles the pipelines drive).
//!
//! Validation runs in [`SessionConfigBuilder::build`] and again in the
//! runtime before any network I/O, so a malformed configuration can never
//! reach the wire.

use std::fmt;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;
use crate::language::Language;
use crate::ports::{AudioSink, AudioSource};

/// Sample rates outside this window are rejected up front.
pub const MIN_SAMPLE_RATE: u32 = 16_000;
/// Upper bound of the accepted sample-rate window.
pub const MAX_SAMPLE_RATE: u32 = 48_000;

// ── Stream descriptors ────────────────────────────────────────────────────────

/// Transport carrying a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Audio rides the control channel itself.
    #[default]
    Ws,
    /// Audio rides a separate media stream.
    Webrtc,
}

/// Accepted encodings for the input stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputAudioFormat {
    #[default]
    PcmS16le,
    Opus,
    Wav,
}

impl InputAudioFormat {
    /// Resolve a wire format string.
    ///
    /// A string outside the supported set is a typed validation error, so a
    /// malformed configuration document is rejected before any network I/O.
    pub fn parse(format: &str) -> Result<Self, ConfigError> {
        match format {
            "pcm_s16le" => Ok(Self::PcmS16le),
            "opus" => Ok(Self::Opus),
            "wav" => Ok(Self::Wav),
            other => Err(ConfigError::UnsupportedFormat {
                direction: "input",
                format: other.to_owned(),
            }),
        }
    }

    /// The wire form, e.g. `"pcm_s16le"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PcmS16le => "pcm_s16le",
            Self::Opus => "opus",
            Self::Wav => "wav",
        }
    }
}

/// Accepted encodings for the output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputAudioFormat {
    #[default]
    PcmS16le,
    ZlibPcmS16le,
}

impl OutputAudioFormat {
    /// Resolve a wire format string.
    pub fn parse(format: &str) -> Result<Self, ConfigError> {
        match format {
            "pcm_s16le" => Ok(Self::PcmS16le),
            "zlib_pcm_s16le" => Ok(Self::ZlibPcmS16le),
            other => Err(ConfigError::UnsupportedFormat {
                direction: "output",
                format: other.to_owned(),
            }),
        }
    }

    /// The wire form, e.g. `"zlib_pcm_s16le"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PcmS16le => "pcm_s16le",
            Self::ZlibPcmS16le => "zlib_pcm_s16le",
        }
    }
}

// On the wire a format is always its string form; unknown strings surface
// the typed `UnsupportedFormat` error rather than a shapeless parse failure.
impl Serialize for InputAudioFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InputAudioFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let format = String::deserialize(deserializer)?;
        Self::parse(&format).map_err(de::Error::custom)
    }
}

impl Serialize for OutputAudioFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OutputAudioFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let format = String::deserialize(deserializer)?;
        Self::parse(&format).map_err(de::Error::custom)
    }
}

/// One stream descriptor: transport, encoding, rate, channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec<F> {
    /// Transport type (`"ws"` on the wire).
    #[serde(rename = "type")]
    pub kind: StreamKind,
    pub format: F,
    pub sample_rate: u32,
    pub channels: u8,
}

impl<F: Default> Default for StreamSpec<F> {
    fn default() -> Self {
        Self {
            kind: StreamKind::default(),
            format: F::default(),
            sample_rate: MAX_SAMPLE_RATE,
            channels: 1,
        }
    }
}

impl<F> StreamSpec<F> {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRateOutOfRange(self.sample_rate));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(ConfigError::InvalidChannelCount(self.channels));
        }
        Ok(())
    }
}

/// Wire source descriptor (`input_stream.source.*`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputStream {
    pub source: StreamSpec<InputAudioFormat>,
}

/// Wire target descriptor (`output_stream.target.*`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputStream {
    pub target: StreamSpec<OutputAudioFormat>,
}

// ── Tuning records ────────────────────────────────────────────────────────────

/// ASR tuning knobs forwarded to the server verbatim. All optional; unset
/// knobs are omitted from the wire document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionTuning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denoise: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_confirmation_silence_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_splitter: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diarize_speakers: Option<bool>,
}

/// TTS tuning knobs forwarded to the server verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechTuning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_cloning_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f32>,
}

/// Per-target translation tuning (`targets[].translation.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationTuning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_generation: Option<SpeechTuning>,
}

// ── Source / target specs ─────────────────────────────────────────────────────

/// The declarative half of the session's single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub lang: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<TranscriptionTuning>,
}

/// The declarative half of one translation target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub lang: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationTuning>,
}

// ── SessionConfig ─────────────────────────────────────────────────────────────

/// Everything one session needs, frozen before the runtime starts.
///
/// `targets` and the sink handles are parallel vectors: target *i* delivers
/// its audio into sink *i*. [`SessionConfigBuilder`] keeps them in lockstep.
#[derive(Clone)]
pub struct SessionConfig {
    pub source: SourceSpec,
    pub targets: Vec<TargetSpec>,
    pub input_stream: InputStream,
    pub output_stream: OutputStream,
    /// Inbound message-type filter; empty accepts everything.
    pub allowed_message_types: Vec<String>,
    /// Suppress per-frame diagnostics.
    pub silent: bool,
    /// Log inbound frames (truncated) at debug level.
    pub debug: bool,
    /// Overall session deadline, if any.
    pub timeout: Option<Duration>,

    source_handle: Arc<dyn AudioSource>,
    sink_handles: Vec<Arc<dyn AudioSink>>,
}

impl SessionConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// The audio source driving the input pipeline.
    #[must_use]
    pub fn source_handle(&self) -> Arc<dyn AudioSource> {
        Arc::clone(&self.source_handle)
    }

    /// Sink handles, parallel to `targets`.
    #[must_use]
    pub fn sink_handles(&self) -> &[Arc<dyn AudioSink>] {
        &self.sink_handles
    }

    /// Re-check the structural invariants.
    ///
    /// The builder already ran this; the runtime runs it once more as the
    /// first step of its start sequence, before any network I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        for (i, a) in self.sink_handles.iter().enumerate() {
            for b in &self.sink_handles[i + 1..] {
                if ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)) {
                    return Err(ConfigError::DuplicateSink);
                }
            }
        }
        self.input_stream.source.validate()?;
        self.output_stream.target.validate()?;
        Ok(())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("source", &self.source)
            .field("targets", &self.targets)
            .field("input_stream", &self.input_stream)
            .field("output_stream", &self.output_stream)
            .field("allowed_message_types", &self.allowed_message_types)
            .field("silent", &self.silent)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Builder for [`SessionConfig`]. One source, one or more targets.
#[derive(Default)]
pub struct SessionConfigBuilder {
    source: Option<(Language, Arc<dyn AudioSource>)>,
    transcription: Option<TranscriptionTuning>,
    targets: Vec<TargetSpec>,
    sink_handles: Vec<Arc<dyn AudioSink>>,
    input_stream: Option<InputStream>,
    output_stream: Option<OutputStream>,
    allowed_message_types: Vec<String>,
    silent: bool,
    debug: bool,
    timeout: Option<Duration>,
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source language and the handle audio is pulled from.
    #[must_use]
    pub fn source(mut self, lang: Language, handle: Arc<dyn AudioSource>) -> Self {
        self.source = Some((lang, handle));
        self
    }

    /// Attach ASR tuning to the source.
    #[must_use]
    pub fn transcription(mut self, tuning: TranscriptionTuning) -> Self {
        self.transcription = Some(tuning);
        self
    }

    /// Add a translation target delivering into `sink`.
    #[must_use]
    pub fn target(mut self, lang: Language, sink: Arc<dyn AudioSink>) -> Self {
        self.targets.push(TargetSpec {
            lang,
            translation: None,
        });
        self.sink_handles.push(sink);
        self
    }

    /// Add a translation target with TTS tuning.
    #[must_use]
    pub fn target_tuned(
        mut self,
        lang: Language,
        sink: Arc<dyn AudioSink>,
        speech: SpeechTuning,
    ) -> Self {
        self.targets.push(TargetSpec {
            lang,
            translation: Some(TranslationTuning {
                speech_generation: Some(speech),
            }),
        });
        self.sink_handles.push(sink);
        self
    }

    /// Override the input stream descriptor (defaults to ws/pcm_s16le/48 kHz/mono).
    #[must_use]
    pub fn input_stream(mut self, spec: InputStream) -> Self {
        self.input_stream = Some(spec);
        self
    }

    /// Override the output stream descriptor (defaults to ws/pcm_s16le/48 kHz/mono).
    #[must_use]
    pub fn output_stream(mut self, spec: OutputStream) -> Self {
        self.output_stream = Some(spec);
        self
    }

    /// Restrict inbound dispatch to the given message types.
    #[must_use]
    pub fn allowed_message_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_message_types = types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Overall session deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let (lang, source_handle) = self.source.ok_or(ConfigError::MissingSource)?;
        let config = SessionConfig {
            source: SourceSpec {
                lang,
                transcription: self.transcription,
            },
            targets: self.targets,
            input_stream: self.input_stream.unwrap_or_default(),
            output_stream: self.output_stream.unwrap_or_default(),
            allowed_message_types: self.allowed_message_types,
            silent: self.silent,
            debug: self.debug,
            timeout: self.timeout,
            source_handle,
            sink_handles: self.sink_handles,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::error::PortError;

    struct NullSource;

    #[async_trait]
    impl AudioSource for NullSource {
        async fn read(&self) -> Result<Option<Bytes>, PortError> {
            Ok(None)
        }
        async fn close(&self) {}
        fn ready(&self) -> bool {
            true
        }
    }

    struct NullSink;

    #[async_trait]
    impl AudioSink for NullSink {
        async fn write(&self, _chunk: Bytes) -> Result<(), PortError> {
            Ok(())
        }
        async fn close(&self) {}
        fn ready(&self) -> bool {
            true
        }
    }

    fn minimal() -> SessionConfigBuilder {
        SessionConfig::builder()
            .source(Language::EnglishUs, Arc::new(NullSource))
            .target(Language::Spanish, Arc::new(NullSink))
    }

    #[test]
    fn minimal_config_builds() {
        let config = minimal().build().unwrap();
        assert_eq!(config.source.lang, Language::EnglishUs);
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.sink_handles().len(), 1);
        assert_eq!(config.input_stream.source.sample_rate, 48_000);
    }

    #[test]
    fn source_is_required() {
        let err = SessionConfig::builder()
            .target(Language::Spanish, Arc::new(NullSink))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSource));
    }

    #[test]
    fn at_least_one_target_is_required() {
        let err = SessionConfig::builder()
            .source(Language::EnglishUs, Arc::new(NullSource))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoTargets));
    }

    #[test]
    fn shared_sink_between_targets_is_rejected() {
        let sink: Arc<dyn AudioSink> = Arc::new(NullSink);
        let err = SessionConfig::builder()
            .source(Language::EnglishUs, Arc::new(NullSource))
            .target(Language::Spanish, Arc::clone(&sink))
            .target(Language::German, sink)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSink));
    }

    #[test]
    fn distinct_sinks_of_same_type_are_fine() {
        let config = SessionConfig::builder()
            .source(Language::EnglishUs, Arc::new(NullSource))
            .target(Language::Spanish, Arc::new(NullSink))
            .target(Language::German, Arc::new(NullSink))
            .build()
            .unwrap();
        assert_eq!(config.targets.len(), 2);
    }

    #[test]
    fn sample_rate_window_is_enforced() {
        let mut spec = InputStream::default();
        spec.source.sample_rate = 8_000;
        let err = minimal().input_stream(spec).build().unwrap_err();
        assert!(matches!(err, ConfigError::SampleRateOutOfRange(8_000)));

        let mut spec = InputStream::default();
        spec.source.sample_rate = 16_000;
        assert!(minimal().input_stream(spec).build().is_ok());
    }

    #[test]
    fn channel_count_is_enforced() {
        let mut spec = OutputStream::default();
        spec.target.channels = 3;
        let err = minimal().output_stream(spec).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChannelCount(3)));
    }

    #[test]
    fn stream_spec_serialises_with_wire_field_names() {
        let json = serde_json::to_value(InputStream::default()).unwrap();
        assert_eq!(json["source"]["type"], "ws");
        assert_eq!(json["source"]["format"], "pcm_s16le");
        assert_eq!(json["source"]["sample_rate"], 48_000);
        assert_eq!(json["source"]["channels"], 1);

        let json = serde_json::to_value(OutputStream {
            target: StreamSpec {
                format: OutputAudioFormat::ZlibPcmS16le,
                ..StreamSpec::default()
            },
        })
        .unwrap();
        assert_eq!(json["target"]["format"], "zlib_pcm_s16le");
    }

    #[test]
    fn format_strings_resolve_against_the_supported_sets() {
        assert_eq!(
            InputAudioFormat::parse("opus").unwrap(),
            InputAudioFormat::Opus
        );
        assert_eq!(
            OutputAudioFormat::parse("zlib_pcm_s16le").unwrap(),
            OutputAudioFormat::ZlibPcmS16le
        );

        let err = InputAudioFormat::parse("mp3").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedFormat {
                direction: "input",
                ..
            }
        ));
        // opus is input-only
        let err = OutputAudioFormat::parse("opus").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedFormat {
                direction: "output",
                ..
            }
        ));
    }

    #[test]
    fn unknown_formats_fail_deserialisation_with_the_typed_error() {
        let doc = serde_json::json!({
            "source": {"type": "ws", "format": "mp3", "sample_rate": 48_000, "channels": 1}
        });
        let err = serde_json::from_value::<InputStream>(doc).unwrap_err();
        assert!(err.to_string().contains("unsupported input stream format"));
    }

    #[test]
    fn tuning_knobs_are_omitted_when_unset() {
        let spec = SourceSpec {
            lang: Language::EnglishUs,
            transcription: Some(TranscriptionTuning {
                denoise: Some(true),
                ..TranscriptionTuning::default()
            }),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["lang"], "en-us");
        assert_eq!(json["transcription"]["denoise"], true);
        assert!(json["transcription"].get("model").is_none());
    }

    #[test]
    fn target_spec_carries_speech_generation() {
        let spec = TargetSpec {
            lang: Language::Spanish,
            translation: Some(TranslationTuning {
                speech_generation: Some(SpeechTuning {
                    voice_id: Some("nova".to_owned()),
                    tempo: Some(1.1),
                    ..SpeechTuning::default()
                }),
            }),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["lang"], "es");
        assert_eq!(json["translation"]["speech_generation"]["voice_id"], "nova");
    }
}
