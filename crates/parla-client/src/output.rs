//! The output pipeline: routed messages → decode → resample → sinks.
//!
//! Audio frames are decoded from base64, upsampled to 48 kHz, and written to
//! every target sink. Delivery is best-effort: a sink write that fails is
//! logged and skipped, because a session with partial playback is still
//! worth more than a dead one. Transcription events go to the registered
//! handler.
//!
//! The feed between the router and the pipeline is a bounded queue; when the
//! pipeline cannot keep up, frames are dropped with a counter rather than
//! blocking the channel's receive path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use parla_core::ports::{AudioSink, TranscriptionEvent, TranscriptionHandler};

use crate::codec::{decode_base64, upsample_24k_to_48k};
use crate::error::SessionError;
use crate::protocol::{ServerMessage, Transcription};

/// Depth of the feed between router and pipeline.
const FEED_CAPACITY: usize = 64;
/// Idle tick so cancellation is observed even on a silent feed.
const IDLE_TICK: Duration = Duration::from_millis(250);

// ── Stats ─────────────────────────────────────────────────────────────────────

/// Session-scoped output counters.
///
/// Written only by the output side (single-writer), read atomically by the
/// runtime for completion detection.
#[derive(Default)]
pub struct OutputStats {
    audio_chunks_received: AtomicU64,
    frames_dropped: AtomicU64,
    output_audio_received: AtomicBool,
    last_audio: StdMutex<Option<Instant>>,
}

impl OutputStats {
    /// Total audio messages decoded and written.
    #[must_use]
    pub fn audio_chunks_received(&self) -> u64 {
        self.audio_chunks_received.load(Ordering::SeqCst)
    }

    /// Frames dropped because the feed was full.
    #[must_use]
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::SeqCst)
    }

    /// Whether any audio reached a sink yet.
    #[must_use]
    pub fn output_audio_received(&self) -> bool {
        self.output_audio_received.load(Ordering::SeqCst)
    }

    /// Time since the last audio frame, if any arrived at all.
    #[must_use]
    pub fn quiet_for(&self) -> Option<Duration> {
        let last = *self.last_audio.lock().unwrap();
        last.map(|at| at.elapsed())
    }

    fn note_audio(&self) {
        self.audio_chunks_received.fetch_add(1, Ordering::SeqCst);
        self.output_audio_received.store(true, Ordering::SeqCst);
        *self.last_audio.lock().unwrap() = Some(Instant::now());
    }
}

// ── Feed ──────────────────────────────────────────────────────────────────────

/// Producer half of the router→pipeline queue.
///
/// `push` never blocks: overflow drops the message and bumps the counter, so
/// a slow sink can never stall the channel reader.
#[derive(Clone)]
pub struct OutputFeed {
    tx: mpsc::Sender<ServerMessage>,
    stats: Arc<OutputStats>,
}

impl OutputFeed {
    pub fn push(&self, message: ServerMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.stats.frames_dropped.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(dropped, "Output feed full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Output feed closed, message discarded");
            }
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Drives the playback side of one session.
pub struct OutputPipeline {
    rx: mpsc::Receiver<ServerMessage>,
    sinks: Vec<Arc<dyn AudioSink>>,
    handler: Option<TranscriptionHandler>,
    stats: Arc<OutputStats>,
    cancel: Arc<AtomicBool>,
}

impl OutputPipeline {
    /// Create the pipeline and the feed the runtime's dispatch pushes into.
    #[must_use]
    pub fn new(
        sinks: Vec<Arc<dyn AudioSink>>,
        handler: Option<TranscriptionHandler>,
        stats: Arc<OutputStats>,
        cancel: Arc<AtomicBool>,
    ) -> (Self, OutputFeed) {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let feed = OutputFeed {
            tx,
            stats: Arc::clone(&stats),
        };
        let pipeline = Self {
            rx,
            sinks,
            handler,
            stats,
            cancel,
        };
        (pipeline, feed)
    }

    /// Consume the feed until it closes or the session is cancelled.
    ///
    /// Never fails: every per-message problem is recovered locally.
    pub async fn run(mut self) -> Result<(), SessionError> {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                debug!("Output pipeline cancelled");
                return Ok(());
            }
            match timeout(IDLE_TICK, self.rx.recv()).await {
                Err(_) => {} // idle; loop to re-check cancellation
                Ok(None) => {
                    debug!("Output feed finished");
                    return Ok(());
                }
                Ok(Some(message)) => self.handle(message).await,
            }
        }
    }

    async fn handle(&self, message: ServerMessage) {
        match message {
            ServerMessage::Audio { data } => self.handle_audio(&data).await,
            ServerMessage::PartialTranscription(t) => self.deliver_transcription(t, false),
            ServerMessage::FinalTranscription(t) => self.deliver_transcription(t, true),
            ServerMessage::TaskStatus { status } => {
                info!(status = %status, "Task status");
            }
            ServerMessage::Error { error, details } => {
                warn!(error = %error, ?details, "Server reported an error");
            }
            ServerMessage::Generic { message_type, .. } => {
                debug!(message_type = %message_type, "Unhandled server message");
            }
        }
    }

    async fn handle_audio(&self, base64_payload: &str) {
        let wire = match decode_base64(base64_payload) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "Skipping undecodable audio frame");
                return;
            }
        };
        let edge = match upsample_24k_to_48k(&wire) {
            Ok(edge) => edge,
            Err(e) => {
                warn!(error = %e, "Skipping malformed audio frame");
                return;
            }
        };

        self.stats.note_audio();

        let chunk = Bytes::from(edge);
        for sink in &self.sinks {
            if let Err(e) = sink.write(chunk.clone()).await {
                // Best-effort delivery: one failed write never ends the session.
                warn!(error = %e, "Sink write failed, frame skipped");
            }
        }
    }

    fn deliver_transcription(&self, t: Transcription, is_final: bool) {
        let Some(handler) = &self.handler else {
            return;
        };
        handler(TranscriptionEvent {
            transcription_id: t.transcription_id,
            language: t.language,
            text: t.text,
            is_final,
        });
    }
}
