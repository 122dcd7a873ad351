//! The input pipeline: source → resample → encode → control channel.
//!
//! One task pulls 48 kHz chunks from the [`AudioSource`], converts them to
//! the 24 kHz wire rate, and submits `input_audio_data` frames. Pacing keeps
//! the submit rate from overrunning the server; cancellation is checked at
//! every iteration boundary.
//!
//! End-of-stream does **not** close the channel — the pipeline records that
//! the input side is done and returns, and the runtime keeps the session
//! alive while trailing output drains.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use parla_core::ports::AudioSource;

use crate::channel::ControlChannel;
use crate::codec::{downsample_48k_to_24k, encode_base64};
use crate::error::SessionError;
use crate::protocol::input_audio_frame;

/// Sleep between non-empty iterations, and while the source has no data.
const PACING: Duration = Duration::from_millis(50);

/// Drives the capture side of one session.
pub struct InputPipeline {
    source: Arc<dyn AudioSource>,
    channel: Arc<ControlChannel>,
    cancel: Arc<AtomicBool>,
    input_closed: Arc<AtomicBool>,
    silent: bool,
}

impl InputPipeline {
    pub fn new(
        source: Arc<dyn AudioSource>,
        channel: Arc<ControlChannel>,
        cancel: Arc<AtomicBool>,
        input_closed: Arc<AtomicBool>,
        silent: bool,
    ) -> Self {
        Self {
            source,
            channel,
            cancel,
            input_closed,
            silent,
        }
    }

    /// Run until end-of-stream, cancellation, or a terminal send failure.
    ///
    /// On every exit path the input-closed flag is set so the runtime can
    /// move on to the drain phase.
    pub async fn run(self) -> Result<(), SessionError> {
        let result = self.pull_loop().await;
        self.input_closed.store(true, Ordering::SeqCst);
        result
    }

    async fn pull_loop(&self) -> Result<(), SessionError> {
        let mut frames_sent: u64 = 0;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                debug!(frames_sent, "Input pipeline cancelled");
                return Ok(());
            }

            let chunk = match self.source.read().await {
                Ok(chunk) => chunk,
                Err(e) => {
                    // One read error ends the input; the session still drains.
                    warn!(error = %e, frames_sent, "Audio source read failed, ending input");
                    return Ok(());
                }
            };

            let Some(chunk) = chunk else {
                info!(frames_sent, "Input end-of-stream, entering drain");
                return Ok(());
            };

            if chunk.is_empty() {
                // No data yet. Poll again after one pacing interval.
                sleep(PACING).await;
                continue;
            }

            let wire = match downsample_48k_to_24k(&chunk) {
                Ok(wire) => wire,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed source chunk");
                    continue;
                }
            };

            let frame = input_audio_frame(encode_base64(&wire));
            if let Err(first) = self.channel.send(&frame).await {
                warn!(error = %first, "Audio frame send failed, retrying once");
                if let Err(second) = self.channel.send(&frame).await {
                    error!(error = %second, frames_sent, "Audio frame send failed twice");
                    return Err(SessionError::Transport(format!(
                        "input frame could not be submitted: {second}"
                    )));
                }
            }

            frames_sent += 1;
            if !self.silent && frames_sent % 200 == 0 {
                debug!(frames_sent, "Input frames submitted");
            }

            sleep(PACING).await;
        }
    }
}
