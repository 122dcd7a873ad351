//! The session runtime — the one component that knows the whole graph.
//!
//! `SessionRuntime` owns the control channel, both pipelines, and the audio
//! handles for exactly one session at a time, and releases all of them on
//! every exit path: normal completion, failure, cancellation, or deadline.
//!
//! The start sequence is deliberate: validate, handshake, connect, send
//! `set_task` as the very first outbound frame, wait out the provisioning
//! delay, register handlers, then start the pipelines. After the input side
//! drains, completion is a quiescence watch on the output side rather than
//! anything the server announces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use parla_core::SessionConfig;
use parla_core::credentials::Credentials;
use parla_core::ports::TranscriptionHandler;

use crate::channel::ControlChannel;
use crate::error::SessionError;
use crate::input::InputPipeline;
use crate::output::{OutputPipeline, OutputStats};
use crate::protocol::set_task_frame;
use crate::router::MessageRouter;
use crate::session::SessionClient;

/// Poll interval for the completion and cancellation checks.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

// ── Tuning ────────────────────────────────────────────────────────────────────

/// Knobs for the runtime's timed phases. The defaults match the remote
/// protocol's expectations; tests shrink them to keep the suite fast.
#[derive(Debug, Clone)]
pub struct RuntimeTuning {
    /// Upper bound on the control channel open.
    pub connect_timeout: Duration,
    /// Pause after `set_task` while the server provisions the pipeline.
    /// Load-bearing against the remote service; shorten at your own risk.
    pub provisioning_delay: Duration,
    /// Output silence treated as completion once audio has arrived.
    pub quiescence_window: Duration,
    /// Absolute cap on the post-drain wait.
    pub max_drain_wait: Duration,
    /// Cadence of the "still waiting" diagnostics.
    pub progress_interval: Duration,
    /// Grace for trailing messages after completion.
    pub trailing_drain: Duration,
    /// Channel close grace on the normal path.
    pub close_grace: Duration,
    /// Channel close grace after a cancellation.
    pub cancel_close_grace: Duration,
}

impl Default for RuntimeTuning {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            provisioning_delay: Duration::from_secs(3),
            quiescence_window: Duration::from_secs(2),
            max_drain_wait: Duration::from_secs(30),
            progress_interval: Duration::from_secs(5),
            trailing_drain: Duration::from_secs(1),
            close_grace: Duration::from_secs(3),
            cancel_close_grace: Duration::from_secs(5),
        }
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

struct Inner {
    credentials: Credentials,
    tuning: RuntimeTuning,
    /// Set-once cancellation flag, checked at every loop iteration.
    cancel: Arc<AtomicBool>,
    session_active: AtomicBool,
    handler: StdMutex<Option<TranscriptionHandler>>,
}

/// Orchestrates one translation session at a time.
///
/// Cheap to clone; clones share the same cancellation flag and state.
#[derive(Clone)]
pub struct SessionRuntime {
    inner: Arc<Inner>,
}

impl SessionRuntime {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self::with_tuning(credentials, RuntimeTuning::default())
    }

    #[must_use]
    pub fn with_tuning(credentials: Credentials, tuning: RuntimeTuning) -> Self {
        Self {
            inner: Arc::new(Inner {
                credentials,
                tuning,
                cancel: Arc::new(AtomicBool::new(false)),
                session_active: AtomicBool::new(false),
                handler: StdMutex::new(None),
            }),
        }
    }

    /// Register the handler for deduplicated transcription events.
    pub fn on_transcription(&self, handler: TranscriptionHandler) {
        *self.inner.handler.lock().unwrap() = Some(handler);
    }

    /// Whether a session is currently running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.session_active.load(Ordering::SeqCst)
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn cancellation_requested(&self) -> bool {
        self.inner.cancel.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    ///
    /// Idempotent, non-blocking, and safe to call from any context — before
    /// the run starts, during it, or after it finished. The running session
    /// observes the flag at its next iteration boundary and winds down
    /// within the cancel close grace.
    pub fn cancel(&self) {
        if !self.inner.cancel.swap(true, Ordering::SeqCst) {
            info!("Session cancellation requested");
        }
    }

    /// Run a session to completion.
    ///
    /// Honours `config.timeout` when set; otherwise runs until end-of-stream
    /// drain, failure, or cancellation.
    pub async fn run(&self, config: SessionConfig) -> Result<(), SessionError> {
        match config.timeout {
            Some(deadline) => self.run_with_timeout(config, deadline).await,
            None => self.run_session(config).await,
        }
    }

    /// Spawn the run as a background task and return its handle.
    #[must_use]
    pub fn run_async(&self, config: SessionConfig) -> JoinHandle<Result<(), SessionError>> {
        let runtime = self.clone();
        tokio::spawn(async move { runtime.run(config).await })
    }

    /// Race the run against a deadline.
    ///
    /// On expiry the session is cancelled, cleanup runs to completion, and
    /// [`SessionError::Timeout`] is returned.
    pub async fn run_with_timeout(
        &self,
        config: SessionConfig,
        deadline: Duration,
    ) -> Result<(), SessionError> {
        let runtime = self.clone();
        // Spawned rather than select-dropped so cleanup always finishes.
        let mut session = tokio::spawn(async move { runtime.run_session(config).await });
        tokio::select! {
            finished = &mut session => finished
                .map_err(|e| SessionError::Transport(format!("session task failed: {e}")))?,
            () = sleep(deadline) => {
                warn!(deadline_secs = deadline.as_secs(), "Session deadline elapsed, cancelling");
                self.cancel();
                let _ = session.await;
                Err(SessionError::Timeout)
            }
        }
    }

    // ── Session body ──────────────────────────────────────────────────

    async fn run_session(&self, config: SessionConfig) -> Result<(), SessionError> {
        // Validation comes before any network I/O.
        config.validate()?;
        self.check_cancel()?;

        if self.inner.session_active.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Transport(
                "another session is already active on this runtime".to_owned(),
            ));
        }

        let result = self.handshake_and_stream(&config).await;

        // Cleanup invariants: source, sinks, and the active flag are
        // released on every exit path. Channel close happens inside
        // handshake_and_stream, where the channel lives.
        config.source_handle().close().await;
        for sink in config.sink_handles() {
            sink.close().await;
        }
        self.inner.session_active.store(false, Ordering::SeqCst);
        match &result {
            Ok(()) => info!("Session finished"),
            Err(e) if e.is_expected() => info!(kind = e.kind(), "Session ended"),
            Err(e) => warn!(kind = e.kind(), error = %e, "Session failed"),
        }
        result
    }

    async fn handshake_and_stream(&self, config: &SessionConfig) -> Result<(), SessionError> {
        let tuning = &self.inner.tuning;

        // Session credentials live exactly as long as this scope.
        let session = SessionClient::new(self.inner.credentials.clone())?
            .create_session()
            .await?;
        self.check_cancel()?;

        let channel = Arc::new(ControlChannel::new(
            &session.control_url,
            &session.publisher_token,
            config.debug,
        ));

        let outcome = self.stream(config, &channel).await;

        let grace = if self.cancellation_requested() {
            tuning.cancel_close_grace
        } else {
            tuning.close_grace
        };
        channel.close(grace).await;
        drop(session);
        outcome
    }

    async fn stream(
        &self,
        config: &SessionConfig,
        channel: &Arc<ControlChannel>,
    ) -> Result<(), SessionError> {
        let tuning = &self.inner.tuning;

        timeout(tuning.connect_timeout, channel.connect())
            .await
            .map_err(|_| {
                SessionError::Transport("control channel did not open within bound".to_owned())
            })??;
        self.check_cancel()?;

        // set_task is the first outbound frame, strictly before any audio.
        channel.send(&set_task_frame(config)?).await?;

        // Server-side provisioning window.
        sleep(tuning.provisioning_delay).await;
        self.check_cancel()?;

        // Handlers first, pipelines second.
        let stats = Arc::new(OutputStats::default());
        let handler = self.inner.handler.lock().unwrap().clone();
        let (output, feed) = OutputPipeline::new(
            config.sink_handles().to_vec(),
            handler,
            Arc::clone(&stats),
            Arc::clone(&self.inner.cancel),
        );

        let router = MessageRouter::new(&config.allowed_message_types);
        let dispatch_feed = feed.clone();
        channel.set_handler(Arc::new(move |envelope| {
            match router.route(envelope) {
                Ok(Some(message)) => dispatch_feed.push(message),
                Ok(None) => {}
                // Malformed frames and unknown languages are logged and
                // skipped; the session keeps running.
                Err(e) => warn!(kind = e.kind(), error = %e, "Inbound message dropped"),
            }
        }));

        let output_task = tokio::spawn(output.run());

        let input_closed = Arc::new(AtomicBool::new(false));
        let input = InputPipeline::new(
            config.source_handle(),
            Arc::clone(channel),
            Arc::clone(&self.inner.cancel),
            Arc::clone(&input_closed),
            config.silent,
        );
        let input_task = tokio::spawn(input.run());

        let outcome = self.await_completion(&stats, input_task).await;

        // Orderly output shutdown: detach the dispatch, close the feed, and
        // give the pipeline a moment to finish its queue.
        channel.clear_handler();
        drop(feed);
        if timeout(Duration::from_secs(1), output_task).await.is_err() {
            debug!("Output pipeline still busy at shutdown");
        }

        outcome
    }

    /// Wait for the input to drain, then for the output to go quiescent.
    async fn await_completion(
        &self,
        stats: &Arc<OutputStats>,
        input_task: JoinHandle<Result<(), SessionError>>,
    ) -> Result<(), SessionError> {
        let tuning = &self.inner.tuning;

        input_task
            .await
            .map_err(|e| SessionError::Transport(format!("input pipeline failed: {e}")))??;
        self.check_cancel()?;

        info!("Input drained, awaiting output completion");
        let started = Instant::now();
        let mut last_progress = Instant::now();
        loop {
            self.check_cancel()?;

            let quiescent = stats.output_audio_received()
                && stats
                    .quiet_for()
                    .is_some_and(|quiet| quiet >= tuning.quiescence_window);
            if quiescent {
                info!(
                    chunks = stats.audio_chunks_received(),
                    "Output quiescent, session complete"
                );
                break;
            }
            if started.elapsed() >= tuning.max_drain_wait {
                info!(
                    chunks = stats.audio_chunks_received(),
                    "Drain wait elapsed, completing session"
                );
                break;
            }
            if last_progress.elapsed() >= tuning.progress_interval {
                info!(
                    waited_secs = started.elapsed().as_secs(),
                    chunks = stats.audio_chunks_received(),
                    "Still waiting for output completion"
                );
                last_progress = Instant::now();
            }
            sleep(POLL_INTERVAL).await;
        }

        // Let trailing messages land before the channel goes away.
        sleep(tuning.trailing_drain).await;
        self.check_cancel()?;
        Ok(())
    }

    fn check_cancel(&self) -> Result<(), SessionError> {
        if self.inner.cancel.load(Ordering::SeqCst) {
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parla_core::Language;

    use crate::adapters::{ChannelSink, ChannelSource};

    fn runtime() -> SessionRuntime {
        SessionRuntime::new(Credentials::new("id", "secret").unwrap())
    }

    fn config() -> SessionConfig {
        let (source, _tx) = ChannelSource::new(4);
        let (sink, _rx) = ChannelSink::new(4);
        SessionConfig::builder()
            .source(Language::EnglishUs, Arc::new(source))
            .target(Language::Spanish, Arc::new(sink))
            .build()
            .unwrap()
    }

    #[test]
    fn cancel_is_idempotent_and_safe_before_start() {
        let rt = runtime();
        assert!(!rt.cancellation_requested());
        rt.cancel();
        rt.cancel();
        assert!(rt.cancellation_requested());
        assert!(!rt.is_active());
    }

    #[tokio::test]
    async fn cancelled_runtime_refuses_to_start() {
        let rt = runtime();
        rt.cancel();
        let err = rt.run(config()).await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
        assert!(!rt.is_active());
    }

    #[tokio::test]
    async fn default_tuning_matches_the_protocol_expectations() {
        let tuning = RuntimeTuning::default();
        assert_eq!(tuning.provisioning_delay, Duration::from_secs(3));
        assert_eq!(tuning.quiescence_window, Duration::from_secs(2));
        assert_eq!(tuning.max_drain_wait, Duration::from_secs(30));
        assert_eq!(tuning.cancel_close_grace, Duration::from_secs(5));
    }
}
