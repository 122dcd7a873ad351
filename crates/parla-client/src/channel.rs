//! The persistent duplex control channel.
//!
//! One WebSocket connection carries every control message and every audio
//! frame of a session, as UTF-8 JSON text frames. This module owns the
//! connection lifecycle:
//!
//! - a bounded outbound queue drained in order by the I/O task, so sends are
//!   totally ordered per channel and work before the socket is even open;
//! - inbound frames parsed into [`InboundEnvelope`] and delivered both to a
//!   pull queue ([`ControlChannel::recv`]) and to a registered push handler;
//! - a reconnect policy for unsolicited closes, with a terminal `Failed`
//!   state once the attempt budget is exhausted;
//! - a graceful [`ControlChannel::close`] that flushes pending sends within
//!   a grace window.
//!
//! The channel URL embeds the publisher token as a query parameter. The
//! composed URL is kept private and never logged; WebSocket errors are
//! reduced to token-free labels before they reach a log line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::protocol::InboundEnvelope;

/// Outbound queue depth. A full queue applies [`BACKPRESSURE_GRACE`] before
/// the send fails.
const OUTBOUND_CAPACITY: usize = 256;
/// Pull-queue depth for inbound envelopes.
const INBOUND_CAPACITY: usize = 1024;
/// How long a send waits for queue space before failing with `Backpressure`.
const BACKPRESSURE_GRACE: Duration = Duration::from_millis(100);
/// Delay between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Consecutive failed opens tolerated before the channel turns `Failed`.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;
/// A connection silent for this long is considered lost.
const CONNECTION_LOST_TIMEOUT: Duration = Duration::from_secs(60);
/// Inbound frames longer than this are truncated in debug logs only.
const DEBUG_FRAME_TRUNCATE: usize = 800;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Push handler invoked for every inbound envelope, in receive order.
pub type InboundHandler = Arc<dyn Fn(InboundEnvelope) + Send + Sync>;

// ── State machine ─────────────────────────────────────────────────────────────

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created, never connected. Sends enqueue.
    Idle,
    /// First open in flight. Sends enqueue.
    Connecting,
    /// Socket is up. Sends write through the queue.
    Open,
    /// Unsolicited close observed; retry scheduled. Sends enqueue.
    Reconnecting,
    /// Graceful shutdown in progress. Sends are rejected.
    Closing,
    /// Terminal, clean.
    Closed,
    /// Terminal, after exhausted reconnects or a rejected handshake.
    Failed,
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct Shared {
    state: watch::Sender<ChannelState>,
    keep_running: AtomicBool,
    close_requested: AtomicBool,
    close_notify: Notify,
    close_grace: StdMutex<Duration>,
    handler: StdMutex<Option<InboundHandler>>,
    last_error: StdMutex<Option<SessionError>>,
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        if *self.state.borrow() != state {
            debug!(?state, "Control channel state");
            self.state.send_replace(state);
        }
    }

    fn fail(&self, err: SessionError) {
        error!(kind = err.kind(), "Control channel failed: {err}");
        *self.last_error.lock().unwrap() = Some(err);
        self.set_state(ChannelState::Failed);
    }
}

// ── ControlChannel ────────────────────────────────────────────────────────────

/// Duplex JSON message channel over one authenticated connection.
pub struct ControlChannel {
    /// Composed URL including the token. Private; never logged.
    url: String,
    debug_frames: bool,
    shared: Arc<Shared>,
    outbound_tx: mpsc::Sender<String>,
    /// Receiver handed to the I/O task on first `connect()`.
    outbound_rx_slot: StdMutex<Option<mpsc::Receiver<String>>>,
    inbound_tx: mpsc::Sender<InboundEnvelope>,
    inbound_rx: Mutex<mpsc::Receiver<InboundEnvelope>>,
    io_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ControlChannel {
    /// Create an idle channel for `{control_url}?token={publisher_token}`.
    #[must_use]
    pub fn new(control_url: &str, publisher_token: &str, debug_frames: bool) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (state, _) = watch::channel(ChannelState::Idle);
        Self {
            url: compose_url(control_url, publisher_token),
            debug_frames,
            shared: Arc::new(Shared {
                state,
                keep_running: AtomicBool::new(true),
                close_requested: AtomicBool::new(false),
                close_notify: Notify::new(),
                close_grace: StdMutex::new(Duration::from_secs(3)),
                handler: StdMutex::new(None),
                last_error: StdMutex::new(None),
            }),
            outbound_tx,
            outbound_rx_slot: StdMutex::new(Some(outbound_rx)),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            io_task: StdMutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Register the push handler for inbound envelopes.
    ///
    /// Invoked from the I/O task in receive order; the handler must not
    /// block.
    pub fn set_handler(&self, handler: InboundHandler) {
        *self.shared.handler.lock().unwrap() = Some(handler);
    }

    /// Drop the push handler, releasing whatever it captured.
    pub fn clear_handler(&self) {
        *self.shared.handler.lock().unwrap() = None;
    }

    /// Take the terminal error, if the channel has failed.
    #[must_use]
    pub fn take_error(&self) -> Option<SessionError> {
        self.shared.last_error.lock().unwrap().take()
    }

    /// Open the connection and wait until it is up.
    ///
    /// Idempotent while `Open`; rejected once closing or closed. The caller
    /// bounds the wait with its own timeout.
    pub async fn connect(&self) -> Result<(), SessionError> {
        match self.state() {
            ChannelState::Open => return Ok(()),
            ChannelState::Closing | ChannelState::Closed | ChannelState::Failed => {
                return Err(SessionError::Transport(
                    "connect on a closed control channel".to_owned(),
                ));
            }
            ChannelState::Idle => {
                let rx = self.outbound_rx_slot.lock().unwrap().take();
                if let Some(outbound_rx) = rx {
                    self.shared.set_state(ChannelState::Connecting);
                    let task = tokio::spawn(run_io(
                        self.url.clone(),
                        Arc::clone(&self.shared),
                        outbound_rx,
                        self.inbound_tx.clone(),
                        self.debug_frames,
                    ));
                    *self.io_task.lock().unwrap() = Some(task);
                }
            }
            ChannelState::Connecting | ChannelState::Reconnecting => {}
        }

        let mut state_rx = self.shared.state.subscribe();
        loop {
            match *state_rx.borrow_and_update() {
                ChannelState::Open => return Ok(()),
                ChannelState::Failed => {
                    return Err(self.take_error().unwrap_or_else(|| {
                        SessionError::Transport("control channel failed".to_owned())
                    }));
                }
                ChannelState::Closing | ChannelState::Closed => {
                    return Err(SessionError::Transport(
                        "control channel closed while connecting".to_owned(),
                    ));
                }
                _ => {}
            }
            if state_rx.changed().await.is_err() {
                return Err(SessionError::Transport(
                    "control channel task terminated".to_owned(),
                ));
            }
        }
    }

    /// Serialise `msg` and hand it to the outbound queue.
    ///
    /// Enqueues while the connection is still coming up; the queue is
    /// flushed in order once the socket opens. A queue that stays full past
    /// the 100 ms grace fails the send with [`SessionError::Backpressure`].
    pub async fn send<T: Serialize + ?Sized>(&self, msg: &T) -> Result<(), SessionError> {
        if matches!(
            self.state(),
            ChannelState::Closing | ChannelState::Closed | ChannelState::Failed
        ) {
            return Err(SessionError::Transport(
                "send on a closed control channel".to_owned(),
            ));
        }

        // serde_json leaves non-ASCII characters literal, as the wire expects
        let text = serde_json::to_string(msg).map_err(|e| {
            SessionError::MalformedFrame(format!("outbound message did not serialise: {e}"))
        })?;

        match self.outbound_tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(text)) => {
                sleep(BACKPRESSURE_GRACE).await;
                match self.outbound_tx.try_send(text) {
                    Ok(()) => Ok(()),
                    Err(mpsc::error::TrySendError::Full(_)) => Err(SessionError::Backpressure),
                    Err(mpsc::error::TrySendError::Closed(_)) => Err(SessionError::Transport(
                        "outbound queue closed".to_owned(),
                    )),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SessionError::Transport(
                "outbound queue closed".to_owned(),
            )),
        }
    }

    /// Pull the next inbound envelope.
    ///
    /// Returns `None` once the channel has shut down and the queue is
    /// drained.
    pub async fn recv(&self) -> Option<InboundEnvelope> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Gracefully shut the channel down.
    ///
    /// Clears the reconnect policy, flushes pending sends until the grace
    /// deadline, issues a protocol-level close, and transitions to `Closed`
    /// regardless of what the transport does.
    pub async fn close(&self, grace: Duration) {
        self.shared.keep_running.store(false, Ordering::SeqCst);
        match self.state() {
            ChannelState::Closed | ChannelState::Failed => return,
            ChannelState::Idle => {
                self.shared.set_state(ChannelState::Closed);
                return;
            }
            _ => {}
        }

        *self.shared.close_grace.lock().unwrap() = grace;
        self.shared.set_state(ChannelState::Closing);
        self.shared.close_requested.store(true, Ordering::SeqCst);
        self.shared.close_notify.notify_one();

        let task = self.io_task.lock().unwrap().take();
        if let Some(mut task) = task {
            // Margin on top of the grace so a responsive task can finish its
            // own flush before we give up on it.
            if timeout(grace + Duration::from_secs(2), &mut task)
                .await
                .is_err()
            {
                warn!("Control channel close grace elapsed, aborting I/O task");
                task.abort();
            }
        }
        self.shared.set_state(ChannelState::Closed);
    }
}

/// `{control_url}?token={token}`, appending with `&` when the URL already
/// carries a query.
fn compose_url(control_url: &str, token: &str) -> String {
    let sep = if control_url.contains('?') { '&' } else { '?' };
    format!("{control_url}{sep}token={token}")
}

// ── I/O task ──────────────────────────────────────────────────────────────────

enum ConnectionEnd {
    /// `close()` was requested; the flush already happened.
    CloseRequested,
    /// The peer closed the socket or the stream ended.
    RemoteClosed,
    /// A read/write error or the 60 s silence timeout.
    Lost,
}

async fn run_io(
    url: String,
    shared: Arc<Shared>,
    mut outbound_rx: mpsc::Receiver<String>,
    inbound_tx: mpsc::Sender<InboundEnvelope>,
    debug_frames: bool,
) {
    let mut attempts: u32 = 0;
    loop {
        if shared.close_requested.load(Ordering::SeqCst) {
            shared.set_state(ChannelState::Closed);
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((ws, _response)) => {
                attempts = 0;
                shared.set_state(ChannelState::Open);
                info!("Control channel open");

                let end =
                    drive_connection(ws, &shared, &mut outbound_rx, &inbound_tx, debug_frames)
                        .await;
                match end {
                    ConnectionEnd::CloseRequested => {
                        shared.set_state(ChannelState::Closed);
                        info!("Control channel closed");
                        return;
                    }
                    ConnectionEnd::RemoteClosed | ConnectionEnd::Lost => {
                        if !shared.keep_running.load(Ordering::SeqCst) {
                            shared.set_state(ChannelState::Closed);
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                // A handshake rejected with a 4xx is terminal: the session
                // on the server side is gone, retrying cannot revive it.
                if let Some(status) = handshake_rejection(&e) {
                    let err = if matches!(status, 401 | 403) {
                        SessionError::Authentication(format!(
                            "control channel handshake rejected with status {status}"
                        ))
                    } else {
                        SessionError::Transport(format!(
                            "control channel handshake rejected with status {status}"
                        ))
                    };
                    shared.fail(err);
                    return;
                }
                warn!(error = %ws_error_label(&e), "Control channel open failed");
            }
        }

        attempts += 1;
        if attempts > MAX_RECONNECT_ATTEMPTS {
            shared.fail(SessionError::Transport(format!(
                "control channel gone after {MAX_RECONNECT_ATTEMPTS} reconnect attempts"
            )));
            return;
        }
        shared.set_state(ChannelState::Reconnecting);
        warn!(attempt = attempts, "Control channel reconnect scheduled");

        tokio::select! {
            () = sleep(RECONNECT_DELAY) => {}
            () = shared.close_notify.notified() => {
                shared.set_state(ChannelState::Closed);
                return;
            }
        }
    }
}

async fn drive_connection(
    ws: WsStream,
    shared: &Shared,
    outbound_rx: &mut mpsc::Receiver<String>,
    inbound_tx: &mpsc::Sender<InboundEnvelope>,
    debug_frames: bool,
) -> ConnectionEnd {
    let (mut write, mut read) = ws.split();
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            () = shared.close_notify.notified() => {
                let grace = *shared.close_grace.lock().unwrap();
                flush_and_close(&mut write, outbound_rx, grace).await;
                return ConnectionEnd::CloseRequested;
            }

            frame = outbound_rx.recv() => {
                let Some(text) = frame else {
                    // All senders gone - the owning channel was dropped.
                    return ConnectionEnd::CloseRequested;
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!(error = %ws_error_label(&e), "Control channel write failed");
                    return ConnectionEnd::Lost;
                }
            }

            msg = read.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        deliver(&text, shared, inbound_tx, debug_frames);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Control channel closed by peer");
                        return ConnectionEnd::RemoteClosed;
                    }
                    // Pings are answered by the protocol layer; pongs and
                    // binary frames only count as liveness.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %ws_error_label(&e), "Control channel read failed");
                        return ConnectionEnd::Lost;
                    }
                }
            }

            () = sleep_until(last_activity + CONNECTION_LOST_TIMEOUT) => {
                warn!(
                    timeout_secs = CONNECTION_LOST_TIMEOUT.as_secs(),
                    "Control channel silent past the connection-lost timeout"
                );
                return ConnectionEnd::Lost;
            }
        }
    }
}

/// Flush whatever the outbound queue still holds, bounded by `grace`, then
/// send a protocol close.
async fn flush_and_close(write: &mut WsSink, outbound_rx: &mut mpsc::Receiver<String>, grace: Duration) {
    let deadline = Instant::now() + grace;
    while let Ok(text) = outbound_rx.try_recv() {
        if Instant::now() >= deadline {
            warn!("Close grace elapsed with sends still pending");
            break;
        }
        if write.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    let _ = write.send(Message::Close(None)).await;
    let _ = write.flush().await;
}

/// Parse one text frame and deliver it to the push handler and pull queue.
fn deliver(
    text: &str,
    shared: &Shared,
    inbound_tx: &mpsc::Sender<InboundEnvelope>,
    debug_frames: bool,
) {
    if debug_frames {
        let cut = truncation_boundary(text, DEBUG_FRAME_TRUNCATE);
        debug!(
            frame = %&text[..cut],
            truncated = cut < text.len(),
            "Inbound frame"
        );
    }

    match serde_json::from_str::<InboundEnvelope>(text) {
        Ok(envelope) => {
            let handler = shared.handler.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(envelope.clone());
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = inbound_tx.try_send(envelope) {
                warn!("Inbound pull queue full, dropping envelope");
            }
        }
        Err(e) => {
            // Malformed frames are logged and skipped; they never end a session.
            warn!(error = %e, "Inbound frame is not a valid envelope");
        }
    }
}

/// Largest char boundary not past `max` bytes.
fn truncation_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0)
}

/// The HTTP status of a rejected WebSocket handshake, when that is what the
/// error was.
fn handshake_rejection(err: &tokio_tungstenite::tungstenite::Error) -> Option<u16> {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Http(response) if response.status().is_client_error() => {
            Some(response.status().as_u16())
        }
        _ => None,
    }
}

/// A log-safe description of a WebSocket error. URL-shaped variants are
/// reduced to a fixed label because the URL embeds the token.
fn ws_error_label(err: &tokio_tungstenite::tungstenite::Error) -> String {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Url(_) => "invalid control URL".to_owned(),
        WsError::Http(response) => format!("handshake rejected with status {}", response.status()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_composition_handles_existing_queries() {
        assert_eq!(
            compose_url("wss://stream.example.com/ws", "tok"),
            "wss://stream.example.com/ws?token=tok"
        );
        assert_eq!(
            compose_url("wss://stream.example.com/ws?room=a", "tok"),
            "wss://stream.example.com/ws?room=a&token=tok"
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "ééééé"; // 2 bytes per char
        assert_eq!(truncation_boundary(text, 3), 2);
        assert_eq!(truncation_boundary(text, 10), 10);
        assert_eq!(truncation_boundary("short", 800), 5);
    }

    #[tokio::test]
    async fn new_channel_is_idle_and_enqueues_sends() {
        let channel = ControlChannel::new("wss://stream.example.com/ws", "tok", false);
        assert_eq!(channel.state(), ChannelState::Idle);
        channel
            .send(&serde_json::json!({"message_type": "set_task", "data": {}}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn close_from_idle_is_immediate_and_sends_are_rejected() {
        let channel = ControlChannel::new("wss://stream.example.com/ws", "tok", false);
        channel.close(Duration::from_secs(3)).await;
        assert_eq!(channel.state(), ChannelState::Closed);

        let err = channel
            .send(&serde_json::json!({"message_type": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let channel = ControlChannel::new("wss://stream.example.com/ws", "tok", false);
        channel.close(Duration::from_secs(1)).await;
        channel.close(Duration::from_secs(1)).await;
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_queue_fails_with_backpressure() {
        let channel = ControlChannel::new("wss://stream.example.com/ws", "tok", false);
        let frame = serde_json::json!({"message_type": "input_audio_data", "data": {"data": "AA"}});
        for _ in 0..OUTBOUND_CAPACITY {
            channel.send(&frame).await.unwrap();
        }
        let err = channel.send(&frame).await.unwrap_err();
        assert_eq!(err.kind(), "backpressure");
    }
}
