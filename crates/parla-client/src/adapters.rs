//! Channel-backed audio source and sink.
//!
//! [`ChannelSource`] is fed by an `mpsc` sender the embedding application
//! holds; dropping the sender marks end-of-stream. [`ChannelSink`] queues
//! translated audio in a bounded `mpsc` channel the application drains.
//! These adapters are the library's programmatic audio surface — anything
//! that can produce or consume 48 kHz PCM16LE mono bytes can sit on the far
//! end — and they double as the test harness for the pipelines.
//!
//! ## Channel failure handling
//!
//! * **Source** — a dropped sender is a clean end-of-stream, not an error:
//!   `read` returns `Ok(None)` and the input pipeline drains.
//! * **Sink** — a full queue surfaces [`PortError::SinkWrite`], which the
//!   output pipeline logs and drops (best-effort delivery, never blocking
//!   the receive path). A dropped receiver surfaces
//!   [`PortError::Disconnected`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

use parla_core::error::PortError;
use parla_core::ports::{AudioSink, AudioSource};

/// Default frame capacity for both adapters (~3 s of 100 ms frames).
pub const DEFAULT_CAPACITY: usize = 32;

// ── ChannelSource ─────────────────────────────────────────────────────────────

/// Audio source fed through an in-process channel.
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<Bytes>>,
    closed: AtomicBool,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    ///
    /// Dropping the sender signals end-of-stream; sending an empty `Bytes`
    /// signals "no data yet" and makes the pipeline poll again.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let source = Self {
            rx: Mutex::new(rx),
            closed: AtomicBool::new(false),
        };
        (source, tx)
    }
}

#[async_trait]
impl AudioSource for ChannelSource {
    async fn read(&self) -> Result<Option<Bytes>, PortError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.lock().await.close();
    }

    fn ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

// ── ChannelSink ───────────────────────────────────────────────────────────────

/// Audio sink delivering into an in-process channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    closed: AtomicBool,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            closed: AtomicBool::new(false),
        };
        (sink, rx)
    }
}

#[async_trait]
impl AudioSink for ChannelSink {
    async fn write(&self, chunk: Bytes) -> Result<(), PortError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PortError::Disconnected("sink closed".to_owned()));
        }
        match self.tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(PortError::SinkWrite("sink queue full".to_owned()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(PortError::Disconnected("sink receiver dropped".to_owned()))
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_reads_chunks_in_order() {
        let (source, tx) = ChannelSource::new(4);
        tx.send(Bytes::from_static(b"one")).await.unwrap();
        tx.send(Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(source.read().await.unwrap().unwrap(), "one");
        assert_eq!(source.read().await.unwrap().unwrap(), "two");
    }

    #[tokio::test]
    async fn dropped_sender_is_end_of_stream() {
        let (source, tx) = ChannelSource::new(4);
        drop(tx);
        assert!(source.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_source_reports_end_of_stream() {
        let (source, _tx) = ChannelSource::new(4);
        source.close().await;
        assert!(!source.ready());
        assert!(source.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sink_delivers_and_reports_overflow() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.write(Bytes::from_static(b"a")).await.unwrap();
        let err = sink.write(Bytes::from_static(b"b")).await.unwrap_err();
        assert!(matches!(err, PortError::SinkWrite(_)));

        assert_eq!(rx.recv().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn closed_sink_rejects_writes() {
        let (sink, _rx) = ChannelSink::new(4);
        sink.close().await;
        assert!(!sink.ready());
        assert!(matches!(
            sink.write(Bytes::new()).await,
            Err(PortError::Disconnected(_))
        ));
    }
}
