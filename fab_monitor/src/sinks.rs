//! Snapshot sinks: where published snapshots go.
//!
//! A sink must never block the publisher. Latest-value viewers use
//! [`WatchSink`], queue consumers use [`ChannelSink`], audit trails use
//! [`RecorderSink`].

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::store::Snapshot;

/// Per-subscriber delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The receiving side is gone; the sink is removed.
    #[error("subscriber closed")]
    Closed,

    /// The subscriber is behind; this snapshot is skipped.
    #[error("subscriber queue full")]
    Full,

    /// Delivery failed for another reason; the sink is removed.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Receiver of published snapshots.
pub trait SnapshotSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Hand over one snapshot without blocking.
    fn send(&self, snapshot: &Arc<Snapshot>) -> Result<(), SinkError>;
}

// ─── Watch ──────────────────────────────────────────────────────────

/// Latest-value sink. Slow viewers skip intermediate snapshots but never
/// see them out of order.
#[derive(Debug)]
pub struct WatchSink {
    name: String,
    tx: watch::Sender<Option<Arc<Snapshot>>>,
}

/// Receiving side of a [`WatchSink`]. Dropping it closes the sink.
#[derive(Debug)]
pub struct SnapshotSubscription {
    rx: watch::Receiver<Option<Arc<Snapshot>>>,
}

impl WatchSink {
    /// Create a sink and its subscription, optionally seeded with a snapshot.
    pub fn channel(
        name: impl Into<String>,
        initial: Option<Arc<Snapshot>>,
    ) -> (Self, SnapshotSubscription) {
        let (tx, rx) = watch::channel(initial);
        (
            Self {
                name: name.into(),
                tx,
            },
            SnapshotSubscription { rx },
        )
    }
}

impl SnapshotSink for WatchSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, snapshot: &Arc<Snapshot>) -> Result<(), SinkError> {
        self.tx
            .send(Some(Arc::clone(snapshot)))
            .map_err(|_| SinkError::Closed)
    }
}

impl SnapshotSubscription {
    /// Latest snapshot seen so far, without waiting.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.rx.borrow().clone()
    }

    /// Wait for a snapshot newer than the last one returned. `None` once the
    /// sink is dropped.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(snapshot) = self.rx.borrow_and_update().clone() {
                return Some(snapshot);
            }
        }
    }
}

// ─── Bounded Channel ────────────────────────────────────────────────

/// Bounded queue sink. A full queue skips the snapshot.
#[derive(Debug)]
pub struct ChannelSink {
    name: String,
    tx: mpsc::Sender<Arc<Snapshot>>,
}

impl ChannelSink {
    /// Create a sink with room for `capacity` pending snapshots.
    pub fn channel(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<Snapshot>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                tx,
            },
            rx,
        )
    }
}

impl SnapshotSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, snapshot: &Arc<Snapshot>) -> Result<(), SinkError> {
        self.tx
            .try_send(Arc::clone(snapshot))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SinkError::Full,
                mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
            })
    }
}

// ─── Recorder ───────────────────────────────────────────────────────

/// Writes one JSON line per snapshot to any writer.
pub struct RecorderSink<W: Write + Send> {
    name: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> RecorderSink<W> {
    /// Record into `writer`.
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> SnapshotSink for RecorderSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, snapshot: &Arc<Snapshot>) -> Result<(), SinkError> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, &snapshot.to_message())
            .map_err(|e| SinkError::Failed(e.to_string()))?;
        writer
            .write_all(b"\n")
            .and_then(|()| writer.flush())
            .map_err(|e| SinkError::Failed(e.to_string()))
    }
}
