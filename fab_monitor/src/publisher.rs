//! Change publisher: fans a snapshot out to subscribers only when it differs
//! from the one before it.
//!
//! Subscribers may come and go while a publish is running; delivery works
//! on a copy of the list taken under a read lock. A failing sink is removed
//! without affecting the others or the producer.
//!
//! No lock is held while sinks run. A sequence is claimed at most once, but
//! two threads publishing at the same time may deliver out of order, so each
//! store is expected to have a single producer (its poller).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::sinks::{SinkError, SnapshotSink};
use crate::store::SnapshotStore;

/// Handle returned by [`ChangePublisher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// What one [`ChangePublisher::publish_if_changed`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Whether a snapshot went out.
    pub published: bool,
    /// Sequence of the published snapshot.
    pub sequence: Option<u64>,
    /// Sinks that accepted it.
    pub delivered: usize,
    /// Sinks that were full and skipped it.
    pub skipped: usize,
    /// Sinks removed after a hard failure.
    pub removed: usize,
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriberId,
    sink: Arc<dyn SnapshotSink>,
}

/// Publishes the store's current snapshot on change.
pub struct ChangePublisher {
    store: Arc<SnapshotStore>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    // Highest sequence claimed for delivery.
    last_published: Mutex<u64>,
}

impl ChangePublisher {
    /// Publisher over `store`.
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            last_published: Mutex::new(0),
        }
    }

    /// Store this publisher reads from.
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Register a sink. Takes effect from the next publish.
    pub fn subscribe(&self, sink: Arc<dyn SnapshotSink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("Subscriber '{}' added to {}", sink.name(), self.store.equipment());
        self.subscribers.write().push(Subscriber { id, sink });
        id
    }

    /// Remove a sink. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Number of registered sinks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver the current snapshot if it differs from the previous one and
    /// has not gone out yet.
    pub fn publish_if_changed(&self) -> PublishReport {
        let (Some(current), previous) = self.store.pair() else {
            return PublishReport::default();
        };

        {
            let mut last = self.last_published.lock();
            if current.sequence <= *last {
                return PublishReport::default();
            }
            if previous.is_some_and(|prev| prev.state == current.state) {
                return PublishReport::default();
            }
            *last = current.sequence;
        }

        let targets: Vec<Subscriber> = self.subscribers.read().clone();
        let mut report = PublishReport {
            published: true,
            sequence: Some(current.sequence),
            ..PublishReport::default()
        };
        let mut dead = Vec::new();

        for sub in &targets {
            match sub.sink.send(&current) {
                Ok(()) => report.delivered += 1,
                Err(SinkError::Full) => {
                    debug!(
                        "Subscriber '{}' is behind, skipped snapshot #{}",
                        sub.sink.name(),
                        current.sequence
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        "Removing subscriber '{}' from {}: {}",
                        sub.sink.name(),
                        self.store.equipment(),
                        e
                    );
                    dead.push(sub.id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subs = self.subscribers.write();
            let before = subs.len();
            subs.retain(|s| !dead.contains(&s.id));
            report.removed = before - subs.len();
        }
        report
    }
}
