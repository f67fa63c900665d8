//! Snapshot store: current and previous decoded state of one equipment.
//!
//! `EMPTY → HAS_SNAPSHOT` on the first update, then `HAS_SNAPSHOT →
//! HAS_SNAPSHOT` on every later one, archiving the displaced value as
//! `previous`. The pointer swap is the only critical section; the structural
//! comparison runs after the lock is released.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use fab_common::codec::StructuredState;
use parking_lot::Mutex;
use serde_json::{Value, json};

/// Immutable decoded state with its position in the update sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Equipment instance name.
    pub equipment: String,
    /// Decoded state.
    pub state: StructuredState,
    /// Strictly increasing per store, starting at 1.
    pub sequence: u64,
    /// Wall-clock capture time.
    pub captured_at: SystemTime,
}

impl Snapshot {
    /// Capture time as milliseconds since the Unix epoch.
    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Wire form sent to viewers and recorders.
    pub fn to_message(&self) -> Value {
        json!({
            "equipment": self.equipment,
            "sequence": self.sequence,
            "captured_at_ms": self.captured_at_ms(),
            "state": self.state.to_tree(),
        })
    }
}

/// Result of [`SnapshotStore::update`].
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Snapshot that became current.
    pub snapshot: Arc<Snapshot>,
    /// Whether it differs from the snapshot it displaced. True on the first
    /// update.
    pub changed: bool,
}

#[derive(Debug, Default)]
struct Slots {
    current: Option<Arc<Snapshot>>,
    previous: Option<Arc<Snapshot>>,
    last_sequence: u64,
}

/// Current/previous snapshot pair for one equipment instance.
#[derive(Debug)]
pub struct SnapshotStore {
    equipment: String,
    slots: Mutex<Slots>,
}

impl SnapshotStore {
    /// Empty store for `equipment`.
    pub fn new(equipment: impl Into<String>) -> Self {
        Self {
            equipment: equipment.into(),
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Equipment instance name.
    pub fn equipment(&self) -> &str {
        &self.equipment
    }

    /// Install `state` as current and archive the displaced snapshot.
    pub fn update(&self, state: StructuredState) -> UpdateOutcome {
        let captured_at = SystemTime::now();
        let (snapshot, displaced) = {
            let mut slots = self.slots.lock();
            slots.last_sequence += 1;
            let snapshot = Arc::new(Snapshot {
                equipment: self.equipment.clone(),
                state,
                sequence: slots.last_sequence,
                captured_at,
            });
            let displaced = slots.current.replace(Arc::clone(&snapshot));
            slots.previous = displaced.clone();
            (snapshot, displaced)
        };

        let changed = displaced.is_none_or(|prev| prev.state != snapshot.state);
        UpdateOutcome { snapshot, changed }
    }

    /// Latest snapshot; `None` while empty.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.slots.lock().current.clone()
    }

    /// Snapshot displaced by the latest update.
    pub fn previous(&self) -> Option<Arc<Snapshot>> {
        self.slots.lock().previous.clone()
    }

    /// Both slots, read atomically.
    pub fn pair(&self) -> (Option<Arc<Snapshot>>, Option<Arc<Snapshot>>) {
        let slots = self.slots.lock();
        (slots.current.clone(), slots.previous.clone())
    }

    /// Whether no update has happened yet.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().current.is_none()
    }

    /// Whether the current state differs from the previous one. True after
    /// the first update, false while empty.
    pub fn changed_since_last(&self) -> bool {
        match self.pair() {
            (Some(current), Some(previous)) => current.state != previous.state,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}
