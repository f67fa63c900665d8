//! Change publisher under subscription churn.
//!
//! One thread keeps subscribing, unsubscribing and abandoning channel
//! sinks while the producer publishes; a long-lived sink must still see
//! every sequence exactly once and in order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use fab_common::prelude::*;
use fab_monitor::{ChangePublisher, ChannelSink, SinkError, Snapshot, SnapshotSink, SnapshotStore};
use parking_lot::Mutex;

const UPDATES: u64 = 5000;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<u64>>,
}

impl SnapshotSink for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn send(&self, snapshot: &Arc<Snapshot>) -> Result<(), SinkError> {
        self.seen.lock().push(snapshot.sequence);
        Ok(())
    }
}

fn state(code: u16) -> StructuredState {
    let mut fields = BTreeMap::new();
    fields.insert("status.alarm_code".to_string(), FieldValue::Integer(code));
    StructuredState {
        kind: EquipmentKind::Stocker,
        revision: "v1".to_string(),
        fields,
        alarm: None,
    }
}

#[test]
fn churn_does_not_reorder_or_drop_deliveries() {
    let store = Arc::new(SnapshotStore::new("st-01"));
    let publisher = Arc::new(ChangePublisher::new(Arc::clone(&store)));
    let recorder = Arc::new(Recorder::default());
    publisher.subscribe(Arc::clone(&recorder) as Arc<dyn SnapshotSink>);

    let stop = Arc::new(AtomicBool::new(false));
    let churn = {
        let publisher = Arc::clone(&publisher);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut live = Vec::new();
            let mut abandoned = Vec::new();
            let mut rounds = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let (sink, rx) = ChannelSink::channel(format!("churn-{rounds}"), 1);
                live.push((publisher.subscribe(Arc::new(sink)), rx));
                if live.len() > 4 {
                    let (id, rx) = live.remove(0);
                    if rounds % 2 == 0 {
                        publisher.unsubscribe(id);
                    } else {
                        // Closed channel: the next publish removes it.
                        drop(rx);
                        abandoned.push(id);
                    }
                }
                rounds += 1;
                thread::yield_now();
            }
            for (id, _) in live {
                publisher.unsubscribe(id);
            }
            for id in abandoned {
                publisher.unsubscribe(id);
            }
            rounds
        })
    };

    while publisher.subscriber_count() < 2 {
        thread::yield_now();
    }
    for code in 1..=UPDATES {
        let update = store.update(state(code as u16));
        assert!(update.changed);
        let report = publisher.publish_if_changed();
        assert!(report.published);
        assert_eq!(report.sequence, Some(code));
    }
    stop.store(true, Ordering::Relaxed);
    let rounds = churn.join().unwrap();

    assert!(rounds > 0);
    assert_eq!(publisher.subscriber_count(), 1);
    let seen = recorder.seen.lock().clone();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order delivery");
    assert_eq!(seen, (1..=UPDATES).collect::<Vec<_>>());
}
