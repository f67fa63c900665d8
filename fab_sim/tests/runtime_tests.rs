//! Simulator → bank → poller pipeline and the full runtime lifecycle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fab_common::prelude::*;
use fab_monitor::{ChangePublisher, PollerConfig, RegisterPoller, SnapshotStore};
use fab_sim::{EquipmentSimulator, RegisterBank, SimConfig, SimRuntime, StateGenerator};
use tokio::sync::watch;

fn codec(id: &str) -> StateCodec {
    let layout = Arc::new(builtin_layout(id).unwrap());
    let catalog = Arc::new(AlarmCatalog::builtin(layout.kind()).unwrap());
    StateCodec::new(layout, catalog)
}

#[test]
fn poller_decodes_what_simulator_wrote() {
    for id in builtin_layout_ids() {
        let bank = RegisterBank::new(300);
        let mut simulator =
            EquipmentSimulator::new(id, StateGenerator::new(codec(id), Some(11)), bank.handle());
        let mut expected = StateGenerator::new(codec(id), Some(11));

        let store = Arc::new(SnapshotStore::new(id));
        let publisher = Arc::new(ChangePublisher::new(Arc::clone(&store)));
        let mut poller = RegisterPoller::new(
            id,
            bank.handle(),
            codec(id),
            Arc::clone(&store),
            publisher,
            PollerConfig::default(),
        );

        for _ in 0..3 {
            simulator.step().unwrap();
            poller.poll_once().unwrap();
            let current = store.current().unwrap();
            assert_eq!(current.state, expected.generate(), "layout {id}");
        }
    }
}

#[test]
fn pinned_fields_survive_simulator_steps() {
    let bank = RegisterBank::new(300);
    let codec = codec("gas_cabinet/v1");
    let mut simulator = EquipmentSimulator::new(
        "gc",
        StateGenerator::new(codec.clone(), Some(2)),
        bank.handle(),
    );
    simulator
        .pins()
        .pin(&StateDelta::new().with("basic_signals.emg_signal", true));

    for _ in 0..10 {
        simulator.step().unwrap();
        let state = codec.decode(&bank.contents()).unwrap();
        assert_eq!(state.bool("basic_signals.emg_signal"), Some(true));
    }
}

#[test]
fn simulator_reports_small_bank_without_partial_write() {
    let bank = RegisterBank::new(150);
    let mut simulator = EquipmentSimulator::new(
        "gc",
        StateGenerator::new(codec("gas_cabinet/v2"), Some(2)),
        bank.handle(),
    );
    assert!(matches!(
        simulator.step(),
        Err(fab_sim::SimError::Transport {
            region: Region::Bit,
            source: TransportError::OutOfBounds { .. }
        })
    ));
    assert!(bank.contents().iter().all(|&w| w == 0), "process span written alone");
}

const CONFIG: &str = r#"
[shared]
service_name = "fab-sim-test"

[[equipment]]
name = "gc-01"
layout = "gas_cabinet/v2"
[equipment.simulator]
update_interval_ms = 5
seed = 1

[[equipment]]
name = "st-01"
layout = "stocker/v1"
[equipment.simulator]
update_interval_ms = 5
seed = 2

[monitor]
poll_interval_ms = 5
max_backoff_ms = 40

[viewer]
enabled = false
"#;

#[tokio::test]
async fn runtime_latches_emergency_stop() {
    let config = SimConfig::parse(CONFIG).unwrap();
    let runtime = SimRuntime::build(&config, Path::new(".")).unwrap();
    let handles = runtime.handles().to_vec();
    assert_eq!(handles.len(), 2);

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(runtime.run(rx, Some(Duration::from_millis(30))));

    let gc = &handles[0];
    let mut latched = false;
    for _ in 0..400 {
        if let Some(snapshot) = gc.store.current() {
            let state = &snapshot.state;
            let valves_closed = state
                .fields
                .iter()
                .filter(|(name, _)| name.starts_with("valves."))
                .all(|(_, v)| *v == FieldValue::Bool(false));
            if state.bool("basic_signals.emg_signal") == Some(true) && valves_closed {
                latched = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(latched, "emergency stop never reached the store");

    tx.send(true).unwrap();
    let summaries = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summaries.len(), 2);
    for s in &summaries {
        assert!(s.simulator_steps > 0, "{}", s.name);
        assert!(s.poller.published > 0, "{}", s.name);
    }
}

#[test]
fn runtime_rejects_invalid_config() {
    let mut config = SimConfig::parse(CONFIG).unwrap();
    config.equipment[1].name = "gc-01".to_string();
    assert!(matches!(
        SimRuntime::build(&config, Path::new(".")),
        Err(fab_sim::RuntimeError::Config(_))
    ));
}

#[test]
fn runtime_reads_layout_file_relative_to_config() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("tiny.toml"),
        r#"
kind = "stocker"
revision = "t1"

[[process]]
address = 0
fields = ["stocker_id"]

[[status_word]]
group = "basic_signals"
address = 4
bits = ["emg_signal"]
"#,
    )
    .unwrap();

    let mut config = SimConfig::parse(CONFIG).unwrap();
    config.equipment.truncate(1);
    config.equipment[0].layout = None;
    config.equipment[0].layout_file = Some("tiny.toml".into());
    config.equipment[0].bank_size = 5;

    let runtime = SimRuntime::build(&config, dir.path()).unwrap();
    let codec = &runtime.handles()[0].codec;
    assert_eq!(codec.layout().id(), "stocker/t1");
    assert_eq!(codec.layout().required_len(), 5);
}
