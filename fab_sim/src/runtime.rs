//! Process wiring: one bank, simulator, poller, store and publisher per
//! configured equipment, plus the shared viewer socket.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fab_common::alarm::{AlarmCatalog, CatalogError};
use fab_common::codec::StateCodec;
use fab_common::config::ConfigError;
use fab_common::layout::LayoutError;
use fab_monitor::{ChangePublisher, PollerStats, RegisterPoller, SnapshotStore, ViewerServer};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::actuator::Actuator;
use crate::bank::{BankHandle, RegisterBank};
use crate::config::{EquipmentConfig, SimConfig};
use crate::generator::{EquipmentSimulator, PinHandle, StateGenerator};

/// Startup failure.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An equipment layout could not be built.
    #[error("equipment '{name}': {source}")]
    Layout {
        /// Equipment name.
        name: String,
        /// Underlying failure.
        #[source]
        source: LayoutError,
    },

    /// An equipment alarm catalog could not be built.
    #[error("equipment '{name}': {source}")]
    Catalog {
        /// Equipment name.
        name: String,
        /// Underlying failure.
        #[source]
        source: CatalogError,
    },

    /// The viewer socket could not be bound.
    #[error("viewer socket {path:?}: {source}")]
    Viewer {
        /// Socket path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

// ─── Equipment ──────────────────────────────────────────────────────

/// Cloneable access to one running equipment instance.
#[derive(Clone)]
pub struct EquipmentHandle {
    /// Instance name.
    pub name: String,
    /// Codec for the instance's layout.
    pub codec: StateCodec,
    /// Register memory.
    pub bank: RegisterBank,
    /// Latest decoded snapshots.
    pub store: Arc<SnapshotStore>,
    /// Change fan-out.
    pub publisher: Arc<ChangePublisher>,
    /// Values the simulator keeps fixed.
    pub pins: PinHandle,
}

impl EquipmentHandle {
    /// Actuator writing into this instance's bank.
    pub fn actuator(&self) -> Actuator<BankHandle> {
        Actuator::new(self.codec.clone(), self.bank.handle())
    }

    /// Emergency stop that stays latched: the written fields are pinned so
    /// later simulator steps keep them.
    pub fn latch_emergency_stop(&self) {
        match self.actuator().emergency_stop() {
            Ok(report) => {
                self.pins.pin(&report.applied);
                if !report.skipped.is_empty() {
                    info!("'{}' has no {:?}", self.name, report.skipped);
                }
            }
            Err(e) => error!("Emergency stop on '{}' failed: {}", self.name, e),
        }
    }
}

struct Tasks {
    simulator: EquipmentSimulator<BankHandle>,
    poller: RegisterPoller<BankHandle>,
}

/// Per-equipment result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentSummary {
    /// Instance name.
    pub name: String,
    /// Simulator steps written.
    pub simulator_steps: u64,
    /// Poller counters.
    pub poller: PollerStats,
}

// ─── SimRuntime ─────────────────────────────────────────────────────

/// Every configured instance, wired and ready to run.
pub struct SimRuntime {
    handles: Vec<EquipmentHandle>,
    tasks: Vec<Tasks>,
    viewer_socket: Option<PathBuf>,
}

impl SimRuntime {
    /// Validate `config` and build every instance. Layout files are
    /// resolved relative to `config_dir`.
    pub fn build(config: &SimConfig, config_dir: &Path) -> Result<Self, RuntimeError> {
        config.validate()?;
        let poller_config = config.monitor.poller();

        let mut handles = Vec::with_capacity(config.equipment.len());
        let mut tasks = Vec::with_capacity(config.equipment.len());
        for eq in &config.equipment {
            let codec = build_codec(eq, config_dir)?;
            eq.check_bank(codec.layout())?;

            let bank = RegisterBank::new(eq.bank_size);
            let store = Arc::new(SnapshotStore::new(eq.name.clone()));
            let publisher = Arc::new(ChangePublisher::new(Arc::clone(&store)));

            let generator = StateGenerator::new(codec.clone(), eq.simulator.seed);
            let simulator = EquipmentSimulator::new(eq.name.clone(), generator, bank.handle())
                .with_interval(Duration::from_millis(eq.simulator.update_interval_ms));
            let poller = RegisterPoller::new(
                eq.name.clone(),
                bank.handle(),
                codec.clone(),
                Arc::clone(&store),
                Arc::clone(&publisher),
                poller_config,
            );

            info!(
                "🏭 Equipment '{}': {} ({} fields, {} of {} words)",
                eq.name,
                codec.layout().id(),
                codec.layout().len(),
                codec.layout().required_len(),
                eq.bank_size
            );
            handles.push(EquipmentHandle {
                name: eq.name.clone(),
                codec,
                bank,
                store,
                publisher,
                pins: simulator.pins(),
            });
            tasks.push(Tasks { simulator, poller });
        }

        let viewer_socket = config
            .viewer
            .enabled
            .then(|| config.viewer.socket_path.clone());
        Ok(Self {
            handles,
            tasks,
            viewer_socket,
        })
    }

    /// Handles of every instance, in configuration order.
    pub fn handles(&self) -> &[EquipmentHandle] {
        &self.handles
    }

    /// Run until `shutdown` turns true. With `emergency_after`, every
    /// instance latches an emergency stop after that delay.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        emergency_after: Option<Duration>,
    ) -> Result<Vec<EquipmentSummary>, RuntimeError> {
        let viewer = match &self.viewer_socket {
            Some(path) => {
                let publishers = self.handles.iter().map(|h| Arc::clone(&h.publisher)).collect();
                let server =
                    ViewerServer::bind(path, publishers).map_err(|source| RuntimeError::Viewer {
                        path: path.clone(),
                        source,
                    })?;
                Some(tokio::spawn(server.run(shutdown.clone())))
            }
            None => None,
        };

        let mut running: Vec<(String, JoinHandle<u64>, JoinHandle<PollerStats>)> = Vec::new();
        for (handle, tasks) in self.handles.iter().zip(self.tasks) {
            let sim = tokio::spawn(tasks.simulator.run(shutdown.clone()));
            let poll = tokio::spawn(tasks.poller.run(shutdown.clone()));
            running.push((handle.name.clone(), sim, poll));
        }

        if let Some(delay) = emergency_after {
            let handles = self.handles.clone();
            let mut stop = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        info!("🚨 Emergency stop demo after {:?}", delay);
                        for handle in &handles {
                            handle.latch_emergency_stop();
                        }
                    }
                    _ = stop.changed() => {}
                }
            });
        }

        info!("🚀 Running {} equipment instance(s)", running.len());
        loop {
            let stopping = *shutdown.borrow();
            if stopping || shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("🛑 Shutting down...");

        let mut summaries = Vec::with_capacity(running.len());
        for (name, sim, poll) in running {
            let simulator_steps = sim.await.unwrap_or_else(|e| {
                warn!("Simulator task '{}' ended abnormally: {}", name, e);
                0
            });
            let poller = poll.await.unwrap_or_else(|e| {
                warn!("Poller task '{}' ended abnormally: {}", name, e);
                PollerStats::default()
            });
            summaries.push(EquipmentSummary {
                name,
                simulator_steps,
                poller,
            });
        }
        if let Some(viewer) = viewer {
            if let Err(e) = viewer.await {
                warn!("Viewer task ended abnormally: {}", e);
            }
        }

        info!("📊 Final statistics:");
        for s in &summaries {
            info!(
                "  - {}: steps={} cycles={} failures={} published={}",
                s.name, s.simulator_steps, s.poller.cycles, s.poller.failures, s.poller.published
            );
        }
        Ok(summaries)
    }
}

fn build_codec(eq: &EquipmentConfig, config_dir: &Path) -> Result<StateCodec, RuntimeError> {
    let layout = eq
        .load_layout(config_dir)
        .map_err(|source| RuntimeError::Layout {
            name: eq.name.clone(),
            source,
        })?;
    let catalog = AlarmCatalog::builtin(layout.kind()).map_err(|source| RuntimeError::Catalog {
        name: eq.name.clone(),
        source,
    })?;
    Ok(StateCodec::new(Arc::new(layout), Arc::new(catalog)))
}
