//! # Fab Sim
//!
//! Simulated gas cabinets and stockers with the monitoring pipeline wired
//! in: each configured instance gets an in-memory register bank, a
//! simulator writing random layout-valid states into it, and a poller
//! decoding the bank into snapshots for live viewers.
//!
//! # Module Structure
//!
//! - [`bank`] - Shared register memory implementing `RegisterTransport`
//! - [`generator`] - Random state generation and the simulator loop
//! - [`actuator`] - Read-modify-write commands (emergency stop, gas supply)
//! - [`config`] - `fab_sim.toml` types and validation
//! - [`runtime`] - Per-equipment wiring and task lifecycle
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐ write  ┌──────────────┐  read  ┌────────────────┐
//! │ Simulator │───────►│ RegisterBank │◄───────│ RegisterPoller │
//! └───────────┘        └──────▲───────┘        └───────┬────────┘
//!                             │ read-modify-write      │ snapshot
//!                      ┌──────┴───────┐        ┌───────▼────────┐
//!                      │   Actuator   │        │ Store/Publisher│──► viewers
//!                      └──────────────┘        └────────────────┘
//! ```

#![warn(missing_docs)]

pub mod actuator;
pub mod bank;
pub mod config;
pub mod generator;
pub mod runtime;

pub use actuator::{ActuationError, ActuationReport, Actuator, Port};
pub use bank::{BankHandle, RegisterBank};
pub use config::{EquipmentConfig, MonitorConfig, SimConfig, SimulatorConfig, ViewerConfig};
pub use generator::{EquipmentSimulator, PinHandle, SimError, StateGenerator};
pub use runtime::{EquipmentHandle, EquipmentSummary, RuntimeError, SimRuntime};
