//! Prelude module for common re-exports.
//!
//! `use fab_common::prelude::*;` brings in the types most consumers need.

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};

// ─── Layouts ────────────────────────────────────────────────────────
pub use crate::layout::{
    EquipmentKind, LayoutError, Region, RegisterField, RegisterLayout, RegisterSpan, ValueKind,
    builtin_layout, builtin_layout_ids,
};

// ─── Alarms ─────────────────────────────────────────────────────────
pub use crate::alarm::{AlarmCatalog, AlarmResolution, CatalogError};

// ─── Codec ──────────────────────────────────────────────────────────
pub use crate::codec::{
    CodecError, EncodedWrites, FieldValue, RegisterWrite, StateCodec, StateDelta,
    StructuredState,
};

// ─── Transport ──────────────────────────────────────────────────────
pub use crate::transport::{RegisterTransport, TransferError, TransportError};
