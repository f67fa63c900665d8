//! Register layouts (descriptor tables for equipment register blocks).
//!
//! A [`RegisterLayout`] is the only place field addresses live. Encode and
//! decode consult it generically; nothing else hard-codes offsets.
//!
//! Layouts are versioned per equipment kind. Built-in revisions ship as TOML
//! under `layouts/` and are selected by id, or a custom file can be loaded
//! with [`RegisterLayout::load`].

pub mod builtin;
pub mod config;
pub mod field;
pub mod registry;

pub use builtin::{builtin_layout, builtin_layout_ids};
pub use config::LayoutConfig;
pub use field::{EquipmentKind, Region, RegisterField, ValueKind};
pub use registry::{LayoutError, RegisterLayout, RegisterSpan};
