//! Register-mapped state codec.
//!
//! Converts between the flat `u16` register array and a [`StructuredState`],
//! driven entirely by a [`RegisterLayout`]. Decoding is total over any array
//! at least [`RegisterLayout::required_len`] words long. Encoding is
//! read-modify-write: bits a delta does not name keep their current value.

mod decode;
mod encode;
pub mod value;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::alarm::AlarmCatalog;
use crate::layout::RegisterLayout;

pub use value::{FieldValue, StateDelta, StructuredState};

// ─── Error Types ────────────────────────────────────────────────────

/// Codec error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The register array does not reach a field.
    #[error("field '{field}' needs {required} registers, only {available} available")]
    OutOfRange {
        /// First field that does not fit.
        field: String,
        /// Array length the field needs.
        required: usize,
        /// Array length supplied.
        available: usize,
    },

    /// The name is not part of the layout.
    #[error("unknown field '{name}'")]
    UnknownField {
        /// Requested name.
        name: String,
    },

    /// The value does not fit the field.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// What is wrong with the value.
        reason: String,
    },

    /// A full encode found no value for a layout field.
    #[error("state has no value for field '{name}'")]
    MissingField {
        /// Field name.
        name: String,
    },

    /// The state was produced by a different layout.
    #[error("state belongs to layout '{found}', codec uses '{expected}'")]
    LayoutMismatch {
        /// Codec layout id.
        expected: String,
        /// Layout id recorded in the state.
        found: String,
    },
}

// ─── Write Plan ─────────────────────────────────────────────────────

/// One word to write back to the equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterWrite {
    /// Word address.
    pub address: u16,
    /// Full word value after applying the delta.
    pub value: u16,
}

/// Result of encoding a delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedWrites {
    /// One write per touched word, ascending by address.
    pub writes: Vec<RegisterWrite>,
    /// Fields that could not be encoded, with the reason.
    pub rejected: Vec<(String, CodecError)>,
}

impl EncodedWrites {
    /// Whether every field of the delta was encoded.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

// ─── StateCodec ─────────────────────────────────────────────────────

/// Layout-driven encoder/decoder. Cheap to clone; shares layout and catalog.
#[derive(Debug, Clone)]
pub struct StateCodec {
    layout: Arc<RegisterLayout>,
    catalog: Arc<AlarmCatalog>,
}

impl StateCodec {
    /// Pair a layout with the alarm catalog used to resolve its alarm field.
    pub fn new(layout: Arc<RegisterLayout>, catalog: Arc<AlarmCatalog>) -> Self {
        if layout.kind() != catalog.kind() {
            warn!(
                "Layout {} paired with {} alarm catalog",
                layout.id(),
                catalog.kind()
            );
        }
        Self { layout, catalog }
    }

    /// Layout in use.
    pub fn layout(&self) -> &Arc<RegisterLayout> {
        &self.layout
    }

    /// Alarm catalog in use.
    pub fn catalog(&self) -> &Arc<AlarmCatalog> {
        &self.catalog
    }
}
