//! Alarm-code taxonomy.
//!
//! Each equipment kind has its own catalog mapping a numeric code to a
//! category and a message. Resolution never fails: codes missing from the
//! catalog resolve to a sentinel entry.

pub mod catalog;

pub use catalog::{
    AlarmCatalog, AlarmEntry, AlarmResolution, CatalogError, UNKNOWN_CATEGORY, UNKNOWN_MESSAGE,
};
