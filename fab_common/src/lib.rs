//! Fab Common Library
//!
//! Shared building blocks for the fab equipment workspace: register layouts,
//! alarm catalogs, the register-mapped state codec and the transport seam.
//!
//! # Module Structure
//!
//! - [`layout`] - Versioned register layouts (field descriptor tables)
//! - [`alarm`] - Alarm code catalogs per equipment kind
//! - [`codec`] - Register array ↔ structured state conversion
//! - [`transport`] - Register transport trait
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Codec limits and runtime defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use fab_common::prelude::*;
//!
//! let layout = Arc::new(builtin_layout("gas_cabinet/v1").unwrap());
//! let catalog = Arc::new(AlarmCatalog::builtin(layout.kind()).unwrap());
//! let codec = StateCodec::new(layout.clone(), catalog);
//! let state = codec.decode(&vec![0u16; layout.required_len()]).unwrap();
//! assert_eq!(state.bool("valves.av1a"), Some(false));
//! ```

#![warn(missing_docs)]

pub mod alarm;
pub mod codec;
pub mod config;
pub mod consts;
pub mod layout;
pub mod prelude;
pub mod transport;
