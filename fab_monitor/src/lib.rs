//! Fab Monitor
//!
//! Producer/consumer plumbing for decoded equipment state: one
//! [`RegisterPoller`] per equipment instance feeds a [`SnapshotStore`];
//! a [`ChangePublisher`] fans changed snapshots out to any number of
//! [`SnapshotSink`]s such as live viewers and recorders.
//!
//! # Module Structure
//!
//! - [`store`] - Current/previous snapshot pair
//! - [`publisher`] - Change detection and fan-out
//! - [`sinks`] - Subscriber trait and built-in sinks
//! - [`poller`] - Transport → codec → store → publisher cycle
//! - [`viewer`] - Unix socket stream of snapshots

#![warn(missing_docs)]

pub mod poller;
pub mod publisher;
pub mod sinks;
pub mod store;
pub mod viewer;

pub use poller::{PollError, PollOutcome, PollerConfig, PollerStats, RegisterPoller};
pub use publisher::{ChangePublisher, PublishReport, SubscriberId};
pub use sinks::{
    ChannelSink, RecorderSink, SinkError, SnapshotSink, SnapshotSubscription, WatchSink,
};
pub use store::{Snapshot, SnapshotStore, UpdateOutcome};
pub use viewer::ViewerServer;
