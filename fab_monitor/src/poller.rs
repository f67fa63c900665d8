//! Register poller: the single producer for one equipment instance.
//!
//! Each cycle reads the process span and the bit span in one
//! [`RegisterTransport::read_regions`] call, decodes outside any lock, swaps
//! the snapshot and publishes on change. A transport failure in either span
//! abandons the whole cycle, so a half-read block never becomes a snapshot.
//!
//! Whether the two spans come from the same instant depends on the transport.
//! The in-memory bank serves a batch under one lock; a transport using the
//! default per-span requests can return spans from either side of a
//! concurrent write.

use std::sync::Arc;
use std::time::Duration;

use fab_common::codec::{CodecError, StateCodec};
use fab_common::consts::{DEFAULT_MAX_BACKOFF_MS, DEFAULT_POLL_INTERVAL_MS};
use fab_common::layout::Region;
use fab_common::transport::{RegisterTransport, TransferError, TransportError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::publisher::{ChangePublisher, PublishReport};
use crate::store::SnapshotStore;

/// Poll cycle failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// A region read failed.
    #[error("{region} read failed: {source}")]
    Transport {
        /// Region being read.
        region: Region,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },

    /// The block read could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<TransferError> for PollError {
    fn from(e: TransferError) -> Self {
        Self::Transport {
            region: e.region,
            source: e.source,
        }
    }
}

/// Poll timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay between successful cycles.
    pub poll_interval: Duration,
    /// Ceiling for the doubled delay after failures.
    pub max_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

/// Result of a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Sequence assigned to the new snapshot.
    pub sequence: u64,
    /// Whether the state differed from the previous snapshot.
    pub changed: bool,
    /// Fan-out result.
    pub report: PublishReport,
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Cycles attempted.
    pub cycles: u64,
    /// Cycles abandoned for any reason.
    pub failures: u64,
    /// Cycles abandoned because the block was too short to decode.
    pub out_of_range: u64,
    /// Snapshots that went out to subscribers.
    pub published: u64,
}

/// Polls one equipment instance through its transport.
pub struct RegisterPoller<T: RegisterTransport> {
    name: String,
    transport: T,
    codec: StateCodec,
    store: Arc<SnapshotStore>,
    publisher: Arc<ChangePublisher>,
    config: PollerConfig,
    stats: PollerStats,
    registers: Vec<u16>,
}

impl<T: RegisterTransport> RegisterPoller<T> {
    /// Wire a poller. The store should be the one `publisher` reads from.
    pub fn new(
        name: impl Into<String>,
        transport: T,
        codec: StateCodec,
        store: Arc<SnapshotStore>,
        publisher: Arc<ChangePublisher>,
        config: PollerConfig,
    ) -> Self {
        let registers = vec![0; codec.layout().required_len()];
        Self {
            name: name.into(),
            transport,
            codec,
            store,
            publisher,
            config,
            stats: PollerStats::default(),
            registers,
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> PollerStats {
        self.stats
    }

    /// Run one read → decode → update → publish cycle.
    pub fn poll_once(&mut self) -> Result<PollOutcome, PollError> {
        self.stats.cycles += 1;
        let result = self.cycle();
        match &result {
            Ok(outcome) if outcome.report.published => self.stats.published += 1,
            Ok(_) => {}
            Err(PollError::Codec(e)) => {
                self.stats.failures += 1;
                if matches!(e, CodecError::OutOfRange { .. }) {
                    self.stats.out_of_range += 1;
                }
                error!("{}: decode failed: {}", self.name, e);
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!("{}: poll cycle abandoned: {}", self.name, e);
            }
        }
        result
    }

    fn cycle(&mut self) -> Result<PollOutcome, PollError> {
        let layout = Arc::clone(self.codec.layout());
        let spans: Vec<_> = [Region::Process, Region::Bit]
            .into_iter()
            .filter_map(|region| layout.span(region).map(|span| (region, span)))
            .collect();
        // Read both regions before touching the working block.
        let blocks = self.transport.read_regions(&spans)?;
        // Overriding transports are not bound by `read_span`'s length check.
        for (i, &(region, span)) in spans.iter().enumerate() {
            let actual = blocks.get(i).map_or(0, Vec::len);
            if actual != span.count {
                return Err(PollError::Transport {
                    region,
                    source: TransportError::ShortRead {
                        expected: span.count,
                        actual,
                    },
                });
            }
        }
        for ((_, span), words) in spans.iter().zip(blocks) {
            self.registers[span.start as usize..span.end()].copy_from_slice(&words);
        }

        let state = self.codec.decode(&self.registers)?;
        let update = self.store.update(state);
        let report = self.publisher.publish_if_changed();
        debug!(
            "{}: snapshot #{} changed={} delivered={}",
            self.name, update.snapshot.sequence, update.changed, report.delivered
        );
        Ok(PollOutcome {
            sequence: update.snapshot.sequence,
            changed: update.changed,
            report,
        })
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    ///
    /// Failed cycles double the delay up to `max_backoff`; a success resets
    /// it to `poll_interval`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PollerStats {
        info!(
            "📡 Poller '{}' started ({}, every {:?})",
            self.name,
            self.codec.layout().id(),
            self.config.poll_interval
        );
        let mut delay = self.config.poll_interval;

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }
            delay = match self.poll_once() {
                Ok(_) => self.config.poll_interval,
                Err(_) => (delay * 2).min(self.config.max_backoff),
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            "🛑 Poller '{}' stopped: cycles={} failures={} published={}",
            self.name, self.stats.cycles, self.stats.failures, self.stats.published
        );
        self.stats
    }
}
