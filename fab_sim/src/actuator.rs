//! Command path back to the equipment.
//!
//! An [`Actuator`] reads the current words of both regions, encodes a
//! delta against them so untouched bits survive, and writes back only the
//! words that changed. Commands name fields by layout path; fields a
//! revision does not define are reported as skipped, which lets one
//! command work across layout revisions.

use fab_common::codec::{CodecError, RegisterWrite, StateCodec, StateDelta};
use fab_common::layout::{Region, ValueKind};
use fab_common::transport::{RegisterTransport, TransferError, TransportError};
use thiserror::Error;
use tracing::{info, warn};

/// Emergency stop flag.
pub const EMERGENCY_FIELD: &str = "basic_signals.emg_signal";

/// Group holding every valve bit.
pub const VALVE_PREFIX: &str = "valves.";

/// Supply valves per port, `av1` to `av5`.
const SUPPLY_VALVES: u8 = 5;

/// Cylinder port of a gas cabinet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// Port A.
    A,
    /// Port B.
    B,
}

impl Port {
    fn suffix(self) -> char {
        match self {
            Self::A => 'a',
            Self::B => 'b',
        }
    }

    /// `gas_supply` flag of this port's operation word.
    pub fn gas_supply_field(self) -> String {
        format!("port_{}.operation.gas_supply", self.suffix())
    }

    /// Supply valve fields of this port.
    pub fn valve_fields(self) -> impl Iterator<Item = String> {
        (1..=SUPPLY_VALVES).map(move |n| format!("{VALVE_PREFIX}av{n}{}", self.suffix()))
    }
}

/// Actuation failure. Per-field problems are not errors; they land in
/// [`ActuationReport::rejected`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuationError {
    /// Reading the baseline or writing a run failed.
    #[error("{region} transfer failed: {source}")]
    Transport {
        /// Region being transferred.
        region: Region,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },

    /// The encoder produced a write for a word no field maps.
    #[error("write to unmapped word {address}")]
    Unmapped {
        /// Word address.
        address: u16,
    },
}

impl From<TransferError> for ActuationError {
    fn from(e: TransferError) -> Self {
        Self::Transport {
            region: e.region,
            source: e.source,
        }
    }
}

/// What a command did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActuationReport {
    /// Field values that were written.
    pub applied: StateDelta,
    /// Words written, ascending by address.
    pub writes: Vec<RegisterWrite>,
    /// Fields that could not be encoded.
    pub rejected: Vec<(String, CodecError)>,
    /// Command fields the layout does not define.
    pub skipped: Vec<String>,
}

/// Writes field-level commands through a register transport.
pub struct Actuator<T: RegisterTransport> {
    codec: StateCodec,
    transport: T,
}

impl<T: RegisterTransport> Actuator<T> {
    /// Actuator for the equipment behind `transport`.
    pub fn new(codec: StateCodec, transport: T) -> Self {
        Self { codec, transport }
    }

    /// Apply `delta` with read-modify-write.
    ///
    /// # Errors
    ///
    /// [`ActuationError::Transport`] if the baseline read or the write batch
    /// fails. Whether runs before the failing one stay applied depends on the
    /// transport; the in-memory bank applies all or none.
    pub fn apply(&mut self, delta: &StateDelta) -> Result<ActuationReport, ActuationError> {
        if delta.is_empty() {
            return Ok(ActuationReport::default());
        }
        let baseline = self.read_baseline()?;
        let encoded = self.codec.encode(delta, Some(baseline.as_slice()));

        let mut applied = StateDelta::new();
        for (name, value) in delta.iter() {
            if !encoded.rejected.iter().any(|(r, _)| r == name) {
                applied.set(name, value.clone());
            }
        }
        for (name, e) in &encoded.rejected {
            warn!("Command field '{}' rejected: {}", name, e);
        }

        let runs = self.runs(&encoded.writes)?;
        let blocks: Vec<(Region, u16, &[u16])> = runs
            .iter()
            .map(|(region, start, values)| (*region, *start, values.as_slice()))
            .collect();
        self.transport.write_regions(&blocks)?;

        Ok(ActuationReport {
            applied,
            writes: encoded.writes,
            rejected: encoded.rejected,
            skipped: Vec::new(),
        })
    }

    /// Raise the emergency signal and close every valve.
    pub fn emergency_stop(&mut self) -> Result<ActuationReport, ActuationError> {
        let layout = self.codec.layout();
        let mut names = vec![EMERGENCY_FIELD.to_string()];
        names.extend(
            layout
                .all_fields()
                .iter()
                .filter(|f| f.kind == ValueKind::Boolean && f.name.starts_with(VALVE_PREFIX))
                .map(|f| f.name.clone()),
        );

        let report = self.command(names, |name| name == EMERGENCY_FIELD)?;
        info!(
            "🚨 Emergency stop on {}: {} fields written",
            self.codec.layout().id(),
            report.applied.len()
        );
        Ok(report)
    }

    /// Stop gas supply on `port`: clear its supply flag and supply valves.
    pub fn stop_gas_supply(&mut self, port: Port) -> Result<ActuationReport, ActuationError> {
        let mut names = vec![port.gas_supply_field()];
        names.extend(port.valve_fields());
        let report = self.command(names, |_| false)?;
        info!(
            "⛔ Gas supply stopped on {:?} ({}): {} fields written",
            port,
            self.codec.layout().id(),
            report.applied.len()
        );
        Ok(report)
    }

    /// Build a boolean delta from `names`, skipping fields the layout lacks.
    fn command(
        &mut self,
        names: Vec<String>,
        set: impl Fn(&str) -> bool,
    ) -> Result<ActuationReport, ActuationError> {
        let layout = self.codec.layout();
        let mut delta = StateDelta::new();
        let mut skipped = Vec::new();
        for name in names {
            if layout.contains(&name) {
                let value = set(&name);
                delta.set(name, value);
            } else {
                skipped.push(name);
            }
        }
        let mut report = self.apply(&delta)?;
        report.skipped = skipped;
        Ok(report)
    }

    /// Current words of both spans in a full-length image. Gaps stay zero.
    fn read_baseline(&mut self) -> Result<Vec<u16>, ActuationError> {
        let layout = self.codec.layout();
        let spans: Vec<_> = [Region::Process, Region::Bit]
            .into_iter()
            .filter_map(|region| layout.span(region).map(|span| (region, span)))
            .collect();
        let blocks = self.transport.read_regions(&spans)?;
        let mut image = vec![0u16; layout.required_len()];
        for (i, &(region, span)) in spans.iter().enumerate() {
            let words = blocks.get(i).map_or(&[][..], Vec::as_slice);
            if words.len() != span.count {
                return Err(ActuationError::Transport {
                    region,
                    source: TransportError::ShortRead {
                        expected: span.count,
                        actual: words.len(),
                    },
                });
            }
            image[span.start as usize..span.end()].copy_from_slice(words);
        }
        Ok(image)
    }

    /// Group writes into contiguous same-region block writes.
    fn runs(
        &self,
        writes: &[RegisterWrite],
    ) -> Result<Vec<(Region, u16, Vec<u16>)>, ActuationError> {
        let layout = self.codec.layout();
        let mut runs: Vec<(Region, u16, Vec<u16>)> = Vec::new();
        for write in writes {
            let region = layout
                .region_at(write.address)
                .ok_or(ActuationError::Unmapped {
                    address: write.address,
                })?;
            match runs.last_mut() {
                Some((r, start, values))
                    if *r == region
                        && *start as usize + values.len() == write.address as usize =>
                {
                    values.push(write.value)
                }
                _ => runs.push((region, write.address, vec![write.value])),
            }
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_field_names() {
        assert_eq!(Port::A.gas_supply_field(), "port_a.operation.gas_supply");
        let valves: Vec<_> = Port::B.valve_fields().collect();
        assert_eq!(valves.len(), 5);
        assert_eq!(valves[0], "valves.av1b");
        assert_eq!(valves[4], "valves.av5b");
    }
}
