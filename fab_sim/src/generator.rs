//! Random equipment state and the simulator loop that writes it.
//!
//! [`StateGenerator`] produces layout-valid states; [`EquipmentSimulator`]
//! pushes them into a register transport on a fixed period, the way real
//! equipment refreshes its register memory.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fab_common::codec::{CodecError, FieldValue, StateCodec, StateDelta, StructuredState};
use fab_common::consts::{DEFAULT_INTEGER_MAX, DEFAULT_SIM_INTERVAL_MS};
use fab_common::layout::{Region, RegisterField, ValueKind};
use fab_common::transport::{RegisterTransport, TransferError, TransportError};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Characters used for generated ASCII fields.
const TEXT_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Probability that a generated state carries an active alarm.
const ALARM_PROBABILITY: f64 = 0.2;

// ─── StateGenerator ─────────────────────────────────────────────────

/// Layout-driven random state source.
pub struct StateGenerator {
    codec: StateCodec,
    rng: StdRng,
    alarm_codes: Vec<u16>,
}

impl StateGenerator {
    /// Generator over `codec`'s layout. A seed makes the sequence repeatable.
    pub fn new(codec: StateCodec, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let alarm_codes = codec.catalog().codes();
        Self {
            codec,
            rng,
            alarm_codes,
        }
    }

    /// Codec the generator encodes with.
    pub fn codec(&self) -> &StateCodec {
        &self.codec
    }

    /// Fresh random state.
    pub fn generate(&mut self) -> StructuredState {
        self.generate_with(&StateDelta::new())
    }

    /// Random state with `pins` overriding generated values. Pins for
    /// fields the layout lacks are ignored.
    pub fn generate_with(&mut self, pins: &StateDelta) -> StructuredState {
        let layout = Arc::clone(self.codec.layout());
        let alarm_field = layout.alarm_field();
        let mut fields = BTreeMap::new();
        for field in layout.all_fields() {
            let value = match pins.get(&field.name) {
                Some(pinned) => pinned.clone(),
                None if alarm_field == Some(field.name.as_str()) => {
                    FieldValue::Integer(self.alarm_code())
                }
                None => self.value_for(field),
            };
            fields.insert(field.name.clone(), value);
        }
        self.codec.assemble(fields)
    }

    /// Random state encoded to a full register image.
    pub fn generate_image(&mut self) -> Result<Vec<u16>, CodecError> {
        self.generate_image_with(&StateDelta::new())
    }

    /// Register image of [`generate_with`](Self::generate_with).
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidValue`] when a pinned value does not fit its field.
    pub fn generate_image_with(&mut self, pins: &StateDelta) -> Result<Vec<u16>, CodecError> {
        let state = self.generate_with(pins);
        self.codec.encode_full(&state)
    }

    fn alarm_code(&mut self) -> u16 {
        if self.alarm_codes.is_empty() || !self.rng.gen_bool(ALARM_PROBABILITY) {
            return 0;
        }
        self.alarm_codes.choose(&mut self.rng).copied().unwrap_or(0)
    }

    fn value_for(&mut self, field: &RegisterField) -> FieldValue {
        match field.kind {
            ValueKind::Boolean => FieldValue::Bool(self.rng.gen_bool(0.5)),
            ValueKind::Ascii => {
                let text = (0..field.words)
                    .map(|_| {
                        let idx = self.rng.gen_range(0..TEXT_ALPHABET.len());
                        TEXT_ALPHABET[idx] as char
                    })
                    .collect::<String>();
                FieldValue::Text(text)
            }
            ValueKind::Integer => {
                let (min, max) = integer_bounds(field);
                if field.region == Region::Process && field.words > 1 {
                    let words = (0..field.words)
                        .map(|_| self.rng.gen_range(min..=max))
                        .collect();
                    FieldValue::Words(words)
                } else {
                    FieldValue::Integer(self.rng.gen_range(min..=max))
                }
            }
        }
    }
}

/// Inclusive bounds for generated integers, clamped to what the field holds.
fn integer_bounds(field: &RegisterField) -> (u16, u16) {
    let mask = field.value_mask();
    let (min, max) = match (field.range, field.region) {
        (Some(range), _) => range,
        (None, Region::Process) => (0, DEFAULT_INTEGER_MAX),
        (None, Region::Bit) => (0, mask),
    };
    let max = max.min(mask);
    (min.min(max), max)
}

// ─── EquipmentSimulator ─────────────────────────────────────────────

/// Simulator step failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// A pinned value could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A block write failed.
    #[error("{region} write failed: {source}")]
    Transport {
        /// Region being written.
        region: Region,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },
}

impl From<TransferError> for SimError {
    fn from(e: TransferError) -> Self {
        Self::Transport {
            region: e.region,
            source: e.source,
        }
    }
}

/// Shared set of field values every simulator step keeps fixed.
#[derive(Debug, Clone, Default)]
pub struct PinHandle {
    pins: Arc<Mutex<StateDelta>>,
}

impl PinHandle {
    /// Merge `delta` into the pinned values.
    pub fn pin(&self, delta: &StateDelta) {
        let mut pins = self.pins.lock();
        for (name, value) in delta.iter() {
            pins.set(name, value.clone());
        }
    }

    /// Release every pinned value.
    pub fn clear(&self) {
        *self.pins.lock() = StateDelta::new();
    }

    /// Copy of the pinned values.
    pub fn current(&self) -> StateDelta {
        self.pins.lock().clone()
    }
}

/// Writes generated states into a transport on a fixed period.
pub struct EquipmentSimulator<T: RegisterTransport> {
    name: String,
    generator: StateGenerator,
    transport: T,
    interval: Duration,
    pins: PinHandle,
}

impl<T: RegisterTransport> EquipmentSimulator<T> {
    /// Simulator writing through `transport`.
    pub fn new(name: impl Into<String>, generator: StateGenerator, transport: T) -> Self {
        Self {
            name: name.into(),
            generator,
            transport,
            interval: Duration::from_millis(DEFAULT_SIM_INTERVAL_MS),
            pins: PinHandle::default(),
        }
    }

    /// Set the update period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Handle for pinning field values from other tasks.
    pub fn pins(&self) -> PinHandle {
        self.pins.clone()
    }

    /// Generate one state and write both spans in a single batch, process
    /// span first.
    pub fn step(&mut self) -> Result<(), SimError> {
        let pins = self.pins.current();
        let image = self.generator.generate_image_with(&pins)?;
        let layout = Arc::clone(self.generator.codec().layout());
        let blocks: Vec<(Region, u16, &[u16])> = [Region::Process, Region::Bit]
            .into_iter()
            .filter_map(|region| layout.span(region).map(|span| (region, span)))
            .map(|(region, span)| (region, span.start, &image[span.start as usize..span.end()]))
            .collect();
        self.transport.write_regions(&blocks)?;
        debug!("Simulator '{}' wrote {} words", self.name, image.len());
        Ok(())
    }

    /// Step every interval until `shutdown` turns true. Returns the number
    /// of successful steps.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(
            "🎲 Simulator '{}' started ({}, every {:?})",
            self.name,
            self.generator.codec().layout().id(),
            self.interval
        );
        let mut steps = 0u64;
        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }
            match self.step() {
                Ok(()) => steps += 1,
                Err(e) => warn!("Simulator '{}' step failed: {}", self.name, e),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("🛑 Simulator '{}' stopped after {} steps", self.name, steps);
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fab_common::alarm::AlarmCatalog;
    use fab_common::layout::builtin_layout;

    fn codec(id: &str) -> StateCodec {
        let layout = Arc::new(builtin_layout(id).unwrap());
        let catalog = Arc::new(AlarmCatalog::builtin(layout.kind()).unwrap());
        StateCodec::new(layout, catalog)
    }

    #[test]
    fn seeded_generators_repeat() {
        let mut a = StateGenerator::new(codec("gas_cabinet/v1"), Some(42));
        let mut b = StateGenerator::new(codec("gas_cabinet/v1"), Some(42));
        for _ in 0..5 {
            assert_eq!(a.generate(), b.generate());
        }
    }

    #[test]
    fn generated_values_respect_field_shapes() {
        let codec = codec("stocker/v1");
        let layout = Arc::clone(codec.layout());
        let mut generator = StateGenerator::new(codec, Some(1));
        for _ in 0..20 {
            let state = generator.generate();
            assert_eq!(state.fields.len(), layout.len());
            for field in layout.all_fields() {
                match (field.kind, state.get(&field.name).unwrap()) {
                    (ValueKind::Boolean, FieldValue::Bool(_)) => {}
                    (ValueKind::Ascii, FieldValue::Text(t)) => {
                        assert_eq!(t.len(), field.words as usize);
                        assert!(t.bytes().all(|b| TEXT_ALPHABET.contains(&b)));
                    }
                    (ValueKind::Integer, FieldValue::Integer(v)) => {
                        assert!(*v <= field.value_mask());
                    }
                    (ValueKind::Integer, FieldValue::Words(w)) => {
                        assert_eq!(w.len(), field.words as usize);
                    }
                    (kind, value) => panic!("{}: {kind} field got {value:?}", field.name),
                }
            }
        }
    }

    #[test]
    fn alarm_field_draws_from_catalog() {
        let codec = codec("gas_cabinet/v1");
        let catalog = Arc::clone(codec.catalog());
        let mut generator = StateGenerator::new(codec, Some(9));
        let mut saw_alarm = false;
        for _ in 0..200 {
            let alarm = generator.generate().alarm.unwrap();
            if alarm.code != 0 {
                saw_alarm = true;
                assert!(catalog.get(alarm.code).is_some());
                assert!(alarm.known);
            }
        }
        assert!(saw_alarm);
    }

    #[test]
    fn pins_override_generated_values() {
        let mut generator = StateGenerator::new(codec("gas_cabinet/v2"), Some(3));
        let pins = StateDelta::new()
            .with("basic_signals.emg_signal", true)
            .with("valves.av1a", false)
            .with("not.in.layout", true);
        for _ in 0..10 {
            let state = generator.generate_with(&pins);
            assert_eq!(state.bool("basic_signals.emg_signal"), Some(true));
            assert_eq!(state.bool("valves.av1a"), Some(false));
            assert!(state.get("not.in.layout").is_none());
        }
    }

    #[test]
    fn bad_pin_is_a_codec_error() {
        let mut generator = StateGenerator::new(codec("gas_cabinet/v1"), Some(3));
        let pins = StateDelta::new().with("valves.av1a", 5u16);
        assert!(matches!(
            generator.generate_image_with(&pins),
            Err(CodecError::InvalidValue { .. })
        ));
    }
}
