use std::collections::BTreeMap;

use super::{
    CodecError, EncodedWrites, FieldValue, RegisterWrite, StateCodec, StateDelta, StructuredState,
};
use crate::consts::{PRINTABLE_MAX, PRINTABLE_MIN, TEXT_PAD_BYTE};
use crate::layout::{Region, RegisterField, ValueKind};

/// Raw form of one field value, ready to merge into its words.
enum Encoded {
    /// Whole words for a process field.
    Words(Vec<u16>),
    /// Unshifted bits for a bit field.
    Bits(u16),
}

impl Encoded {
    /// Merge into `words`, the field's current words.
    fn apply(&self, field: &RegisterField, words: &mut [u16]) {
        match self {
            Self::Words(values) => words.copy_from_slice(values),
            Self::Bits(raw) => {
                let mask = field.word_mask();
                words[0] = (words[0] & !mask) | ((*raw << field.bit_offset) & mask);
            }
        }
    }
}

impl StateCodec {
    /// Encode a sparse delta against `baseline` (zero if `None`).
    ///
    /// Each field is validated on its own; rejected fields are reported and
    /// the rest are still encoded. Bits outside the named fields keep their
    /// baseline value.
    pub fn encode(&self, delta: &StateDelta, baseline: Option<&[u16]>) -> EncodedWrites {
        let mut working: BTreeMap<u16, u16> = BTreeMap::new();
        let mut rejected = Vec::new();

        for (name, value) in delta.iter() {
            let result = self
                .layout
                .field(name)
                .ok_or_else(|| CodecError::UnknownField {
                    name: name.to_string(),
                })
                .and_then(|field| {
                    if let Some(base) = baseline {
                        if base.len() < field.end_address() {
                            return Err(CodecError::OutOfRange {
                                field: field.name.clone(),
                                required: self.layout.required_len(),
                                available: base.len(),
                            });
                        }
                    }
                    Ok((field, encode_value(field, value)?))
                });

            let (field, encoded) = match result {
                Ok(ok) => ok,
                Err(err) => {
                    rejected.push((name.to_string(), err));
                    continue;
                }
            };

            let mut current: Vec<u16> = (field.word_address as usize..field.end_address())
                .map(|addr| {
                    working
                        .get(&(addr as u16))
                        .copied()
                        .unwrap_or_else(|| baseline.map_or(0, |base| base[addr]))
                })
                .collect();
            encoded.apply(field, &mut current);
            for (offset, word) in current.into_iter().enumerate() {
                working.insert(field.word_address + offset as u16, word);
            }
        }

        EncodedWrites {
            writes: working
                .into_iter()
                .map(|(address, value)| RegisterWrite { address, value })
                .collect(),
            rejected,
        }
    }

    /// Render a complete register image (`required_len` words, zero
    /// baseline) from a full state.
    ///
    /// # Errors
    ///
    /// [`CodecError::LayoutMismatch`] for a state of another layout,
    /// [`CodecError::MissingField`] / [`CodecError::UnknownField`] when the
    /// state's field set differs from the layout, and
    /// [`CodecError::InvalidValue`] for values that do not fit.
    pub fn encode_full(&self, state: &StructuredState) -> Result<Vec<u16>, CodecError> {
        if state.kind != self.layout.kind() || state.revision != self.layout.revision() {
            return Err(CodecError::LayoutMismatch {
                expected: self.layout.id(),
                found: format!("{}/{}", state.kind, state.revision),
            });
        }
        if let Some(name) = state.fields.keys().find(|n| !self.layout.contains(n)) {
            return Err(CodecError::UnknownField { name: name.clone() });
        }

        let mut image = vec![0u16; self.layout.required_len()];
        for field in self.layout.all_fields() {
            let value = state.get(&field.name).ok_or_else(|| CodecError::MissingField {
                name: field.name.clone(),
            })?;
            let encoded = encode_value(field, value)?;
            encoded.apply(field, &mut image[field.word_address as usize..field.end_address()]);
        }
        Ok(image)
    }
}

fn invalid(field: &RegisterField, reason: impl Into<String>) -> CodecError {
    CodecError::InvalidValue {
        field: field.name.clone(),
        reason: reason.into(),
    }
}

fn encode_value(field: &RegisterField, value: &FieldValue) -> Result<Encoded, CodecError> {
    match (field.region, field.kind, value) {
        (Region::Bit, ValueKind::Boolean, FieldValue::Bool(b)) => Ok(Encoded::Bits(*b as u16)),
        (Region::Bit, _, FieldValue::Integer(v)) if field.kind != ValueKind::Boolean => {
            if *v > field.value_mask() {
                return Err(invalid(
                    field,
                    format!("{v} does not fit in {} bits", field.bit_width),
                ));
            }
            Ok(Encoded::Bits(*v))
        }
        (Region::Process, ValueKind::Integer, FieldValue::Integer(v)) if field.words == 1 => {
            Ok(Encoded::Words(vec![*v]))
        }
        (Region::Process, ValueKind::Integer, FieldValue::Words(values)) => {
            if values.len() != field.words as usize {
                return Err(invalid(
                    field,
                    format!("expected {} words, got {}", field.words, values.len()),
                ));
            }
            Ok(Encoded::Words(values.clone()))
        }
        (Region::Process, ValueKind::Ascii, FieldValue::Text(text)) => encode_text(field, text),
        (_, kind, other) => Err(invalid(
            field,
            format!("{} value for {kind} field", other.type_name()),
        )),
    }
}

fn encode_text(field: &RegisterField, text: &str) -> Result<Encoded, CodecError> {
    let bytes = text.as_bytes();
    if let Some(bad) = text
        .chars()
        .find(|c| !(PRINTABLE_MIN as char..=PRINTABLE_MAX as char).contains(c))
    {
        return Err(invalid(field, format!("character {bad:?} is not printable ASCII")));
    }
    if bytes.len() > field.words as usize {
        return Err(invalid(
            field,
            format!("{} characters exceed {} words", bytes.len(), field.words),
        ));
    }
    let mut words: Vec<u16> = bytes.iter().map(|&b| b as u16).collect();
    words.resize(field.words as usize, TEXT_PAD_BYTE as u16);
    Ok(Encoded::Words(words))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alarm::{AlarmCatalog, AlarmEntry};
    use crate::layout::{EquipmentKind, RegisterLayout};

    const LAYOUT: &str = r#"
kind = "stocker"
revision = "t1"

[[process]]
address = 0
fields = [
    "stocker_id",
    { name = "gas_type", words = 2 },
    { name = "barcode", words = 4, kind = "ascii" },
]

[[status_word]]
group = "door"
address = 8
bits = ["open", "close", { name = "mode", width = 3 }]
"#;

    fn codec() -> StateCodec {
        let layout = RegisterLayout::from_toml(LAYOUT).unwrap();
        let catalog = AlarmCatalog::new(EquipmentKind::Stocker, Vec::<AlarmEntry>::new()).unwrap();
        StateCodec::new(Arc::new(layout), Arc::new(catalog))
    }

    #[test]
    fn bit_write_preserves_unrelated_bits() {
        let mut baseline = vec![0u16; 9];
        baseline[8] = 0b1111_0000_0000_0010;
        let delta = StateDelta::new().with("door.open", true).with("door.mode", 0b011u16);
        let out = codec().encode(&delta, Some(&baseline));

        assert!(out.is_complete());
        assert_eq!(
            out.writes,
            vec![RegisterWrite {
                address: 8,
                value: 0b1111_0000_0000_1111,
            }]
        );
    }

    #[test]
    fn clearing_a_bit_keeps_neighbours() {
        let mut baseline = vec![0u16; 9];
        baseline[8] = 0b11;
        let out = codec().encode(&StateDelta::new().with("door.open", false), Some(&baseline));
        assert_eq!(out.writes, vec![RegisterWrite { address: 8, value: 0b10 }]);
    }

    #[test]
    fn writes_sorted_one_per_word() {
        let delta = StateDelta::new()
            .with("door.close", true)
            .with("barcode", "AB")
            .with("stocker_id", 2u16);
        let out = codec().encode(&delta, None);
        let addresses: Vec<u16> = out.writes.iter().map(|w| w.address).collect();
        assert_eq!(addresses, [0, 3, 4, 5, 6, 8]);
        assert_eq!(out.writes[1].value, b'A' as u16);
        assert_eq!(out.writes[3].value, b' ' as u16);
    }

    #[test]
    fn rejections_are_per_field() {
        let delta = StateDelta::new()
            .with("nope", true)
            .with("door.mode", 8u16)
            .with("door.open", 1u16)
            .with("barcode", "TOO LONG")
            .with("gas_type", vec![1u16])
            .with("stocker_id", 9u16);
        let out = codec().encode(&delta, None);

        assert_eq!(out.writes, vec![RegisterWrite { address: 0, value: 9 }]);
        let rejected: Vec<&str> = out.rejected.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(rejected, ["barcode", "door.mode", "door.open", "gas_type", "nope"]);
        assert!(matches!(
            out.rejected.last(),
            Some((_, CodecError::UnknownField { .. }))
        ));
        assert!(out.rejected[..4]
            .iter()
            .all(|(_, e)| matches!(e, CodecError::InvalidValue { .. })));
    }

    #[test]
    fn non_ascii_text_rejected() {
        let out = codec().encode(&StateDelta::new().with("barcode", "Ä1"), None);
        assert!(matches!(out.rejected[0].1, CodecError::InvalidValue { .. }));
        assert!(out.writes.is_empty());
    }

    #[test]
    fn short_baseline_rejected() {
        let out = codec().encode(&StateDelta::new().with("door.open", true), Some(&[0u16; 4]));
        assert!(matches!(
            out.rejected[0].1,
            CodecError::OutOfRange { available: 4, .. }
        ));
    }

    #[test]
    fn full_encode_round_trips() {
        let codec = codec();
        let mut regs = vec![0u16; 9];
        regs[0] = 12;
        regs[1] = 3;
        regs[2] = 4;
        regs[3..7].copy_from_slice(&[b'X' as u16, b'Y' as u16, b'1' as u16, b' ' as u16]);
        regs[8] = 0b10110;
        let state = codec.decode(&regs).unwrap();
        let image = codec.encode_full(&state).unwrap();
        assert_eq!(image, regs);
        assert_eq!(codec.decode(&image).unwrap(), state);
    }

    #[test]
    fn full_encode_requires_every_field() {
        let codec = codec();
        let mut state = codec.decode(&[0u16; 9]).unwrap();
        state.fields.remove("door.mode");
        assert_eq!(
            codec.encode_full(&state),
            Err(CodecError::MissingField {
                name: "door.mode".to_string()
            })
        );

        let mut other = codec.decode(&[0u16; 9]).unwrap();
        other.revision = "t2".to_string();
        assert!(matches!(
            codec.encode_full(&other),
            Err(CodecError::LayoutMismatch { .. })
        ));
    }
}
