use std::collections::BTreeMap;

use super::{CodecError, FieldValue, StateCodec, StructuredState};
use crate::consts::{PLACEHOLDER_CHAR, PRINTABLE_MAX, PRINTABLE_MIN};
use crate::layout::{Region, RegisterField, ValueKind};

impl StateCodec {
    /// Decode a full register image.
    ///
    /// # Errors
    ///
    /// [`CodecError::OutOfRange`] naming the first field the array does not
    /// reach. The array is never zero-padded.
    pub fn decode(&self, registers: &[u16]) -> Result<StructuredState, CodecError> {
        let required = self.layout.required_len();
        if registers.len() < required {
            let field = self
                .layout
                .all_fields()
                .iter()
                .find(|f| f.end_address() > registers.len())
                .map(|f| f.name.clone())
                .unwrap_or_default();
            return Err(CodecError::OutOfRange {
                field,
                required,
                available: registers.len(),
            });
        }

        let fields = self
            .layout
            .all_fields()
            .iter()
            .map(|field| (field.name.clone(), decode_field(field, registers)))
            .collect();
        Ok(self.assemble(fields))
    }

    /// Wrap field values into a state, resolving the alarm field if the
    /// layout names one.
    pub fn assemble(&self, fields: BTreeMap<String, FieldValue>) -> StructuredState {
        let alarm = self
            .layout
            .alarm_field()
            .and_then(|name| fields.get(name))
            .and_then(FieldValue::as_integer)
            .map(|code| self.catalog.resolve(code));
        StructuredState {
            kind: self.layout.kind(),
            revision: self.layout.revision().to_string(),
            fields,
            alarm,
        }
    }
}

/// Caller guarantees `registers` covers the field.
fn decode_field(field: &RegisterField, registers: &[u16]) -> FieldValue {
    let start = field.word_address as usize;
    let words = &registers[start..field.end_address()];
    match (field.region, field.kind) {
        (Region::Process, ValueKind::Ascii) => {
            FieldValue::Text(words.iter().map(|&w| ascii_char(w)).collect())
        }
        (Region::Process, _) if field.words == 1 => FieldValue::Integer(words[0]),
        (Region::Process, _) => FieldValue::Words(words.to_vec()),
        (Region::Bit, kind) => {
            let raw = (words[0] >> field.bit_offset) & field.value_mask();
            if kind == ValueKind::Boolean {
                FieldValue::Bool(raw != 0)
            } else {
                FieldValue::Integer(raw)
            }
        }
    }
}

fn ascii_char(word: u16) -> char {
    let byte = (word & 0x00FF) as u8;
    if (PRINTABLE_MIN..=PRINTABLE_MAX).contains(&byte) {
        byte as char
    } else {
        PLACEHOLDER_CHAR
    }
}
