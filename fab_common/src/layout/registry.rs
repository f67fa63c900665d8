//! Register layout — validated, versioned descriptor table.
//!
//! Built once at startup from field descriptors or a TOML definition.
//! Immutable after construction; share it behind an `Arc`.
//! Lookups by name and by `(region, word, bit)` are HashMap backed.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;

use super::config::LayoutConfig;
use super::field::{EquipmentKind, Region, RegisterField, ValueKind};
use crate::consts::{ALARM_KEY, WORD_BITS};

// ─── Error Types ────────────────────────────────────────────────────

/// Layout construction error. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Two fields claim the same bit of the same word.
    #[error("fields '{first}' and '{second}' overlap at word {word} bit {bit}")]
    Conflict {
        /// Field declared first.
        first: String,
        /// Field that collided with it.
        second: String,
        /// Shared word address.
        word: u16,
        /// Lowest shared bit.
        bit: u8,
    },

    /// A bit field runs past the end of its word.
    #[error("field '{name}' bit range {offset}+{width} exceeds a 16-bit word")]
    BitRangeExceedsWord {
        /// Field name.
        name: String,
        /// Declared bit offset.
        offset: u8,
        /// Declared bit width.
        width: u8,
    },

    /// Two fields share a name.
    #[error("duplicate field name '{name}'")]
    DuplicateName {
        /// Field name.
        name: String,
    },

    /// A field descriptor is malformed.
    #[error("invalid field '{name}': {reason}")]
    InvalidField {
        /// Field name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The alarm field is missing or not a single integer word.
    #[error("alarm field '{name}': {reason}")]
    AlarmField {
        /// Configured alarm field name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No built-in layout with this id.
    #[error("unknown layout '{id}'")]
    UnknownLayout {
        /// Requested layout id.
        id: String,
    },

    /// The layout definition could not be read or parsed.
    #[error("layout definition could not be parsed: {0}")]
    Parse(String),
}

// ─── RegisterSpan ───────────────────────────────────────────────────

/// Contiguous address range touched by one region of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpan {
    /// First word address.
    pub start: u16,
    /// Number of words.
    pub count: usize,
}

impl RegisterSpan {
    /// One past the last word of the span.
    #[inline]
    pub fn end(&self) -> usize {
        self.start as usize + self.count
    }
}

// ─── RegisterLayout ─────────────────────────────────────────────────

/// Versioned set of register fields for one equipment kind.
#[derive(Debug, Clone)]
pub struct RegisterLayout {
    kind: EquipmentKind,
    revision: String,
    description: String,
    alarm_field: Option<String>,
    fields: Vec<RegisterField>,
    by_name: HashMap<String, usize>,
    by_word: HashMap<u16, Vec<usize>>,
    required_len: usize,
}

impl RegisterLayout {
    /// Build a layout, running every validation rule.
    ///
    /// Fields are reordered by `(word_address, bit_offset)`.
    ///
    /// # Errors
    ///
    /// Returns the first [`LayoutError`] encountered.
    pub fn new(
        kind: EquipmentKind,
        revision: impl Into<String>,
        description: impl Into<String>,
        alarm_field: Option<String>,
        mut fields: Vec<RegisterField>,
    ) -> Result<Self, LayoutError> {
        let mut names: HashSet<&str> = HashSet::new();
        for field in &fields {
            validate_field(field)?;
            if !names.insert(field.name.as_str()) {
                return Err(LayoutError::DuplicateName {
                    name: field.name.clone(),
                });
            }
        }
        check_tree_paths(&fields, &names)?;
        check_overlap(&fields)?;

        fields.sort_by_key(|f| (f.word_address, f.bit_offset));

        let mut by_name = HashMap::with_capacity(fields.len());
        let mut by_word: HashMap<u16, Vec<usize>> = HashMap::new();
        let mut required_len = 0;
        for (idx, field) in fields.iter().enumerate() {
            by_name.insert(field.name.clone(), idx);
            for offset in 0..field.words {
                by_word
                    .entry(field.word_address + offset)
                    .or_default()
                    .push(idx);
            }
            required_len = required_len.max(field.end_address());
        }

        let layout = Self {
            kind,
            revision: revision.into(),
            description: description.into(),
            alarm_field,
            fields,
            by_name,
            by_word,
            required_len,
        };
        layout.check_alarm_field()?;
        Ok(layout)
    }

    /// Build a layout from its TOML form.
    pub fn from_config(config: &LayoutConfig) -> Result<Self, LayoutError> {
        Self::new(
            config.kind,
            config.revision.clone(),
            config.description.clone(),
            config.alarm_field.clone(),
            config.to_fields()?,
        )
    }

    /// Parse and build a layout from a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, LayoutError> {
        let config =
            LayoutConfig::from_toml(toml_str).map_err(|e| LayoutError::Parse(e.to_string()))?;
        Self::from_config(&config)
    }

    /// Load a layout definition file.
    pub fn load(path: &Path) -> Result<Self, LayoutError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LayoutError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    fn check_alarm_field(&self) -> Result<(), LayoutError> {
        let Some(name) = &self.alarm_field else {
            return Ok(());
        };
        let field = self.field(name).ok_or_else(|| LayoutError::AlarmField {
            name: name.clone(),
            reason: "not defined in the layout".to_string(),
        })?;
        if field.region != Region::Process || field.kind != ValueKind::Integer || field.words != 1
        {
            return Err(LayoutError::AlarmField {
                name: name.clone(),
                reason: "must be a single-word integer process field".to_string(),
            });
        }
        Ok(())
    }

    /// Equipment kind this layout describes.
    pub fn kind(&self) -> EquipmentKind {
        self.kind
    }

    /// Firmware/layout revision label.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Human description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Layout id, `<kind>/<revision>`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.kind, self.revision)
    }

    /// Name of the field carrying the numeric alarm code, if any.
    pub fn alarm_field(&self) -> Option<&str> {
        self.alarm_field.as_deref()
    }

    /// All fields, ordered by word address then bit offset.
    pub fn all_fields(&self) -> &[RegisterField] {
        &self.fields
    }

    /// Fields of one region, in layout order.
    pub fn fields_in(&self, region: Region) -> impl Iterator<Item = &RegisterField> {
        self.fields.iter().filter(move |f| f.region == region)
    }

    /// Look up a field by its dotted name.
    pub fn field(&self, name: &str) -> Option<&RegisterField> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    /// Whether the layout defines `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Field covering `bit` of word `address` in `region`; `None` if unmapped.
    pub fn field_for(&self, region: Region, address: u16, bit: u8) -> Option<&RegisterField> {
        self.by_word
            .get(&address)?
            .iter()
            .map(|&idx| &self.fields[idx])
            .find(|f| f.region == region && f.covers(address, bit))
    }

    /// Region of the fields occupying word `address`; `None` if unmapped.
    ///
    /// Process fields claim whole words, so a mapped word has one region.
    pub fn region_at(&self, address: u16) -> Option<Region> {
        let idx = *self.by_word.get(&address)?.first()?;
        Some(self.fields[idx].region)
    }

    /// Smallest register array length covering every field.
    pub fn required_len(&self) -> usize {
        self.required_len
    }

    /// Contiguous span of words touched by `region`; `None` if the region is empty.
    pub fn span(&self, region: Region) -> Option<RegisterSpan> {
        let mut fields = self.fields_in(region);
        let first = fields.next()?;
        let (start, end) = fields.fold(
            (first.word_address as usize, first.end_address()),
            |(start, end), f| (start.min(f.word_address as usize), end.max(f.end_address())),
        );
        Some(RegisterSpan {
            start: start as u16,
            count: end - start,
        })
    }

    /// Field count.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the layout has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ─── Validation Rules ───────────────────────────────────────────────

fn invalid(field: &RegisterField, reason: &str) -> LayoutError {
    LayoutError::InvalidField {
        name: field.name.clone(),
        reason: reason.to_string(),
    }
}

fn validate_field(field: &RegisterField) -> Result<(), LayoutError> {
    if field.name.is_empty() || field.name.split('.').any(str::is_empty) {
        return Err(invalid(field, "name must be a non-empty dotted path"));
    }
    if field.bit_width == 0 {
        return Err(invalid(field, "bit width must be at least 1"));
    }
    if field.words == 0 {
        return Err(invalid(field, "field must cover at least one word"));
    }
    if field.end_address() > u16::MAX as usize + 1 {
        return Err(invalid(field, "field runs past the end of the address space"));
    }

    match field.region {
        Region::Bit => {
            if field.bit_offset as u16 + field.bit_width as u16 > WORD_BITS as u16 {
                return Err(LayoutError::BitRangeExceedsWord {
                    name: field.name.clone(),
                    offset: field.bit_offset,
                    width: field.bit_width,
                });
            }
            if field.words != 1 {
                return Err(invalid(field, "bit fields occupy exactly one word"));
            }
            match field.kind {
                ValueKind::Ascii => {
                    return Err(invalid(field, "ascii fields belong to the process region"));
                }
                ValueKind::Boolean if field.bit_width != 1 => {
                    return Err(invalid(field, "boolean fields are one bit wide"));
                }
                _ => {}
            }
        }
        Region::Process => {
            if field.bit_offset != 0 || field.bit_width != WORD_BITS {
                return Err(invalid(field, "process fields occupy whole words"));
            }
            if field.kind == ValueKind::Boolean {
                return Err(invalid(field, "boolean fields belong to the bit region"));
            }
        }
    }

    if let Some((min, max)) = field.range {
        if min > max {
            return Err(invalid(field, "range minimum exceeds maximum"));
        }
        if max > field.max_value() {
            return Err(invalid(field, "range maximum does not fit the bit width"));
        }
    }
    Ok(())
}

/// A name may not be both a value and a group of other values, and the
/// alarm key is reserved at the top level.
fn check_tree_paths(fields: &[RegisterField], names: &HashSet<&str>) -> Result<(), LayoutError> {
    for field in fields {
        if field.name.split('.').next() == Some(ALARM_KEY) {
            return Err(invalid(
                field,
                &format!("'{ALARM_KEY}' is reserved for the resolved alarm"),
            ));
        }
        let mut prefix_end = 0;
        for part in field.name.split('.') {
            prefix_end += part.len();
            if prefix_end < field.name.len() && names.contains(&field.name[..prefix_end]) {
                return Err(invalid(
                    field,
                    &format!("'{}' is also a field name", &field.name[..prefix_end]),
                ));
            }
            prefix_end += 1;
        }
    }
    Ok(())
}

fn check_overlap(fields: &[RegisterField]) -> Result<(), LayoutError> {
    // word → [(occupied mask, field index)]
    let mut occupied: HashMap<u16, Vec<(u16, usize)>> = HashMap::new();
    for (idx, field) in fields.iter().enumerate() {
        let mask = field.word_mask();
        for offset in 0..field.words {
            let word = field.word_address + offset;
            let claims = occupied.entry(word).or_default();
            if let Some(&(prev_mask, prev_idx)) = claims.iter().find(|(m, _)| m & mask != 0) {
                return Err(LayoutError::Conflict {
                    first: fields[prev_idx].name.clone(),
                    second: field.name.clone(),
                    word,
                    bit: (prev_mask & mask).trailing_zeros() as u8,
                });
            }
            claims.push((mask, idx));
        }
    }
    Ok(())
}
