//! Layout definition files.
//!
//! A layout file lists process blocks and status words. Entries inside a
//! block are laid out consecutively from the block address unless they
//! pin their own `address` (process) or `bit` (status word), in which case
//! the cursor continues after the pinned entry.
//!
//! ```toml
//! kind = "gas_cabinet"
//! revision = "v1"
//! alarm_field = "status.alarm_code"
//!
//! [[process]]
//! group = "port_a"
//! address = 24
//! fields = [
//!     "cga_torque",
//!     { name = "barcode", address = 30, words = 30, kind = "ascii" },
//! ]
//!
//! [[status_word]]
//! group = "port_requests"
//! address = 103
//! bits = ["port_a_insert_request", { name = "port_b_insert_request", bit = 8 }]
//! ```

use serde::Deserialize;

use super::field::{EquipmentKind, RegisterField, ValueKind};
use super::registry::LayoutError;

/// Top-level layout definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutConfig {
    /// Equipment kind.
    pub kind: EquipmentKind,
    /// Revision label; `kind/revision` is the layout id.
    pub revision: String,
    /// Human description.
    #[serde(default)]
    pub description: String,
    /// Dotted name of the alarm code field.
    #[serde(default)]
    pub alarm_field: Option<String>,
    /// Process-region blocks.
    #[serde(default)]
    pub process: Vec<ProcessBlock>,
    /// Bit-region status words.
    #[serde(default)]
    pub status_word: Vec<StatusWord>,
}

/// Run of process fields starting at `address`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessBlock {
    /// Prefix joined to every field name with a dot.
    #[serde(default)]
    pub group: Option<String>,
    /// Address of the first field.
    pub address: u16,
    /// Field entries.
    pub fields: Vec<ProcessEntry>,
}

/// Process field entry: a bare name (one integer word) or a detailed table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProcessEntry {
    /// Single integer word at the cursor.
    Name(String),
    /// Explicit shape.
    Detailed(ProcessDetail),
}

/// Explicit process field shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessDetail {
    /// Field name relative to the block group.
    pub name: String,
    /// Pinned address; defaults to the cursor.
    #[serde(default)]
    pub address: Option<u16>,
    /// Number of words.
    #[serde(default = "default_words")]
    pub words: u16,
    /// Value interpretation.
    #[serde(default)]
    pub kind: ValueKind,
    /// Nominal `[min, max]`.
    #[serde(default)]
    pub range: Option<[u16; 2]>,
}

fn default_words() -> u16 {
    1
}

/// One packed status word.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusWord {
    /// Prefix joined to every flag name with a dot.
    #[serde(default)]
    pub group: Option<String>,
    /// Word address.
    pub address: u16,
    /// Flags from bit 0 upward.
    pub bits: Vec<BitEntry>,
}

/// Bit entry: a bare name (one boolean bit) or a detailed table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BitEntry {
    /// Single boolean bit at the cursor.
    Name(String),
    /// Explicit position and width.
    Detailed(BitDetail),
}

/// Explicit bit field shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BitDetail {
    /// Field name relative to the word group.
    pub name: String,
    /// Pinned bit offset; defaults to the cursor.
    #[serde(default)]
    pub bit: Option<u8>,
    /// Width in bits.
    #[serde(default = "default_width")]
    pub width: u8,
    /// Nominal `[min, max]` for multi-bit fields.
    #[serde(default)]
    pub range: Option<[u16; 2]>,
}

fn default_width() -> u8 {
    1
}

fn qualify(group: &Option<String>, name: &str) -> String {
    match group {
        Some(group) if !group.is_empty() => format!("{group}.{name}"),
        _ => name.to_string(),
    }
}

impl LayoutConfig {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Expand blocks and status words into field descriptors.
    ///
    /// Address and bit cursors that overflow their integer type surface as
    /// [`LayoutError::InvalidField`]; overlap and width rules are left to
    /// [`RegisterLayout::new`](super::RegisterLayout::new).
    pub fn to_fields(&self) -> Result<Vec<RegisterField>, LayoutError> {
        let mut fields = Vec::new();

        for block in &self.process {
            let mut cursor = block.address as u32;
            for entry in &block.fields {
                let (name, address, words, kind, range) = match entry {
                    ProcessEntry::Name(name) => (name, None, 1, ValueKind::Integer, None),
                    ProcessEntry::Detailed(d) => (&d.name, d.address, d.words, d.kind, d.range),
                };
                let name = qualify(&block.group, name);
                let start = match address {
                    Some(a) => a,
                    None => u16::try_from(cursor).map_err(|_| LayoutError::InvalidField {
                        name: name.clone(),
                        reason: format!("address cursor {cursor} overflows the address space"),
                    })?,
                };
                let mut field = RegisterField::process(name, start, words, kind);
                field.range = range.map(|[min, max]| (min, max));
                cursor = start as u32 + words as u32;
                fields.push(field);
            }
        }

        for word in &self.status_word {
            let mut cursor: u16 = 0;
            for entry in &word.bits {
                let (name, bit, width, range) = match entry {
                    BitEntry::Name(name) => (name, None, 1, None),
                    BitEntry::Detailed(d) => (&d.name, d.bit, d.width, d.range),
                };
                let name = qualify(&word.group, name);
                let offset = match bit {
                    Some(b) => b,
                    None => u8::try_from(cursor).map_err(|_| LayoutError::InvalidField {
                        name: name.clone(),
                        reason: format!("bit cursor {cursor} overflows"),
                    })?,
                };
                let mut field = RegisterField::bit(name, word.address, offset, width);
                field.range = range.map(|[min, max]| (min, max));
                cursor = offset as u16 + width as u16;
                fields.push(field);
            }
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Region, RegisterLayout};

    const SAMPLE: &str = r#"
kind = "gas_cabinet"
revision = "t1"
alarm_field = "status.alarm_code"

[[process]]
address = 0
fields = ["bunker_id", { name = "gas_type", words = 5, range = [1, 50] }, "status.alarm_code"]

[[process]]
group = "port_a"
address = 24
fields = [
    "cga_torque",
    { name = "barcode", address = 30, words = 30, kind = "ascii" },
    "after_barcode",
]

[[status_word]]
group = "port_requests"
address = 103
bits = [
    "port_a_insert_request",
    "port_a_insert_complete",
    { name = "port_b_insert_request", bit = 8 },
    "port_b_insert_complete",
    { name = "mode", width = 3, range = [0, 5] },
]
"#;

    #[test]
    fn cursor_expansion() {
        let config = LayoutConfig::from_toml(SAMPLE).unwrap();
        let fields = config.to_fields().unwrap();
        let find = |n: &str| fields.iter().find(|f| f.name == n).unwrap();

        assert_eq!(find("bunker_id").word_address, 0);
        assert_eq!(find("gas_type").word_address, 1);
        assert_eq!(find("gas_type").words, 5);
        assert_eq!(find("gas_type").range, Some((1, 50)));
        assert_eq!(find("status.alarm_code").word_address, 6);
        assert_eq!(find("port_a.cga_torque").word_address, 24);
        assert_eq!(find("port_a.barcode").kind, ValueKind::Ascii);
        assert_eq!(find("port_a.after_barcode").word_address, 60);

        assert_eq!(find("port_requests.port_a_insert_complete").bit_offset, 1);
        assert_eq!(find("port_requests.port_b_insert_request").bit_offset, 8);
        assert_eq!(find("port_requests.port_b_insert_complete").bit_offset, 9);
        let mode = find("port_requests.mode");
        assert_eq!((mode.bit_offset, mode.bit_width), (10, 3));
        assert_eq!(mode.kind, ValueKind::Integer);
        assert_eq!(mode.region, Region::Bit);
    }

    #[test]
    fn builds_layout() {
        let layout = RegisterLayout::from_toml(SAMPLE).unwrap();
        assert_eq!(layout.id(), "gas_cabinet/t1");
        assert_eq!(layout.alarm_field(), Some("status.alarm_code"));
        assert_eq!(layout.required_len(), 104);
    }

    #[test]
    fn unknown_keys_rejected() {
        let toml_str = r#"
kind = "stocker"
revision = "x"
[[status_word]]
address = 100
bits = [{ name = "a", offset = 3 }]
"#;
        assert!(LayoutConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn unknown_kind_rejected() {
        let toml_str = r#"
kind = "agv"
revision = "x"
"#;
        assert!(matches!(
            RegisterLayout::from_toml(toml_str),
            Err(LayoutError::Parse(_))
        ));
    }

    #[test]
    fn seventeen_flags_overflow_word() {
        let names: Vec<String> = (0..17).map(|i| format!("\"f{i}\"")).collect();
        let toml_str = format!(
            "kind = \"stocker\"\nrevision = \"x\"\n[[status_word]]\naddress = 100\nbits = [{}]\n",
            names.join(", ")
        );
        assert!(matches!(
            RegisterLayout::from_toml(&toml_str),
            Err(LayoutError::BitRangeExceedsWord { offset: 16, .. })
        ));
    }
}
