//! Field descriptors: one named, typed slice of register space.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::consts::WORD_BITS;

// ─── Region ─────────────────────────────────────────────────────────

/// Register sub-range a field lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Numeric and text fields, one value per word.
    Process,
    /// Boolean and small-integer flags packed into status words.
    Bit,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Bit => write!(f, "bit"),
        }
    }
}

// ─── Value Kind ─────────────────────────────────────────────────────

/// How the raw bits of a field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Unsigned integer (one word, a list of words, or a multi-bit flag).
    #[default]
    Integer,
    /// Text carried in the low byte of each word.
    Ascii,
    /// Single-bit flag.
    Boolean,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Ascii => write!(f, "ascii"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

// ─── Equipment Kind ─────────────────────────────────────────────────

/// Equipment family a layout and alarm catalog belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    /// Gas cabinet with two cylinder ports.
    GasCabinet,
    /// Cylinder stocker with worker and bunker doors per port.
    Stocker,
}

impl EquipmentKind {
    /// Snake-case identifier used in layout ids and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GasCabinet => "gas_cabinet",
            Self::Stocker => "stocker",
        }
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gas_cabinet" => Ok(Self::GasCabinet),
            "stocker" => Ok(Self::Stocker),
            other => Err(format!("unknown equipment kind '{other}'")),
        }
    }
}

// ─── RegisterField ──────────────────────────────────────────────────

/// A named, typed slice of the register space.
///
/// Process fields span `words` whole words starting at `word_address`.
/// Bit fields occupy `bit_width` bits of a single word starting at
/// `bit_offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterField {
    /// Dotted path into the decoded state tree, e.g. `port_a.barcode`.
    pub name: String,
    /// Region the field lives in.
    pub region: Region,
    /// First word covered by the field.
    pub word_address: u16,
    /// First bit within the word (0 for process fields).
    pub bit_offset: u8,
    /// Number of bits per word (16 for process fields).
    pub bit_width: u8,
    /// Number of consecutive words (1 for bit fields).
    pub words: u16,
    /// Interpretation of the raw value.
    pub kind: ValueKind,
    /// Nominal `[min, max]` for generated values. Not enforced by the codec.
    pub range: Option<(u16, u16)>,
}

impl RegisterField {
    /// Process-region field covering `words` whole words.
    pub fn process(
        name: impl Into<String>,
        word_address: u16,
        words: u16,
        kind: ValueKind,
    ) -> Self {
        Self {
            name: name.into(),
            region: Region::Process,
            word_address,
            bit_offset: 0,
            bit_width: WORD_BITS,
            words,
            kind,
            range: None,
        }
    }

    /// Bit-region field. Width 1 is a boolean, anything wider an integer.
    pub fn bit(name: impl Into<String>, word_address: u16, bit_offset: u8, bit_width: u8) -> Self {
        let kind = if bit_width == 1 {
            ValueKind::Boolean
        } else {
            ValueKind::Integer
        };
        Self {
            name: name.into(),
            region: Region::Bit,
            word_address,
            bit_offset,
            bit_width,
            words: 1,
            kind,
            range: None,
        }
    }

    /// Attach a nominal value range.
    pub fn with_range(mut self, min: u16, max: u16) -> Self {
        self.range = Some((min, max));
        self
    }

    /// One past the last word covered by the field.
    #[inline]
    pub fn end_address(&self) -> usize {
        self.word_address as usize + self.words as usize
    }

    /// Unshifted value mask, `(1 << bit_width) - 1`.
    #[inline]
    pub fn value_mask(&self) -> u16 {
        if self.bit_width >= WORD_BITS {
            u16::MAX
        } else {
            ((1u32 << self.bit_width) - 1) as u16
        }
    }

    /// Mask of the bits this field occupies inside each of its words.
    ///
    /// Only meaningful after the layout checked `bit_offset + bit_width <= 16`.
    #[inline]
    pub fn word_mask(&self) -> u16 {
        ((self.value_mask() as u32) << self.bit_offset) as u16
    }

    /// Whether the field covers bit `bit` of word `address`.
    pub fn covers(&self, address: u16, bit: u8) -> bool {
        let address = address as usize;
        address >= self.word_address as usize
            && address < self.end_address()
            && bit >= self.bit_offset
            && (bit as u16) < self.bit_offset as u16 + self.bit_width as u16
    }

    /// Largest raw value a single word of this field can carry.
    pub fn max_value(&self) -> u16 {
        self.value_mask()
    }
}

impl fmt::Display for RegisterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.region {
            Region::Process if self.words > 1 => write!(
                f,
                "{} ({} {}..{})",
                self.name,
                self.kind,
                self.word_address,
                self.end_address()
            ),
            Region::Process => write!(f, "{} ({} @{})", self.name, self.kind, self.word_address),
            Region::Bit => write!(
                f,
                "{} ({} @{}.{:02}/{})",
                self.name, self.kind, self.word_address, self.bit_offset, self.bit_width
            ),
        }
    }
}
