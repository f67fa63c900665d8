//! Alarm catalog: static code → (category, message) table per equipment kind.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::EquipmentKind;

/// Category reported for codes absent from the catalog.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Message reported for codes absent from the catalog.
pub const UNKNOWN_MESSAGE: &str = "Unknown alarm code";

/// Catalog construction error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Same code listed twice.
    #[error("alarm code {code} is listed more than once")]
    DuplicateCode {
        /// Offending code.
        code: u16,
    },

    /// Entry without a message.
    #[error("alarm code {code} has an empty message")]
    EmptyMessage {
        /// Offending code.
        code: u16,
    },

    /// No catalog shipped for this equipment kind.
    #[error("no built-in alarm catalog for {0}")]
    NoBuiltin(EquipmentKind),

    /// Catalog file unreadable or malformed.
    #[error("alarm catalog could not be parsed: {0}")]
    Parse(String),
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlarmEntry {
    /// Numeric code reported by the equipment.
    pub code: u16,
    /// Grouping such as `Common`, `A Port`, `Sensor`.
    pub category: String,
    /// Operator-facing description.
    pub message: String,
}

/// Result of resolving a code. Always produced, even for unknown codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmResolution {
    /// Code as read from the register.
    pub code: u16,
    /// Catalog category, or the sentinel category.
    pub category: String,
    /// Catalog message, or the sentinel message.
    pub message: String,
    /// Whether the code was found in the catalog.
    pub known: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    kind: EquipmentKind,
    #[serde(default = "default_unknown_category")]
    unknown_category: String,
    #[serde(default = "default_unknown_message")]
    unknown_message: String,
    alarms: Vec<AlarmEntry>,
}

fn default_unknown_category() -> String {
    UNKNOWN_CATEGORY.to_string()
}

fn default_unknown_message() -> String {
    UNKNOWN_MESSAGE.to_string()
}

/// Read-only alarm table for one equipment kind.
#[derive(Debug, Clone)]
pub struct AlarmCatalog {
    kind: EquipmentKind,
    entries: HashMap<u16, AlarmEntry>,
    unknown_category: String,
    unknown_message: String,
}

impl AlarmCatalog {
    /// Build a catalog, rejecting duplicate codes and blank messages.
    pub fn new(
        kind: EquipmentKind,
        entries: impl IntoIterator<Item = AlarmEntry>,
    ) -> Result<Self, CatalogError> {
        let mut map = HashMap::new();
        for entry in entries {
            if entry.message.trim().is_empty() {
                return Err(CatalogError::EmptyMessage { code: entry.code });
            }
            let code = entry.code;
            if map.insert(code, entry).is_some() {
                return Err(CatalogError::DuplicateCode { code });
            }
        }
        Ok(Self {
            kind,
            entries: map,
            unknown_category: default_unknown_category(),
            unknown_message: default_unknown_message(),
        })
    }

    /// Replace the sentinel reported for unknown codes.
    pub fn with_sentinel(
        mut self,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.unknown_category = category.into();
        self.unknown_message = message.into();
        self
    }

    /// Parse a catalog TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(toml_str).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Ok(Self::new(file.kind, file.alarms)?
            .with_sentinel(file.unknown_category, file.unknown_message))
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Catalog shipped for `kind`.
    pub fn builtin(kind: EquipmentKind) -> Result<Self, CatalogError> {
        let source = match kind {
            EquipmentKind::GasCabinet => include_str!("../../alarms/gas_cabinet.toml"),
            EquipmentKind::Stocker => include_str!("../../alarms/stocker.toml"),
        };
        let catalog = Self::from_toml(source)?;
        if catalog.kind != kind {
            return Err(CatalogError::NoBuiltin(kind));
        }
        Ok(catalog)
    }

    /// Resolve a code. Unknown codes yield the sentinel, never an error.
    pub fn resolve(&self, code: u16) -> AlarmResolution {
        match self.entries.get(&code) {
            Some(entry) => AlarmResolution {
                code,
                category: entry.category.clone(),
                message: entry.message.clone(),
                known: true,
            },
            None => AlarmResolution {
                code,
                category: self.unknown_category.clone(),
                message: self.unknown_message.clone(),
                known: false,
            },
        }
    }

    /// Exact entry for `code`.
    pub fn get(&self, code: u16) -> Option<&AlarmEntry> {
        self.entries.get(&code)
    }

    /// All codes in ascending order.
    pub fn codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.entries.keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    /// Equipment kind the catalog belongs to.
    pub fn kind(&self) -> EquipmentKind {
        self.kind
    }

    /// Entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: u16, category: &str, message: &str) -> AlarmEntry {
        AlarmEntry {
            code,
            category: category.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn resolve_zero_without_entry_is_sentinel() {
        let catalog =
            AlarmCatalog::new(EquipmentKind::GasCabinet, [entry(1, "Common", "Redundancy off")])
                .unwrap();
        let r = catalog.resolve(0);
        assert!(!r.known);
        assert_eq!(r.code, 0);
        assert_eq!(r.category, UNKNOWN_CATEGORY);
        assert_eq!(r.message, UNKNOWN_MESSAGE);
    }

    #[test]
    fn resolve_known_code_is_exact() {
        let catalog = AlarmCatalog::new(
            EquipmentKind::Stocker,
            [
                entry(1, "Equipment", "Emergency button pressed"),
                entry(74, "Sensor", "BUNKER_EMS_ON_CHK detect error"),
            ],
        )
        .unwrap();
        let r = catalog.resolve(74);
        assert!(r.known);
        assert_eq!(r.category, "Sensor");
        assert_eq!(r.message, "BUNKER_EMS_ON_CHK detect error");
    }

    #[test]
    fn duplicate_code_rejected() {
        let err = AlarmCatalog::new(
            EquipmentKind::Stocker,
            [entry(5, "Equipment", "a"), entry(5, "Equipment", "b")],
        )
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateCode { code: 5 });
    }

    #[test]
    fn blank_message_rejected() {
        let err = AlarmCatalog::new(EquipmentKind::Stocker, [entry(9, "Equipment", " ")])
            .unwrap_err();
        assert_eq!(err, CatalogError::EmptyMessage { code: 9 });
    }

    #[test]
    fn custom_sentinel_from_toml() {
        let catalog = AlarmCatalog::from_toml(
            r#"
kind = "stocker"
unknown_category = "Unmapped"
unknown_message = "No description"
alarms = [{ code = 3, category = "Equipment", message = "Main air off detected" }]
"#,
        )
        .unwrap();
        assert_eq!(catalog.resolve(4).category, "Unmapped");
        assert_eq!(catalog.resolve(4).message, "No description");
        assert_eq!(catalog.resolve(3).message, "Main air off detected");
    }

    #[test]
    fn builtin_gas_cabinet_catalog() {
        let catalog = AlarmCatalog::builtin(EquipmentKind::GasCabinet).unwrap();
        assert_eq!(catalog.kind(), EquipmentKind::GasCabinet);

        let r = catalog.resolve(20);
        assert_eq!((r.category.as_str(), r.message.as_str()), ("Common", "Gas leak 1st stage"));
        assert_eq!(catalog.resolve(101).category, "A Port");
        assert_eq!(catalog.resolve(201).category, "B Port");
        assert_eq!(catalog.resolve(375).message, "Barcode read error");
        assert_eq!(catalog.resolve(433).message, "Reserved");
        assert_eq!(catalog.resolve(496).category, "B Port");
        assert!(!catalog.resolve(0).known);
        assert!(!catalog.resolve(500).known);
    }

    #[test]
    fn builtin_stocker_catalog() {
        let catalog = AlarmCatalog::builtin(EquipmentKind::Stocker).unwrap();
        assert_eq!(catalog.len(), 169);
        assert_eq!(catalog.codes().first(), Some(&1));
        assert_eq!(catalog.codes().last(), Some(&169));
        assert_eq!(catalog.resolve(1).message, "Emergency button pressed");
        assert_eq!(catalog.resolve(40).message, "Reserved");
        assert_eq!(catalog.resolve(74).category, "Sensor");
        assert_eq!(catalog.resolve(88).message, "X000E_NA detect error");
    }
}
