//! Decoded values, structured states and sparse deltas.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::alarm::AlarmResolution;
use crate::consts::ALARM_KEY;
use crate::layout::EquipmentKind;

// ─── FieldValue ─────────────────────────────────────────────────────

/// Value of one layout field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Single-bit flag.
    Bool(bool),
    /// Single word, or a multi-bit flag.
    Integer(u16),
    /// Run of integer words (e.g. the five gas-type words).
    Words(Vec<u16>),
    /// ASCII text, one character per word.
    Text(String),
}

impl FieldValue {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Words(_) => "word list",
            Self::Text(_) => "text",
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload.
    pub fn as_integer(&self) -> Option<u16> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Word-list payload.
    pub fn as_words(&self) -> Option<&[u16]> {
        match self {
            Self::Words(w) => Some(w),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(v) => Value::from(*v),
            Self::Words(w) => Value::from(w.clone()),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Words(w) => write!(f, "{w:?}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        Self::Integer(v)
    }
}

impl From<Vec<u16>> for FieldValue {
    fn from(w: Vec<u16>) -> Self {
        Self::Words(w)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// ─── StructuredState ────────────────────────────────────────────────

/// Decoded equipment state. Immutable once built; a new one replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredState {
    /// Equipment kind of the layout that produced the state.
    pub kind: EquipmentKind,
    /// Layout revision that produced the state.
    pub revision: String,
    /// Every layout field by dotted name.
    pub fields: BTreeMap<String, FieldValue>,
    /// Resolved alarm, present when the layout names an alarm field.
    pub alarm: Option<AlarmResolution>,
}

impl StructuredState {
    /// Field value by dotted name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Boolean field by dotted name.
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_bool)
    }

    /// Integer field by dotted name.
    pub fn integer(&self, name: &str) -> Option<u16> {
        self.get(name).and_then(FieldValue::as_integer)
    }

    /// Text field by dotted name.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// Nested JSON rendering: dotted names become nested objects and the
    /// resolved alarm sits under a top-level `alarm` key.
    pub fn to_tree(&self) -> Value {
        let mut root = Map::new();
        for (name, value) in &self.fields {
            insert_path(&mut root, name, value.to_json());
        }
        if let Some(alarm) = &self.alarm {
            root.insert(
                ALARM_KEY.to_string(),
                serde_json::json!({
                    "code": alarm.code,
                    "category": alarm.category,
                    "message": alarm.message,
                }),
            );
        }
        Value::Object(root)
    }
}

/// Insert `value` at dotted `path`. A path crossing an existing leaf is
/// dropped; validated layouts never produce one.
fn insert_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut parts = path.split('.').peekable();
    let mut node = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            node.insert(part.to_string(), value);
            return;
        }
        let child = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match child.as_object_mut() {
            Some(map) => node = map,
            None => return,
        }
    }
}

// ─── StateDelta ─────────────────────────────────────────────────────

/// Sparse set of field assignments to encode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDelta {
    fields: BTreeMap<String, FieldValue>,
}

impl StateDelta {
    /// Empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every field of a full state.
    pub fn from_state(state: &StructuredState) -> Self {
        Self {
            fields: state.fields.clone(),
        }
    }

    /// Assign a field, replacing any earlier assignment.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Assignment for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Assignments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of assignments.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the delta assigns nothing.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> StructuredState {
        let mut fields = BTreeMap::new();
        fields.insert("bunker_id".to_string(), FieldValue::Integer(3));
        fields.insert("port_a.barcode".to_string(), FieldValue::from("AB12"));
        fields.insert("port_a.operation.gas_supply".to_string(), FieldValue::Bool(true));
        fields.insert("gas_type".to_string(), FieldValue::Words(vec![1, 2, 3, 4, 5]));
        StructuredState {
            kind: EquipmentKind::GasCabinet,
            revision: "v1".to_string(),
            fields,
            alarm: Some(AlarmResolution {
                code: 20,
                category: "Common".to_string(),
                message: "Gas leak 1st stage".to_string(),
                known: true,
            }),
        }
    }

    #[test]
    fn tree_nests_dotted_names() {
        let tree = state().to_tree();
        assert_eq!(tree["bunker_id"], 3);
        assert_eq!(tree["port_a"]["barcode"], "AB12");
        assert_eq!(tree["port_a"]["operation"]["gas_supply"], true);
        assert_eq!(tree["gas_type"], serde_json::json!([1, 2, 3, 4, 5]));
        assert_eq!(tree["alarm"]["code"], 20);
        assert_eq!(tree["alarm"]["message"], "Gas leak 1st stage");
    }

    #[test]
    fn typed_accessors() {
        let s = state();
        assert_eq!(s.integer("bunker_id"), Some(3));
        assert_eq!(s.text("port_a.barcode"), Some("AB12"));
        assert_eq!(s.bool("port_a.operation.gas_supply"), Some(true));
        assert_eq!(s.bool("bunker_id"), None);
        assert_eq!(s.get("missing"), None);
    }

    #[test]
    fn delta_builder_overwrites() {
        let delta = StateDelta::new()
            .with("valves.av1a", true)
            .with("valves.av1a", false)
            .with("bunker_id", 7u16);
        assert_eq!(delta.len(), 2);
        assert_eq!(delta.get("valves.av1a"), Some(&FieldValue::Bool(false)));

        let full = StateDelta::from_state(&state());
        assert_eq!(full.len(), 4);
    }

    #[test]
    fn untagged_serde_shapes() {
        let json = serde_json::to_string(&StateDelta::new().with("a", true).with("b", 5u16))
            .unwrap();
        assert_eq!(json, r#"{"a":true,"b":5}"#);
        let back: StateDelta = serde_json::from_str(r#"{"t":"XY","w":[1,2]}"#).unwrap();
        assert_eq!(back.get("t"), Some(&FieldValue::from("XY")));
        assert_eq!(back.get("w"), Some(&FieldValue::Words(vec![1, 2])));
    }
}
