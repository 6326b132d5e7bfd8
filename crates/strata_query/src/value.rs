//! Typed leaf values carried through column scans.

use bytes::Bytes;

/// Payload of one column position.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ValueKind {
    /// Placeholder for a branch that is absent at this level. Null values
    /// still advance the row-number space so every column covers all rows.
    #[default]
    Null,
    Int(i64),
    Double(f64),
    Bool(bool),
    Bytes(Bytes),
}

/// One value read from a column, with the repetition and definition levels
/// that position it in the nested row tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Value {
    pub kind: ValueKind,
    pub repetition_level: u8,
    pub definition_level: u8,
}

impl Value {
    pub fn new(kind: ValueKind, repetition_level: u8, definition_level: u8) -> Self {
        Value {
            kind,
            repetition_level,
            definition_level,
        }
    }

    pub fn null(repetition_level: u8, definition_level: u8) -> Self {
        Value::new(ValueKind::Null, repetition_level, definition_level)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind {
            ValueKind::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.kind {
            ValueKind::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ValueKind::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.kind {
            ValueKind::Bytes(b) => Some(b),
            _ => None,
        }
    }
}
