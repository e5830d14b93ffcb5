//! Exported field values.

use crate::model::Entity;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A native field value, as produced by [`crate::Entity::export`].
///
/// Serializes to plain JSON-like data: timestamps as RFC 3339 strings and
/// references as the referenced entity's id.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent field (only exported when absent fields are kept).
    Null,
    /// Boolean value.
    Bool(bool),
    /// Text value.
    Text(String),
    /// Integer value.
    Integer(i64),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Another entity.
    Reference(Entity),
}

impl FieldValue {
    /// Returns the text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer value.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns true for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Timestamp(t) => serializer.serialize_str(&t.to_rfc3339()),
            Self::Reference(e) => serializer.serialize_str(e.id()),
        }
    }
}
