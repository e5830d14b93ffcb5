//! Timestamp field.

use crate::error::{CoreError, CoreResult};
use crate::field::traits::{Field, FieldOptions, IndexKind};
use crate::field::value::FieldValue;
use crate::model::Entity;
use chrono::{DateTime, Utc};

/// A point in time stored as integer epoch seconds, range-indexed.
///
/// Sub-second precision is dropped on write.
#[derive(Debug, Clone)]
pub struct Timestamp {
    options: FieldOptions<DateTime<Utc>>,
}

impl Timestamp {
    /// Creates a timestamp field stored under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(name),
        }
    }

    /// Stages a write of raw epoch seconds.
    pub fn write_epoch(&self, entity: &Entity, secs: i64) {
        entity.set(self.name(), secs.to_string());
    }
}

impl Field for Timestamp {
    type Value = DateTime<Utc>;

    fn options(&self) -> &FieldOptions<DateTime<Utc>> {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions<DateTime<Utc>> {
        &mut self.options
    }

    fn index_kind(&self) -> IndexKind {
        IndexKind::Range
    }

    fn to_storage(&self, value: &DateTime<Utc>) -> CoreResult<String> {
        Ok(value.timestamp().to_string())
    }

    fn from_storage(&self, raw: &str) -> CoreResult<DateTime<Utc>> {
        raw.parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .ok_or_else(|| {
                CoreError::invalid_format(format!(
                    "field {} holds invalid epoch seconds {raw:?}",
                    self.name()
                ))
            })
    }

    fn to_field_value(&self, value: DateTime<Utc>) -> FieldValue {
        FieldValue::Timestamp(value)
    }
}
