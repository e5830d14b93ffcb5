//! Boolean field.

use crate::error::CoreResult;
use crate::field::traits::{Field, FieldOptions, IndexKind};
use crate::field::value::FieldValue;

/// A flag stored as `"1"` or `"0"`.
#[derive(Debug, Clone)]
pub struct Boolean {
    options: FieldOptions<bool>,
}

impl Boolean {
    /// Creates a boolean field stored under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(name),
        }
    }
}

impl Field for Boolean {
    type Value = bool;

    fn options(&self) -> &FieldOptions<bool> {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions<bool> {
        &mut self.options
    }

    fn index_kind(&self) -> IndexKind {
        IndexKind::Exact
    }

    fn to_storage(&self, value: &bool) -> CoreResult<String> {
        Ok(if *value { "1" } else { "0" }.to_string())
    }

    fn from_storage(&self, raw: &str) -> CoreResult<bool> {
        Ok(raw == "1")
    }

    fn to_field_value(&self, value: bool) -> FieldValue {
        FieldValue::Bool(value)
    }
}
