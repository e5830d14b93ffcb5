//! Text fields: bounded strings, email addresses and hashed passwords.

use crate::error::{CoreError, CoreResult};
use crate::field::traits::{Field, FieldOptions, IndexKind};
use crate::field::value::FieldValue;
use crate::model::Entity;
use regex::Regex;
use md5::{Digest, Md5};
use std::sync::LazyLock;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+[_a-z0-9-]*(\.[_a-z0-9-]+)*@[a-z0-9]+[\.a-z0-9-]*(\.[a-z]{2,4})$")
        .expect("email pattern is valid")
});

/// Length limits measured in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Length {
    min: Option<usize>,
    max: Option<usize>,
}

impl Length {
    fn check_definition(&self, field: &str) -> CoreResult<()> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min >= max => Err(CoreError::invalid_field(
                field,
                format!("minimum length {min} must be below maximum length {max}"),
            )),
            _ => Ok(()),
        }
    }

    fn check(&self, field: &str, value: &str) -> CoreResult<()> {
        let len = value.chars().count();
        if let Some(min) = self.min {
            if len < min {
                return Err(CoreError::validation(
                    field,
                    format!("minimal length check failed: {len} < {min}"),
                ));
            }
        }
        if let Some(max) = self.max {
            if len > max {
                return Err(CoreError::validation(
                    field,
                    format!("maximum length check failed: {len} > {max}"),
                ));
            }
        }
        Ok(())
    }
}

/// A string with optional length bounds.
#[derive(Debug, Clone)]
pub struct Text {
    options: FieldOptions<String>,
    length: Length,
}

impl Text {
    /// Creates an unbounded text field stored under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(name),
            length: Length::default(),
        }
    }

    /// Sets the length bounds (inclusive). When both are given `min` must
    /// be below `max`; this is checked when the model is registered.
    #[must_use]
    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.length = Length { min, max };
        self
    }
}

impl Field for Text {
    type Value = String;

    fn options(&self) -> &FieldOptions<String> {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions<String> {
        &mut self.options
    }

    fn index_kind(&self) -> IndexKind {
        IndexKind::Exact
    }

    fn to_storage(&self, value: &String) -> CoreResult<String> {
        self.length.check(self.name(), value)?;
        Ok(value.clone())
    }

    fn from_storage(&self, raw: &str) -> CoreResult<String> {
        Ok(raw.to_string())
    }

    fn to_field_value(&self, value: String) -> FieldValue {
        FieldValue::Text(value)
    }

    fn check_definition(&self) -> CoreResult<()> {
        self.length.check_definition(self.name())
    }
}

/// An email address, stored lower-cased.
///
/// Lookups through this field convert their comparison value the same way,
/// so matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct Email {
    options: FieldOptions<String>,
}

impl Email {
    /// Creates an email field stored under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(name),
        }
    }
}

impl Field for Email {
    type Value = String;

    fn options(&self) -> &FieldOptions<String> {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions<String> {
        &mut self.options
    }

    fn index_kind(&self) -> IndexKind {
        IndexKind::Exact
    }

    fn to_storage(&self, value: &String) -> CoreResult<String> {
        let value = value.to_lowercase();
        if EMAIL_PATTERN.is_match(&value) {
            Ok(value)
        } else {
            Err(CoreError::validation(
                self.name(),
                format!("email validation failed for {value:?}"),
            ))
        }
    }

    fn from_storage(&self, raw: &str) -> CoreResult<String> {
        Ok(raw.to_string())
    }

    fn to_field_value(&self, value: String) -> FieldValue {
        FieldValue::Text(value)
    }
}

/// A password stored as its MD5 digest.
///
/// The raw value is length-checked, then hashed; reading the field returns
/// the hex digest, never the raw value.
#[derive(Debug, Clone)]
pub struct Password {
    options: FieldOptions<String>,
    length: Length,
}

impl Password {
    /// Creates a password field stored under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(name),
            length: Length::default(),
        }
    }

    /// Sets the length bounds applied to the raw value.
    #[must_use]
    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.length = Length { min, max };
        self
    }

    /// Lower-case hex MD5 of `raw`.
    #[must_use]
    pub fn digest(raw: &str) -> String {
        Md5::digest(raw.as_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Checks `candidate` against the digest held by `entity`.
    ///
    /// # Errors
    ///
    /// Returns store errors from the lazy load.
    pub fn verify(&self, entity: &Entity, candidate: &str) -> CoreResult<bool> {
        Ok(entity.get(self.name())?.as_deref() == Some(Self::digest(candidate).as_str()))
    }
}

impl Field for Password {
    type Value = String;

    fn options(&self) -> &FieldOptions<String> {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions<String> {
        &mut self.options
    }

    fn index_kind(&self) -> IndexKind {
        IndexKind::Exact
    }

    fn to_storage(&self, value: &String) -> CoreResult<String> {
        self.length.check(self.name(), value)?;
        Ok(Self::digest(value))
    }

    fn from_storage(&self, raw: &str) -> CoreResult<String> {
        Ok(raw.to_string())
    }

    fn to_field_value(&self, value: String) -> FieldValue {
        FieldValue::Text(value)
    }

    fn check_definition(&self) -> CoreResult<()> {
        self.length.check_definition(self.name())
    }
}
