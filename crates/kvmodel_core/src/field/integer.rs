//! Bounded integer field.

use crate::error::{CoreError, CoreResult};
use crate::field::traits::{Field, FieldOptions, IndexKind};
use crate::field::value::FieldValue;

/// A signed integer with optional inclusive bounds, range-indexed.
#[derive(Debug, Clone)]
pub struct Integer {
    options: FieldOptions<i64>,
    min: Option<i64>,
    max: Option<i64>,
}

impl Integer {
    /// Creates an unbounded integer field stored under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(name),
            min: None,
            max: None,
        }
    }

    /// Sets inclusive bounds. When both are given `min` must be below `max`;
    /// this is checked when the model is registered.
    #[must_use]
    pub fn bounds(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

impl Field for Integer {
    type Value = i64;

    fn options(&self) -> &FieldOptions<i64> {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions<i64> {
        &mut self.options
    }

    fn index_kind(&self) -> IndexKind {
        IndexKind::Range
    }

    fn to_storage(&self, value: &i64) -> CoreResult<String> {
        if let Some(min) = self.min {
            if *value < min {
                return Err(CoreError::validation(
                    self.name(),
                    format!("minimal value check failed: {value} < {min}"),
                ));
            }
        }
        if let Some(max) = self.max {
            if *value > max {
                return Err(CoreError::validation(
                    self.name(),
                    format!("maximum value check failed: {value} > {max}"),
                ));
            }
        }
        Ok(value.to_string())
    }

    fn from_storage(&self, raw: &str) -> CoreResult<i64> {
        raw.parse().map_err(|_| {
            CoreError::invalid_format(format!(
                "field {} holds non-integer value {raw:?}",
                self.name()
            ))
        })
    }

    fn to_field_value(&self, value: i64) -> FieldValue {
        FieldValue::Integer(value)
    }

    fn check_definition(&self) -> CoreResult<()> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min >= max => Err(CoreError::invalid_field(
                self.name(),
                format!("minimum {min} must be below maximum {max}"),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive() {
        let f = Integer::new("age").bounds(Some(0), Some(100));
        assert_eq!(f.to_storage(&0).unwrap(), "0");
        assert_eq!(f.to_storage(&26).unwrap(), "26");
        assert_eq!(f.to_storage(&100).unwrap(), "100");
        assert!(matches!(f.to_storage(&101), Err(CoreError::Validation { .. })));
        assert!(matches!(f.to_storage(&-1), Err(CoreError::Validation { .. })));
    }

    #[test]
    fn parses_stored_text() {
        let f = Integer::new("age");
        assert_eq!(f.from_storage("-42").unwrap(), -42);
        assert!(matches!(
            f.from_storage("4.2"),
            Err(CoreError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn definition_requires_min_below_max() {
        assert!(Integer::new("n").bounds(Some(5), Some(1)).check_definition().is_err());
        assert!(Integer::new("n").bounds(None, Some(1)).check_definition().is_ok());
    }
}
