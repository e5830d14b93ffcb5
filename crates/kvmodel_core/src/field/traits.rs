//! Field traits and shared options.

use crate::error::{CoreError, CoreResult};
use crate::field::value::FieldValue;
use crate::model::Entity;
use std::fmt;
use std::sync::Arc;

/// Which index structure a field feeds when it is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// One set per value (`prefix:field:value`); equality lookups only.
    Exact,
    /// One sorted set per field (`prefix:field`) scored by the numeric
    /// stored value; supports interval lookups.
    Range,
}

/// Default assigned to a field by [`crate::Entity::fill_new`].
#[derive(Clone)]
pub enum NewValue<V> {
    /// A fixed value.
    Value(V),
    /// A producer called once per new entity.
    Producer(Arc<dyn Fn() -> V + Send + Sync>),
}

impl<V: Clone> NewValue<V> {
    /// Returns the literal, or calls the producer.
    pub fn evaluate(&self) -> V {
        match self {
            Self::Value(v) => v.clone(),
            Self::Producer(f) => f(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for NewValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Options shared by every field kind.
#[derive(Debug, Clone)]
pub struct FieldOptions<V> {
    name: String,
    indexed: bool,
    unique: bool,
    new_value: Option<NewValue<V>>,
    none: Option<V>,
}

impl<V> FieldOptions<V> {
    /// Creates options for a field stored under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: false,
            unique: false,
            new_value: None,
            none: None,
        }
    }

    /// Storage name (hash field and index key component).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the field is maintained in an index.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Whether the field enforces uniqueness on save.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// The default for new entities, if any.
    #[must_use]
    pub fn new_value(&self) -> Option<&NewValue<V>> {
        self.new_value.as_ref()
    }

    /// The sentinel read back when the field is absent.
    #[must_use]
    pub fn none(&self) -> Option<&V> {
        self.none.as_ref()
    }
}

/// A typed field descriptor.
///
/// Implementors provide conversion to and from the stored string form; the
/// provided methods give typed access to an entity and the declaration
/// builder.
///
/// # Example
///
/// ```rust,ignore
/// let age = Integer::new("age").bounds(Some(0), Some(150)).indexed();
///
/// age.set(&user, 26)?;
/// assert_eq!(age.read(&user)?, Some(26));
/// age.write(&user, None)?; // stages a deletion
/// ```
pub trait Field: Send + Sync + 'static {
    /// Native value type.
    type Value: Clone + Send + Sync + 'static;

    /// Shared options.
    fn options(&self) -> &FieldOptions<Self::Value>;

    /// Shared options, mutably.
    fn options_mut(&mut self) -> &mut FieldOptions<Self::Value>;

    /// Index structure this field feeds.
    fn index_kind(&self) -> IndexKind;

    /// Converts a native value to its stored form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the value violates the field's
    /// constraints.
    fn to_storage(&self, value: &Self::Value) -> CoreResult<String>;

    /// Converts a stored string back to a native value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the stored data is malformed.
    fn from_storage(&self, raw: &str) -> CoreResult<Self::Value>;

    /// Wraps a native value for export.
    fn to_field_value(&self, value: Self::Value) -> FieldValue;

    /// Checks the declaration itself (bounds ordering and the like).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidField`] for inconsistent options.
    fn check_definition(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Orders a stored value inside a range index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the stored value is not numeric.
    fn score(&self, raw: &str) -> CoreResult<f64> {
        raw.parse::<f64>().map_err(|_| {
            CoreError::invalid_format(format!(
                "field {} holds non-numeric value {raw:?}",
                self.name()
            ))
        })
    }

    /// Storage name.
    fn name(&self) -> &str {
        self.options().name()
    }

    /// Reads the field from an entity, loading the record if needed.
    ///
    /// Returns the configured none-sentinel (or `None`) if the field is
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns store errors from the lazy load or conversion errors.
    fn read(&self, entity: &Entity) -> CoreResult<Option<Self::Value>> {
        match entity.get(self.name())? {
            Some(raw) => self.from_storage(&raw).map(Some),
            None => Ok(self.options().none().cloned()),
        }
    }

    /// Stages a write; `None` stages a deletion.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the value is rejected. Nothing is
    /// staged in that case.
    fn write(&self, entity: &Entity, value: Option<Self::Value>) -> CoreResult<()> {
        match value {
            Some(value) => {
                let raw = self.to_storage(&value)?;
                entity.set(self.name(), raw);
            }
            None => entity.remove(self.name()),
        }
        Ok(())
    }

    /// Stages a write of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the value is rejected.
    fn set(&self, entity: &Entity, value: Self::Value) -> CoreResult<()> {
        self.write(entity, Some(value))
    }

    /// Maintains an index for this field.
    #[must_use]
    fn indexed(mut self) -> Self
    where
        Self: Sized,
    {
        self.options_mut().indexed = true;
        self
    }

    /// Maintains an index for this field and rejects duplicate values on save.
    #[must_use]
    fn unique(mut self) -> Self
    where
        Self: Sized,
    {
        self.options_mut().unique = true;
        self
    }

    /// Sets the value assigned to new entities.
    #[must_use]
    fn new_value(mut self, value: Self::Value) -> Self
    where
        Self: Sized,
    {
        self.options_mut().new_value = Some(NewValue::Value(value));
        self
    }

    /// Sets a producer called for each new entity.
    #[must_use]
    fn new_with<P>(mut self, producer: P) -> Self
    where
        Self: Sized,
        P: Fn() -> Self::Value + Send + Sync + 'static,
    {
        self.options_mut().new_value = Some(NewValue::Producer(Arc::new(producer)));
        self
    }

    /// Sets the value read back when the field is absent.
    #[must_use]
    fn none_value(mut self, value: Self::Value) -> Self
    where
        Self: Sized,
    {
        self.options_mut().none = Some(value);
        self
    }
}

/// Object-safe view of a field, as stored in a model's field table.
pub trait FieldSpec: Send + Sync + fmt::Debug {
    /// Storage name.
    fn name(&self) -> &str;

    /// Index structure this field feeds.
    fn index_kind(&self) -> IndexKind;

    /// Whether the field is declared indexed.
    fn is_indexed(&self) -> bool;

    /// Whether the field enforces uniqueness.
    fn is_unique(&self) -> bool;

    /// Whether saves and deletes must maintain an index for this field.
    fn maintains_index(&self) -> bool {
        self.is_indexed() || self.is_unique()
    }

    /// Evaluates the new-entity default and converts it; `None` if the
    /// field has no default.
    fn new_storage_value(&self) -> Option<CoreResult<String>>;

    /// Converts a stored value (or its absence) for export.
    ///
    /// # Errors
    ///
    /// Returns conversion errors for malformed stored data.
    fn export(&self, raw: Option<&str>) -> CoreResult<Option<FieldValue>>;

    /// Orders a stored value inside a range index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the value is not numeric.
    fn score(&self, raw: &str) -> CoreResult<f64>;

    /// Checks the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidField`] for inconsistent options.
    fn check_definition(&self) -> CoreResult<()>;
}

/// Type-erasing wrapper.
struct Erased<F>(F);

impl<F: fmt::Debug> fmt::Debug for Erased<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<F: Field + fmt::Debug> FieldSpec for Erased<F> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn index_kind(&self) -> IndexKind {
        self.0.index_kind()
    }

    fn is_indexed(&self) -> bool {
        self.0.options().is_indexed()
    }

    fn is_unique(&self) -> bool {
        self.0.options().is_unique()
    }

    fn new_storage_value(&self) -> Option<CoreResult<String>> {
        self.0
            .options()
            .new_value()
            .map(|new| self.0.to_storage(&new.evaluate()))
    }

    fn export(&self, raw: Option<&str>) -> CoreResult<Option<FieldValue>> {
        let value = match raw {
            Some(raw) => Some(self.0.from_storage(raw)?),
            None => self.0.options().none().cloned(),
        };
        Ok(value.map(|v| self.0.to_field_value(v)))
    }

    fn score(&self, raw: &str) -> CoreResult<f64> {
        self.0.score(raw)
    }

    fn check_definition(&self) -> CoreResult<()> {
        self.0.check_definition()
    }
}

/// Copies a typed field into a shared, type-erased table entry.
pub(crate) fn erase<F>(field: &F) -> Arc<dyn FieldSpec>
where
    F: Field + Clone + fmt::Debug,
{
    Arc::new(Erased(field.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Integer, Text};

    #[test]
    fn builder_flags() {
        let name = Text::new("name").indexed();
        assert!(name.options().is_indexed());
        assert!(!name.options().is_unique());

        let email = Text::new("email").unique();
        assert!(email.options().is_unique());
    }

    #[test]
    fn erased_spec_reports_options() {
        let spec = erase(&Integer::new("age").unique());
        assert_eq!(spec.name(), "age");
        assert_eq!(spec.index_kind(), IndexKind::Range);
        assert!(spec.maintains_index());
        assert!(spec.new_storage_value().is_none());
    }

    #[test]
    fn new_value_literal_and_producer() {
        let spec = erase(&Integer::new("score").new_value(5));
        assert_eq!(spec.new_storage_value().unwrap().unwrap(), "5");

        let spec = erase(&Text::new("tag").new_with(|| "fresh".to_string()));
        assert_eq!(spec.new_storage_value().unwrap().unwrap(), "fresh");
    }

    #[test]
    fn new_value_is_validated() {
        let spec = erase(&Integer::new("score").bounds(Some(0), Some(10)).new_value(50));
        assert!(matches!(
            spec.new_storage_value(),
            Some(Err(CoreError::Validation { .. }))
        ));
    }

    #[test]
    fn export_uses_none_sentinel() {
        let spec = erase(&Integer::new("age").none_value(-1));
        assert_eq!(spec.export(None).unwrap(), Some(FieldValue::Integer(-1)));
        assert_eq!(spec.export(Some("7")).unwrap(), Some(FieldValue::Integer(7)));

        let spec = erase(&Integer::new("age"));
        assert_eq!(spec.export(None).unwrap(), None);
    }

    #[test]
    fn non_numeric_score_fails() {
        let spec = erase(&Integer::new("age"));
        assert!(matches!(
            spec.score("abc"),
            Err(CoreError::InvalidFormat { .. })
        ));
        assert_eq!(spec.score("42").unwrap(), 42.0);
    }
}
