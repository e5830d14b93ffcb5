//! Lazy index queries.
//!
//! A [`Query`] is `field <operator> value` over one model. Nothing is read
//! until the result is first needed; the matching entities are then cached
//! on the query until [`Query::unload`].
//!
//! | index kind | operators | store structure |
//! |---|---|---|
//! | exact | `=` | set `prefix:field:value` |
//! | range | `=` `<` `>` `<=` `>=` | sorted set `prefix:field` |

use crate::error::{CoreError, CoreResult};
use crate::field::{Field, FieldSpec, IndexKind};
use crate::model::{Entity, ModelType};
use kvmodel_store::ScoreRange;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Comparison operator of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Equal,
    /// `<`
    LessThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LessOrEqual,
    /// `>=`
    GreaterOrEqual,
}

impl Operator {
    /// Operator symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessOrEqual => "<=",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// Score interval matching `score <operator> v`.
    #[must_use]
    pub const fn score_range(self, v: f64) -> ScoreRange {
        match self {
            Self::Equal => ScoreRange::exact(v),
            Self::LessThan => ScoreRange::below(v),
            Self::GreaterThan => ScoreRange::above(v),
            Self::LessOrEqual => ScoreRange::at_most(v),
            Self::GreaterOrEqual => ScoreRange::at_least(v),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A lazily resolved `field <operator> value` expression.
///
/// # Example
///
/// ```rust,ignore
/// let teens = Query::less_than(&users, &age, &20)?.offset(10).limit(10);
/// for user in teens.iter()? {
///     println!("{}", user.id());
/// }
/// ```
pub struct Query {
    model: Arc<ModelType>,
    field: Arc<dyn FieldSpec>,
    operator: Operator,
    value: String,
    offset: usize,
    limit: Option<usize>,
    result: Mutex<Option<Vec<Entity>>>,
}

impl Query {
    /// Builds `field <operator> value` over `model`.
    ///
    /// The value is converted through the field right away, so an email is
    /// lower-cased and a bounded integer is range-checked. Operators the
    /// field's index cannot serve are reported on resolution.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `model` has no field of
    /// that name, or the field's conversion error for `value`.
    pub fn new<F: Field>(
        model: &Arc<ModelType>,
        field: &F,
        operator: Operator,
        value: &F::Value,
    ) -> CoreResult<Self> {
        let spec = model.field(field.name()).cloned().ok_or_else(|| {
            CoreError::invalid_operation(format!("{} has no field {}", model.name(), field.name()))
        })?;
        Ok(Self {
            model: Arc::clone(model),
            field: spec,
            operator,
            value: field.to_storage(value)?,
            offset: 0,
            limit: None,
            result: Mutex::new(None),
        })
    }

    /// `field = value`
    ///
    /// # Errors
    ///
    /// See [`Query::new`].
    pub fn equals<F: Field>(model: &Arc<ModelType>, field: &F, value: &F::Value) -> CoreResult<Self> {
        Self::new(model, field, Operator::Equal, value)
    }

    /// `field < value`
    ///
    /// # Errors
    ///
    /// See [`Query::new`].
    pub fn less_than<F: Field>(model: &Arc<ModelType>, field: &F, value: &F::Value) -> CoreResult<Self> {
        Self::new(model, field, Operator::LessThan, value)
    }

    /// `field > value`
    ///
    /// # Errors
    ///
    /// See [`Query::new`].
    pub fn greater_than<F: Field>(
        model: &Arc<ModelType>,
        field: &F,
        value: &F::Value,
    ) -> CoreResult<Self> {
        Self::new(model, field, Operator::GreaterThan, value)
    }

    /// `field <= value`
    ///
    /// # Errors
    ///
    /// See [`Query::new`].
    pub fn at_most<F: Field>(model: &Arc<ModelType>, field: &F, value: &F::Value) -> CoreResult<Self> {
        Self::new(model, field, Operator::LessOrEqual, value)
    }

    /// `field >= value`
    ///
    /// # Errors
    ///
    /// See [`Query::new`].
    pub fn at_least<F: Field>(model: &Arc<ModelType>, field: &F, value: &F::Value) -> CoreResult<Self> {
        Self::new(model, field, Operator::GreaterOrEqual, value)
    }

    /// Skips the first `offset` matches, counted from the low end of the
    /// score interval. Range-indexed fields only.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns at most `limit` matches. Range-indexed fields only.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The queried model.
    #[must_use]
    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    /// The operator.
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// The comparison value in stored form.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn resolve(&self) -> CoreResult<Vec<Entity>> {
        let prefix = self.model.prefix();
        let name = self.field.name();
        let connector = self.model.connector();
        let ids = match self.field.index_kind() {
            IndexKind::Exact => {
                if self.operator != Operator::Equal {
                    return Err(CoreError::UnsupportedOperator {
                        field: name.to_string(),
                        operator: self.operator.to_string(),
                    });
                }
                connector.resolve_exact_index(prefix, name, &self.value)?
            }
            IndexKind::Range => {
                let range = self.operator.score_range(self.field.score(&self.value)?);
                connector.resolve_range_index(prefix, name, range, self.offset, self.limit)?
            }
        };
        debug!(query = %self, matches = ids.len(), "resolved query");
        Ok(ids.into_iter().map(|id| self.model.lookup(id)).collect())
    }

    fn with_result<T>(&self, f: impl FnOnce(&[Entity]) -> T) -> CoreResult<T> {
        let mut result = self.result.lock();
        if result.is_none() {
            *result = Some(self.resolve()?);
        }
        Ok(f(result.as_deref().unwrap_or_default()))
    }

    /// Resolves the query unless already resolved.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedOperator`] for a non-equality
    /// operator on an exact-indexed field, or store errors.
    pub fn load(&self) -> CoreResult<()> {
        self.with_result(|_| ())
    }

    /// Returns true if the result is cached.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.result.lock().is_some()
    }

    /// Drops the cached result; the next access resolves again.
    pub fn unload(&self) {
        *self.result.lock() = None;
    }

    /// Number of matches.
    ///
    /// # Errors
    ///
    /// See [`Query::load`].
    pub fn len(&self) -> CoreResult<usize> {
        self.with_result(<[Entity]>::len)
    }

    /// Returns true if nothing matches.
    ///
    /// # Errors
    ///
    /// See [`Query::load`].
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.with_result(<[Entity]>::is_empty)
    }

    /// The match at `index`, in result order.
    ///
    /// # Errors
    ///
    /// See [`Query::load`].
    pub fn get(&self, index: usize) -> CoreResult<Option<Entity>> {
        self.with_result(|entities| entities.get(index).cloned())
    }

    /// All matches, in result order.
    ///
    /// # Errors
    ///
    /// See [`Query::load`].
    pub fn entities(&self) -> CoreResult<Vec<Entity>> {
        self.with_result(<[Entity]>::to_vec)
    }

    /// Iterates over the matches.
    ///
    /// # Errors
    ///
    /// See [`Query::load`].
    pub fn iter(&self) -> CoreResult<std::vec::IntoIter<Entity>> {
        Ok(self.entities()?.into_iter())
    }

    /// Returns true if `entity` is among the matches.
    ///
    /// # Errors
    ///
    /// See [`Query::load`].
    pub fn contains(&self, entity: &Entity) -> CoreResult<bool> {
        self.with_result(|entities| entities.contains(entity))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {} {:?}",
            self.model.name(),
            self.field.name(),
            self.operator,
            self.value
        )
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("model", &self.model.name())
            .field("field", &self.field.name())
            .field("operator", &self.operator)
            .field("value", &self.value)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StoreConnector;
    use crate::field::{Email, Integer, Text};
    use kvmodel_store::InMemoryStore;

    struct Users {
        model: Arc<ModelType>,
        age: Integer,
        name: Text,
        email: Email,
    }

    fn users() -> Users {
        let age = Integer::new("age").indexed();
        let name = Text::new("name").indexed();
        let email = Email::new("email").unique();
        let model = ModelType::builder("User")
            .connector(Arc::new(StoreConnector::new(Arc::new(InMemoryStore::new()))))
            .field(&age)
            .field(&name)
            .field(&email)
            .build()
            .unwrap();
        for n in 1..=9 {
            let user = model.lookup(n);
            age.set(&user, n).unwrap();
            let parity = if n % 2 == 0 { "even" } else { "odd" };
            name.set(&user, parity.to_string()).unwrap();
            user.save().unwrap();
        }
        Users { model, age, name, email }
    }

    fn ids(query: &Query) -> Vec<String> {
        query
            .entities()
            .unwrap()
            .iter()
            .map(|e| e.id().to_string())
            .collect()
    }

    #[test]
    fn operator_intervals() {
        let u = users();
        let cases = [
            (Operator::Equal, vec!["5"]),
            (Operator::LessThan, vec!["1", "2", "3", "4"]),
            (Operator::LessOrEqual, vec!["1", "2", "3", "4", "5"]),
            (Operator::GreaterThan, vec!["6", "7", "8", "9"]),
            (Operator::GreaterOrEqual, vec!["5", "6", "7", "8", "9"]),
        ];
        for (op, expected) in cases {
            let q = Query::new(&u.model, &u.age, op, &5).unwrap();
            assert_eq!(ids(&q), expected, "age {op} 5");
        }
    }

    #[test]
    fn offset_counts_from_low_end() {
        let u = users();
        let q = Query::at_least(&u.model, &u.age, &2).unwrap().offset(1).limit(2);
        assert_eq!(ids(&q), vec!["3", "4"]);

        let q = Query::less_than(&u.model, &u.age, &7).unwrap().offset(4);
        assert_eq!(ids(&q), vec!["5", "6"]);
    }

    #[test]
    fn exact_index_equality() {
        let u = users();
        let q = Query::equals(&u.model, &u.name, &"even".to_string()).unwrap();
        assert_eq!(q.len().unwrap(), 4);
        assert!(q.contains(&u.model.lookup(2)).unwrap());
        assert!(!q.contains(&u.model.lookup(3)).unwrap());
    }

    #[test]
    fn exact_index_rejects_ordering_operators() {
        let u = users();
        let q = Query::less_than(&u.model, &u.name, &"m".to_string()).unwrap();
        assert!(matches!(
            q.load(),
            Err(CoreError::UnsupportedOperator { .. })
        ));
        assert!(!q.is_loaded());
    }

    #[test]
    fn value_is_converted_up_front() {
        let u = users();
        let q = Query::equals(&u.model, &u.email, &"John@Example.COM".to_string()).unwrap();
        assert_eq!(q.value(), "john@example.com");
        assert!(Query::equals(&u.model, &u.email, &"nope".to_string()).is_err());
    }

    #[test]
    fn undeclared_field_rejected() {
        let u = users();
        let other = Integer::new("other");
        assert!(matches!(
            Query::equals(&u.model, &other, &1),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn result_is_cached_until_unload() {
        let u = users();
        let q = Query::greater_than(&u.model, &u.age, &8).unwrap();
        assert_eq!(q.len().unwrap(), 1);
        assert!(q.is_loaded());

        let user = u.model.lookup(10);
        u.age.set(&user, 10).unwrap();
        user.save().unwrap();
        assert_eq!(q.len().unwrap(), 1);

        q.unload();
        assert_eq!(q.len().unwrap(), 2);
        assert_eq!(q.get(1).unwrap(), Some(user));
        assert_eq!(q.iter().unwrap().count(), 2);
    }

    #[test]
    fn display_names_the_expression() {
        let u = users();
        let q = Query::at_most(&u.model, &u.age, &3).unwrap();
        assert_eq!(q.to_string(), "User.age <= \"3\"");
        assert!(!q.is_empty().unwrap());
    }
}
