//! Model types: field tables, identity maps and type hierarchies.

use crate::connector::Connector;
use crate::error::{CoreError, CoreResult};
use crate::field::{erase, Field, FieldSpec, IndexKind};
use crate::id::hex_id;
use crate::model::{Entity, ModelId, Registry};
use crate::query::{Operator, Query};
use kvmodel_store::Batch;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A model: its key prefix, its fields, the connector it persists through,
/// and the identity map of its live entities.
///
/// Models form a hierarchy through [`ModelBuilder::extends`]. A child
/// inherits the parent's fields and connector, and class-level operations
/// ([`ModelType::save_all`], [`ModelType::free_all`]) recurse into children.
///
/// # Identity
///
/// [`ModelType::lookup`] returns the same [`Entity`] for the same id until
/// the entity is freed. Entities hold their model, so the identity map is a
/// reference cycle that [`ModelType::free_all`] breaks.
pub struct ModelType {
    name: String,
    prefix: String,
    fields: Vec<Arc<dyn FieldSpec>>,
    connector: Arc<dyn Connector>,
    objects: RwLock<HashMap<String, Entity>>,
    children: RwLock<Vec<Arc<ModelType>>>,
    parent: Option<Weak<ModelType>>,
}

impl ModelType {
    /// Starts declaring a model named `name`.
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(name)
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key prefix (the lower-cased name unless configured).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Declared fields, inherited ones first.
    #[must_use]
    pub fn fields(&self) -> &[Arc<dyn FieldSpec>] {
        &self.fields
    }

    /// Looks up a declared field by storage name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Arc<dyn FieldSpec>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Connector this model persists through.
    #[must_use]
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Parent model, if this model extends one that is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<ModelType>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Direct child models.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<ModelType>> {
        self.children.read().clone()
    }

    /// All transitive child models, breadth first.
    #[must_use]
    pub fn inheritors(&self) -> Vec<Arc<ModelType>> {
        let mut out: Vec<Arc<ModelType>> = Vec::new();
        let mut pending = self.children();
        while !pending.is_empty() {
            let mut next = Vec::new();
            for child in pending {
                if out.iter().any(|seen| Arc::ptr_eq(seen, &child)) {
                    continue;
                }
                next.extend(child.children());
                out.push(child);
            }
            pending = next;
        }
        out
    }

    /// Number of entities in the identity map.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns the entity for `id`, creating an unloaded one on first use.
    ///
    /// No I/O happens here; the record loads lazily.
    pub fn lookup(self: &Arc<Self>, id: impl Into<ModelId>) -> Entity {
        let id = id.into().into_string();
        if let Some(entity) = self.objects.read().get(&id) {
            return entity.clone();
        }
        self.objects
            .write()
            .entry(id)
            .or_insert_with_key(|id| Entity::new(id.clone(), Arc::clone(self)))
            .clone()
    }

    /// Returns the entity for `id` if its record exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if there is no record. The entity
    /// stays in the identity map, known missing.
    pub fn lookup_existing(self: &Arc<Self>, id: impl Into<ModelId>) -> CoreResult<Entity> {
        let entity = self.lookup(id);
        if entity.exists()? {
            Ok(entity)
        } else {
            Err(CoreError::NotFound {
                model: self.name.clone(),
                id: entity.id().to_string(),
            })
        }
    }

    /// Returns a new entity for `id` with every field default staged.
    ///
    /// An entity already in the identity map under `id` is reused and its
    /// defaults overwrite staged values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyExists`] if a record exists for `id`, or
    /// [`CoreError::Validation`] if a default is rejected.
    pub fn create(self: &Arc<Self>, id: impl Into<ModelId>) -> CoreResult<Entity> {
        let entity = self.lookup(id);
        if entity.exists()? {
            return Err(CoreError::AlreadyExists {
                model: self.name.clone(),
                id: entity.id().to_string(),
            });
        }
        entity.fill_new()?;
        Ok(entity)
    }

    /// Like [`ModelType::create`] with a generated hex id.
    ///
    /// # Errors
    ///
    /// Same as [`ModelType::create`].
    pub fn create_generated(self: &Arc<Self>) -> CoreResult<Entity> {
        self.create(hex_id())
    }

    fn live(&self) -> Vec<Entity> {
        self.objects.read().values().cloned().collect()
    }

    /// Saves every live entity of this model in one batch, then recurses
    /// into child models (one batch each).
    ///
    /// Entities are reconciled only once their model's batch applied.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Models saved before it stay saved; the
    /// failing model's batch applies nothing and its entities keep their
    /// staged changes.
    pub fn save_all(&self) -> CoreResult<()> {
        let mut batch = self.connector.batch();
        let mut pending = Vec::new();
        for entity in self.live() {
            if let Some(staged) = entity.stage_save(&mut batch)? {
                pending.push((entity, staged));
            }
        }
        if !pending.is_empty() {
            self.connector.execute(batch)?;
            debug!(model = %self.name, entities = pending.len(), "saved model");
        }
        for (entity, staged) in pending {
            entity.reconcile(staged);
        }

        for child in self.children() {
            child.save_all()?;
        }
        Ok(())
    }

    /// Queues the saves of every live entity of this model and its
    /// children into `batch`. Entities are reconciled right away.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateKey`] if a unique value is taken at
    /// queue time.
    pub fn save_all_in(&self, batch: &mut Batch) -> CoreResult<()> {
        for entity in self.live() {
            entity.save_in(batch)?;
        }
        for child in self.children() {
            child.save_all_in(batch)?;
        }
        Ok(())
    }

    /// Clears the identity map of this model and its children.
    ///
    /// Handles held elsewhere stay usable but are no longer returned by
    /// [`ModelType::lookup`].
    pub fn free_all(&self) {
        let freed = {
            let mut objects = self.objects.write();
            let freed = objects.len();
            objects.clear();
            freed
        };
        debug!(model = %self.name, freed, "freed model");
        for child in self.children() {
            child.free_all();
        }
    }

    /// Drops `entity` from the identity map if it is the mapped instance.
    pub(crate) fn release(&self, entity: &Entity) {
        let mut objects = self.objects.write();
        if objects.get(entity.id()) == Some(entity) {
            objects.remove(entity.id());
        }
    }

    /// Builds a query `field <operator> value` over this model.
    ///
    /// # Errors
    ///
    /// See [`Query::new`].
    pub fn query<F: Field>(
        self: &Arc<Self>,
        field: &F,
        operator: Operator,
        value: &F::Value,
    ) -> CoreResult<Query> {
        Query::new(self, field, operator, value)
    }

    /// Picks up to `count` random entities whose exact-indexed `field`
    /// equals `value`; `None` if there are none.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `field` is not declared
    /// here, is range-indexed, or is neither indexed nor unique. Returns
    /// conversion errors for `value`.
    pub fn choice<F: Field>(
        self: &Arc<Self>,
        field: &F,
        value: &F::Value,
        count: usize,
    ) -> CoreResult<Option<Vec<Entity>>> {
        let spec = self.field(field.name()).ok_or_else(|| {
            CoreError::invalid_operation(format!("{} has no field {}", self.name, field.name()))
        })?;
        if spec.index_kind() != IndexKind::Exact || !spec.maintains_index() {
            return Err(CoreError::invalid_operation(format!(
                "random pick needs an exact index on {}.{}",
                self.name,
                field.name()
            )));
        }
        let value = field.to_storage(value)?;
        let ids = self
            .connector
            .pick_random(&self.prefix, field.name(), &value, count)?;
        Ok(ids.map(|ids| ids.into_iter().map(|id| self.lookup(id)).collect()))
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("fields", &self.fields.iter().map(|f| f.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Declares a [`ModelType`].
///
/// # Example
///
/// ```rust,ignore
/// let users = ModelType::builder("User")
///     .field(&Email::new("email").unique())
///     .field(&Integer::new("age").bounds(Some(0), Some(150)).indexed())
///     .register(&registry)?;
/// ```
pub struct ModelBuilder {
    name: String,
    prefix: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    parent: Option<Arc<ModelType>>,
    fields: Vec<Arc<dyn FieldSpec>>,
}

impl ModelBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            connector: None,
            parent: None,
            fields: Vec::new(),
        }
    }

    /// Overrides the key prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the connector, overriding any inherited or default one.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Inherits the fields and connector of `parent` and registers the new
    /// model as its child.
    #[must_use]
    pub fn extends(mut self, parent: &Arc<ModelType>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Declares a field. A field named like an inherited one replaces it.
    #[must_use]
    pub fn field<F>(mut self, field: &F) -> Self
    where
        F: Field + Clone + fmt::Debug,
    {
        self.fields.push(erase(field));
        self
    }

    /// Builds the model.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if no connector is set or
    /// inherited, or [`CoreError::InvalidField`] for an inconsistent field
    /// declaration.
    pub fn build(self) -> CoreResult<Arc<ModelType>> {
        self.build_with(None)
    }

    /// Builds the model and adds it to `registry`, falling back to the
    /// registry's default connector.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the registry already has
    /// a model of the same name, plus the errors of [`ModelBuilder::build`].
    pub fn register(self, registry: &Registry) -> CoreResult<Arc<ModelType>> {
        let default = registry.config().connector;
        let name = self.name.clone();
        registry.insert_with(&name, move || self.build_with(default))
    }

    fn build_with(self, default: Option<Arc<dyn Connector>>) -> CoreResult<Arc<ModelType>> {
        let mut fields: Vec<Arc<dyn FieldSpec>> = self
            .parent
            .as_ref()
            .map(|parent| parent.fields.clone())
            .unwrap_or_default();
        for field in self.fields {
            field.check_definition()?;
            match fields.iter_mut().find(|f| f.name() == field.name()) {
                Some(slot) => *slot = field,
                None => fields.push(field),
            }
        }

        let connector = self
            .connector
            .or_else(|| self.parent.as_ref().map(|p| Arc::clone(&p.connector)))
            .or(default)
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("model {} has no connector", self.name))
            })?;

        let model = Arc::new(ModelType {
            prefix: self.prefix.unwrap_or_else(|| self.name.to_lowercase()),
            name: self.name,
            fields,
            connector,
            objects: RwLock::new(HashMap::new()),
            children: RwLock::new(Vec::new()),
            parent: self.parent.as_ref().map(Arc::downgrade),
        });
        if let Some(parent) = &self.parent {
            parent.children.write().push(Arc::clone(&model));
        }
        debug!(model = %model.name, prefix = %model.prefix, "built model");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StoreConnector;
    use crate::field::{Email, Integer, Text};
    use kvmodel_store::{InMemoryStore, KeyValueStore};

    fn connector() -> (Arc<InMemoryStore>, Arc<dyn Connector>) {
        let store = Arc::new(InMemoryStore::new());
        let connector: Arc<dyn Connector> = Arc::new(StoreConnector::new(Arc::clone(&store)));
        (store, connector)
    }

    #[test]
    fn prefix_defaults_to_lowercased_name() {
        let (_, c) = connector();
        let users = ModelType::builder("UserAccount").connector(c.clone()).build().unwrap();
        assert_eq!(users.prefix(), "useraccount");

        let custom = ModelType::builder("User").prefix("u").connector(c).build().unwrap();
        assert_eq!(custom.prefix(), "u");
    }

    #[test]
    fn build_requires_connector() {
        let err = ModelType::builder("User").build().unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn build_checks_field_definitions() {
        let (_, c) = connector();
        let err = ModelType::builder("User")
            .connector(c)
            .field(&Text::new("name").length(Some(5), Some(2)))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidField { .. }));
    }

    #[test]
    fn lookup_is_identity_mapped() {
        let (_, c) = connector();
        let users = ModelType::builder("User").connector(c).build().unwrap();

        assert_eq!(users.lookup("1"), users.lookup("1"));
        assert_eq!(users.lookup(1_u64), users.lookup("1"));
        assert_eq!(users.lookup(None::<&str>), users.lookup(""));
        assert_ne!(users.lookup("None"), users.lookup(None::<&str>));
        assert_eq!(users.live_count(), 3);
    }

    #[test]
    fn free_forgets_instance() {
        let (_, c) = connector();
        let users = ModelType::builder("User").connector(c).build().unwrap();
        let a = users.lookup("1");
        a.free();
        assert_eq!(users.live_count(), 0);
        assert_ne!(users.lookup("1"), a);

        // A stale handle does not evict the mapped instance.
        a.free();
        assert_eq!(users.live_count(), 1);
    }

    #[test]
    fn create_and_lookup_existing() {
        let (_, c) = connector();
        let users = ModelType::builder("User")
            .connector(c)
            .field(&Integer::new("score").new_value(0))
            .build()
            .unwrap();

        assert!(matches!(
            users.lookup_existing("1"),
            Err(CoreError::NotFound { .. })
        ));

        let user = users.create("2").unwrap();
        assert_eq!(user.diff()["score"], "0");
        user.save().unwrap();

        assert!(matches!(users.create("2"), Err(CoreError::AlreadyExists { .. })));
        assert_eq!(users.lookup_existing("2").unwrap(), user);

        let generated = users.create_generated().unwrap();
        assert!(generated.id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn children_inherit_fields_and_connector() {
        let (_, c) = connector();
        let base = ModelType::builder("Base")
            .connector(c)
            .field(&Text::new("name"))
            .field(&Integer::new("age"))
            .build()
            .unwrap();
        let child = ModelType::builder("Child")
            .extends(&base)
            .field(&Integer::new("age").bounds(Some(0), Some(10)))
            .field(&Text::new("extra"))
            .build()
            .unwrap();
        let grandchild = ModelType::builder("Grandchild").extends(&child).build().unwrap();

        let names: Vec<&str> = child.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["name", "age", "extra"]);
        assert!(Arc::ptr_eq(child.connector(), base.connector()));
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &base));
        assert_eq!(base.children().len(), 1);
        assert_eq!(base.inheritors().len(), 2);
        assert!(Arc::ptr_eq(&base.inheritors()[1], &grandchild));
    }

    #[test]
    fn save_all_and_free_all_recurse() {
        let (store, c) = connector();
        let base = ModelType::builder("Base").connector(c).build().unwrap();
        let child = ModelType::builder("Child").extends(&base).build().unwrap();

        base.lookup("1").set("n", "1");
        child.lookup("2").set("n", "2");
        base.save_all().unwrap();

        assert!(store.exists("base:1").unwrap());
        assert!(store.exists("child:2").unwrap());
        assert!(!child.lookup("2").is_dirty());

        base.free_all();
        assert_eq!(base.live_count(), 0);
        assert_eq!(child.live_count(), 0);
    }

    #[test]
    fn failed_save_all_keeps_staged_changes() {
        let email = Email::new("email").unique();
        let (_, c) = connector();
        let users = ModelType::builder("User").connector(c).field(&email).build().unwrap();

        email.write(&users.lookup("1"), Some("a@b.cd".into())).unwrap();
        email.write(&users.lookup("2"), Some("a@b.cd".into())).unwrap();

        let err = users.save_all().unwrap_err();
        assert!(err.is_duplicate_key());
        assert!(users.lookup("1").is_dirty());
        assert!(users.lookup("2").is_dirty());
    }

    #[test]
    fn save_all_in_composes_models() {
        let (store, c) = connector();
        let users = ModelType::builder("User").connector(c.clone()).build().unwrap();
        let posts = ModelType::builder("Post").connector(c.clone()).build().unwrap();
        users.lookup("1").set("n", "1");
        posts.lookup("1").set("n", "1");

        let mut batch = c.batch();
        users.save_all_in(&mut batch).unwrap();
        posts.save_all_in(&mut batch).unwrap();
        assert!(store.is_empty());

        c.execute(batch).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn choice_requires_exact_index() {
        let name = Text::new("name").indexed();
        let age = Integer::new("age").indexed();
        let plain = Text::new("plain");
        let (_, c) = connector();
        let users = ModelType::builder("User")
            .connector(c)
            .field(&name)
            .field(&age)
            .field(&plain)
            .build()
            .unwrap();

        assert!(users.choice(&age, &1, 1).is_err());
        assert!(users.choice(&plain, &"x".to_string(), 1).is_err());
        assert!(users.choice(&name, &"x".to_string(), 1).unwrap().is_none());

        for id in ["1", "2", "3"] {
            let user = users.lookup(id);
            name.set(&user, "Ann".into()).unwrap();
            user.save().unwrap();
        }
        let picked = users.choice(&name, &"Ann".to_string(), 2).unwrap().unwrap();
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);
    }
}
