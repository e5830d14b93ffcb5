//! Identity-mapped, lazily loaded, diff-tracked entities.

use crate::connector::{Connector, Record};
use crate::error::{CoreError, CoreResult};
use crate::field::FieldValue;
use crate::model::ModelType;
use kvmodel_store::Batch;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// Options for [`Entity::get_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Ignore staged writes and deletions; read the persisted value.
    pub origin: bool,
    /// When the record is not loaded, fetch the single field instead of
    /// loading the whole record. The fetched value is not cached.
    pub partial: bool,
}

impl ReadOptions {
    /// Default options: local changes win, full load.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            origin: false,
            partial: false,
        }
    }

    /// Sets whether local changes are ignored.
    #[must_use]
    pub const fn origin(mut self, value: bool) -> Self {
        self.origin = value;
        self
    }

    /// Sets whether a single-field fetch is allowed.
    #[must_use]
    pub const fn partial(mut self, value: bool) -> Self {
        self.partial = value;
        self
    }
}

#[derive(Debug, Default)]
struct EntityState {
    exists: Option<bool>,
    data: Option<HashMap<String, String>>,
    diff: HashMap<String, String>,
    dels: HashSet<String>,
}

impl EntityState {
    fn apply_loaded(&mut self, data: HashMap<String, String>) {
        self.exists = Some(!data.is_empty());
        self.diff.retain(|name, value| data.get(name) != Some(&*value));
        self.data = Some(data);
    }

    fn revert(&mut self) {
        self.diff.clear();
        self.dels.clear();
    }

    fn loaded_value(&self, name: &str) -> Option<&String> {
        self.data.as_ref().and_then(|data| data.get(name))
    }
}

/// Writes and deletions handed to the connector by one save.
pub(crate) struct PendingSave {
    diff: HashMap<String, String>,
    dels: HashSet<String>,
}

struct EntityInner {
    id: String,
    model: Arc<ModelType>,
    state: Mutex<EntityState>,
}

/// A record of a model, identified by (model, id).
///
/// Entities are handles: cloning one yields the same instance, and two
/// handles compare equal only if they point to the same instance. A model
/// hands out one instance per id (see [`ModelType::lookup`]).
///
/// Values are stored as strings. Reads resolve in three tiers: a staged
/// deletion hides the value, then a staged write wins, and otherwise the
/// persisted record is loaded on first use. Writes stay local until
/// [`Entity::save`].
///
/// # Example
///
/// ```rust,ignore
/// let user = users.lookup("42");
/// user.set("name", "John");
/// assert_eq!(user.get("name")?.as_deref(), Some("John"));
/// user.save()?;
/// ```
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    pub(crate) fn new(id: String, model: Arc<ModelType>) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                id,
                model,
                state: Mutex::new(EntityState::default()),
            }),
        }
    }

    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Returns the entity's model.
    #[must_use]
    pub fn model(&self) -> &Arc<ModelType> {
        &self.inner.model
    }

    fn connector(&self) -> &Arc<dyn Connector> {
        self.inner.model.connector()
    }

    fn record<'a>(&'a self, state: &'a EntityState) -> Record<'a> {
        Record {
            prefix: self.inner.model.prefix(),
            id: &self.inner.id,
            fields: self.inner.model.fields(),
            exists: state.exists,
            data: state.data.as_ref(),
            diff: &state.diff,
            dels: &state.dels,
        }
    }

    fn load_state(&self, state: &mut EntityState) -> CoreResult<()> {
        if state.data.is_some() {
            return Ok(());
        }
        if state.exists == Some(false) {
            state.data = Some(HashMap::new());
            return Ok(());
        }
        let data = self.connector().get_all_fields(&self.record(state))?;
        debug!(
            model = self.inner.model.name(),
            id = self.id(),
            fields = data.len(),
            "loaded entity"
        );
        state.apply_loaded(data);
        Ok(())
    }

    /// Returns true if `name` has a value after local changes.
    ///
    /// # Errors
    ///
    /// Returns store errors from the lazy load.
    pub fn contains(&self, name: &str) -> CoreResult<bool> {
        let mut state = self.inner.state.lock();
        if state.dels.contains(name) {
            return Ok(false);
        }
        if state.diff.contains_key(name) {
            return Ok(true);
        }
        self.load_state(&mut state)?;
        Ok(state.loaded_value(name).is_some())
    }

    /// Returns the value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyNotFound`] if the value is staged for deletion
    /// or absent from both the staged writes and the record.
    pub fn get_item(&self, name: &str) -> CoreResult<String> {
        let mut state = self.inner.state.lock();
        if state.dels.contains(name) {
            return Err(CoreError::key_not_found(name));
        }
        if let Some(value) = state.diff.get(name) {
            return Ok(value.clone());
        }
        self.load_state(&mut state)?;
        state
            .loaded_value(name)
            .cloned()
            .ok_or_else(|| CoreError::key_not_found(name))
    }

    /// Stages a write of `name`.
    ///
    /// Writing back the persisted value cancels any staged change instead.
    pub fn set(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let mut state = self.inner.state.lock();
        if state.loaded_value(name) == Some(&value) {
            state.diff.remove(name);
        } else {
            state.diff.insert(name.to_string(), value);
        }
        state.dels.remove(name);
    }

    /// Stages a write, or a deletion for `None`.
    pub fn set_opt(&self, name: &str, value: Option<impl Into<String>>) {
        match value {
            Some(value) => self.set(name, value),
            None => self.remove(name),
        }
    }

    /// Stages a deletion of `name`.
    ///
    /// Entities known not to exist have nothing to delete, so only the
    /// staged write (if any) is dropped.
    pub fn remove(&self, name: &str) {
        let mut state = self.inner.state.lock();
        if state.exists != Some(false) {
            state.dels.insert(name.to_string());
        }
        state.diff.remove(name);
    }

    /// Returns the value of `name`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns store errors from the lazy load.
    pub fn get(&self, name: &str) -> CoreResult<Option<String>> {
        self.get_with(name, ReadOptions::new())
    }

    /// Returns the value of `name` using `options`.
    ///
    /// # Errors
    ///
    /// Returns store errors from the load or fetch.
    pub fn get_with(&self, name: &str, options: ReadOptions) -> CoreResult<Option<String>> {
        let mut state = self.inner.state.lock();
        if !options.origin {
            if state.dels.contains(name) {
                return Ok(None);
            }
            if let Some(value) = state.diff.get(name) {
                return Ok(Some(value.clone()));
            }
        }
        if options.partial && state.data.is_none() && state.exists != Some(false) {
            return self.connector().get_field(&self.record(&state), name);
        }
        self.load_state(&mut state)?;
        Ok(state.loaded_value(name).cloned())
    }

    /// Returns all values, merged with local changes unless `origin` is set.
    ///
    /// # Errors
    ///
    /// Returns store errors from the lazy load.
    pub fn get_all(&self, origin: bool) -> CoreResult<HashMap<String, String>> {
        let mut state = self.inner.state.lock();
        self.load_state(&mut state)?;
        let mut data = state.data.clone().unwrap_or_default();
        if !origin {
            data.extend(state.diff.iter().map(|(k, v)| (k.clone(), v.clone())));
            data.retain(|name, _| !state.dels.contains(name));
        }
        Ok(data)
    }

    /// Number of values after local changes.
    ///
    /// # Errors
    ///
    /// Returns store errors from the lazy load.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.get_all(false)?.len())
    }

    /// Returns the value of `name` and stages its deletion.
    ///
    /// # Errors
    ///
    /// Returns store errors from the lazy load.
    pub fn pop(&self, name: &str) -> CoreResult<Option<String>> {
        let value = self.get(name)?;
        self.remove(name);
        Ok(value)
    }

    /// Returns true if the record exists in the store.
    ///
    /// The store is probed at most once; the answer is cached until
    /// [`Entity::forget_exists`]. A missing record also counts as loaded
    /// (and empty) from then on.
    ///
    /// # Errors
    ///
    /// Returns store errors from the probe.
    pub fn exists(&self) -> CoreResult<bool> {
        let mut state = self.inner.state.lock();
        let exists = match state.exists {
            Some(exists) => exists,
            None => {
                let exists = self.connector().exists(&self.record(&state))?;
                state.exists = Some(exists);
                exists
            }
        };
        if !exists && state.data.is_none() {
            state.data = Some(HashMap::new());
        }
        Ok(exists)
    }

    /// Drops the cached existence answer.
    ///
    /// An empty record assumed from a missing answer is dropped too, so
    /// the next read loads from the store.
    pub fn forget_exists(&self) {
        let mut state = self.inner.state.lock();
        if state.exists == Some(false) && state.data.as_ref().is_some_and(HashMap::is_empty) {
            state.data = None;
        }
        state.exists = None;
    }

    /// Discards staged writes and deletions.
    pub fn revert(&self) {
        self.inner.state.lock().revert();
    }

    /// Snapshot of the staged writes.
    #[must_use]
    pub fn diff(&self) -> HashMap<String, String> {
        self.inner.state.lock().diff.clone()
    }

    /// Snapshot of the staged deletions.
    #[must_use]
    pub fn deletions(&self) -> HashSet<String> {
        self.inner.state.lock().dels.clone()
    }

    /// Returns true if there are staged writes or deletions.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let state = self.inner.state.lock();
        !state.diff.is_empty() || !state.dels.is_empty()
    }

    /// Loads the record unless already loaded.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn load(&self) -> CoreResult<()> {
        let mut state = self.inner.state.lock();
        self.load_state(&mut state)
    }

    /// Returns true if the record is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().data.is_some()
    }

    /// Drops the loaded record. Staged changes are kept.
    pub fn unload(&self) {
        self.inner.state.lock().data = None;
    }

    /// Persists staged changes and index updates in one atomic batch.
    ///
    /// Does nothing if there is nothing staged.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateKey`] if a unique value is taken. The
    /// store and the staged changes are left as they were.
    pub fn save(&self) -> CoreResult<()> {
        let mut batch = self.connector().batch();
        if let Some(pending) = self.stage_save(&mut batch)? {
            self.connector().execute(batch)?;
            self.reconcile(pending);
        }
        Ok(())
    }

    /// Queues the save into `batch` for the caller to execute.
    ///
    /// The entity is reconciled right away, as if the batch had applied.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateKey`] if a unique value is taken at
    /// queue time. Nothing is queued in that case.
    pub fn save_in(&self, batch: &mut Batch) -> CoreResult<()> {
        if let Some(pending) = self.stage_save(batch)? {
            self.reconcile(pending);
        }
        Ok(())
    }

    /// Stages this entity's save into `batch`, returning what was staged.
    pub(crate) fn stage_save(&self, batch: &mut Batch) -> CoreResult<Option<PendingSave>> {
        let state = self.inner.state.lock();
        if state.diff.is_empty() && state.dels.is_empty() {
            return Ok(None);
        }
        self.connector().save(&self.record(&state), Some(batch))?;
        Ok(Some(PendingSave {
            diff: state.diff.clone(),
            dels: state.dels.clone(),
        }))
    }

    /// Applies a persisted save to the local state.
    ///
    /// Changes staged after `pending` was taken survive.
    pub(crate) fn reconcile(&self, pending: PendingSave) {
        let mut state = self.inner.state.lock();
        if let Some(data) = state.data.as_mut() {
            data.extend(pending.diff.iter().map(|(k, v)| (k.clone(), v.clone())));
            for name in &pending.dels {
                data.remove(name);
            }
        }
        state
            .diff
            .retain(|name, value| pending.diff.get(name) != Some(&*value));
        state.dels.retain(|name| !pending.dels.contains(name));
        state.exists = Some(true);
        debug!(model = self.inner.model.name(), id = self.id(), "saved entity");
    }

    /// Deletes the record and its index entries.
    ///
    /// Afterwards the entity is empty, known missing and has no staged
    /// changes, whatever its state before.
    ///
    /// # Errors
    ///
    /// Returns store errors; the local state is untouched in that case.
    pub fn delete(&self) -> CoreResult<()> {
        self.delete_to(None)
    }

    /// Queues the delete into `batch`; the entity is cleared right away.
    ///
    /// # Errors
    ///
    /// Returns store errors from reading the indexed values.
    pub fn delete_in(&self, batch: &mut Batch) -> CoreResult<()> {
        self.delete_to(Some(batch))
    }

    fn delete_to(&self, batch: Option<&mut Batch>) -> CoreResult<()> {
        let mut state = self.inner.state.lock();
        if state.exists != Some(false) {
            self.connector().delete(&self.record(&state), batch)?;
            debug!(model = self.inner.model.name(), id = self.id(), "deleted entity");
        }
        state.exists = Some(false);
        state.data = Some(HashMap::new());
        state.revert();
        Ok(())
    }

    /// Assigns every field's new-entity default.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if a default is rejected by its
    /// field. Defaults assigned before the failing one stay staged.
    pub fn fill_new(&self) -> CoreResult<()> {
        for field in self.inner.model.fields() {
            if let Some(value) = field.new_storage_value() {
                self.set(field.name(), value?);
            }
        }
        Ok(())
    }

    /// Converts every declared field to its native value.
    ///
    /// Absent fields without a none-sentinel are omitted, or exported as
    /// [`FieldValue::Null`] when `keep_none` is set.
    ///
    /// # Errors
    ///
    /// Returns store errors from the lazy load, or conversion errors for
    /// malformed stored data.
    pub fn export(&self, keep_none: bool) -> CoreResult<BTreeMap<String, FieldValue>> {
        let mut out = BTreeMap::new();
        for field in self.inner.model.fields() {
            let raw = self.get(field.name())?;
            match field.export(raw.as_deref())? {
                Some(value) => {
                    out.insert(field.name().to_string(), value);
                }
                None if keep_none => {
                    out.insert(field.name().to_string(), FieldValue::Null);
                }
                None => {}
            }
        }
        Ok(out)
    }

    /// Removes this entity from its model's identity map.
    ///
    /// The next lookup of the id creates a fresh instance.
    pub fn free(&self) {
        self.inner.model.release(self);
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.inner.model.name())
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StoreConnector;
    use crate::field::{Field, Integer, Text};
    use crate::model::ModelType;
    use kvmodel_store::{InMemoryStore, KeyValueStore};

    fn model() -> (Arc<InMemoryStore>, Arc<ModelType>) {
        let store = Arc::new(InMemoryStore::new());
        let model = ModelType::builder("User")
            .connector(Arc::new(StoreConnector::new(Arc::clone(&store))))
            .field(&Text::new("name").indexed())
            .field(&Integer::new("age").new_value(18))
            .build()
            .unwrap();
        (store, model)
    }

    fn seed(store: &InMemoryStore, key: &str, pairs: &[(&str, &str)]) {
        let mut batch = Batch::new();
        batch.hset(
            key,
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        );
        store.execute(batch).unwrap();
    }

    #[test]
    fn three_tier_read() {
        let (store, users) = model();
        seed(&store, "user:1", &[("name", "John")]);
        let user = users.lookup("1");

        assert_eq!(user.get_item("name").unwrap(), "John");
        user.set("name", "Jane");
        assert_eq!(user.get_item("name").unwrap(), "Jane");
        user.remove("name");
        assert!(matches!(user.get_item("name"), Err(CoreError::KeyNotFound { .. })));
        assert!(!user.contains("name").unwrap());

        user.revert();
        assert_eq!(user.get_item("name").unwrap(), "John");
    }

    #[test]
    fn writing_persisted_value_cancels_change() {
        let (store, users) = model();
        seed(&store, "user:1", &[("name", "John")]);
        let user = users.lookup("1");
        user.load().unwrap();

        user.set("name", "Jane");
        user.set("name", "John");
        assert!(user.diff().is_empty());

        user.remove("name");
        user.set("name", "John");
        assert!(user.deletions().is_empty());
        assert!(!user.is_dirty());
    }

    #[test]
    fn load_drops_writes_equal_to_stored_values() {
        let (store, users) = model();
        seed(&store, "user:1", &[("name", "John")]);
        let user = users.lookup("1");

        user.set("name", "John");
        assert_eq!(user.diff().len(), 1);
        user.load().unwrap();
        assert!(user.diff().is_empty());
        assert!(user.exists().unwrap());
    }

    #[test]
    fn known_missing_entity_loads_without_io() {
        let (_store, users) = model();
        let user = users.lookup("ghost");
        assert!(!user.exists().unwrap());
        assert!(user.is_loaded());
        assert!(user.get_all(false).unwrap().is_empty());

        user.remove("name");
        assert!(user.deletions().is_empty());
    }

    #[test]
    fn origin_and_partial_reads() {
        let (store, users) = model();
        seed(&store, "user:1", &[("name", "John")]);
        let user = users.lookup("1");
        user.set("name", "Jane");

        let partial = ReadOptions::new().origin(true).partial(true);
        assert_eq!(user.get_with("name", partial).unwrap().as_deref(), Some("John"));
        assert!(!user.is_loaded());

        assert_eq!(user.get("name").unwrap().as_deref(), Some("Jane"));
        assert!(!user.is_loaded());
        assert_eq!(user.get_all(true).unwrap()["name"], "John");
        assert!(user.is_loaded());
    }

    #[test]
    fn pop_returns_and_stages_deletion() {
        let (store, users) = model();
        seed(&store, "user:1", &[("name", "John"), ("age", "30")]);
        let user = users.lookup("1");

        assert_eq!(user.pop("age").unwrap().as_deref(), Some("30"));
        assert_eq!(user.len().unwrap(), 1);
        assert!(user.deletions().contains("age"));
    }

    #[test]
    fn save_reconciles_loaded_data() {
        let (store, users) = model();
        let user = users.lookup("1");
        user.set("name", "John");
        user.save().unwrap();

        assert!(user.exists().unwrap());
        assert!(!user.is_dirty());
        assert_eq!(store.hget("user:1", "name").unwrap().as_deref(), Some("John"));

        user.load().unwrap();
        user.remove("name");
        user.set("age", "40");
        user.save().unwrap();
        assert_eq!(user.get_all(true).unwrap().get("name"), None);
        assert_eq!(user.get_all(true).unwrap()["age"], "40");
    }

    #[test]
    fn save_without_changes_is_noop() {
        let (store, users) = model();
        users.lookup("1").save().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn delete_always_leaves_empty_missing_entity() {
        let (store, users) = model();
        seed(&store, "user:1", &[("name", "John")]);
        let user = users.lookup("1");
        user.set("age", "3");

        user.delete().unwrap();
        assert!(!user.exists().unwrap());
        assert!(user.is_loaded());
        assert!(!user.is_dirty());
        assert!(store.is_empty());

        // Known missing: nothing reaches the store.
        user.delete().unwrap();
    }

    #[test]
    fn fill_new_assigns_defaults() {
        let (_store, users) = model();
        let user = users.lookup("1");
        user.fill_new().unwrap();
        assert_eq!(user.diff()["age"], "18");
        assert!(!user.diff().contains_key("name"));
    }

    #[test]
    fn export_converts_and_keeps_none() {
        let (_store, users) = model();
        let user = users.lookup("1");
        user.set("age", "26");

        let out = user.export(false).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["age"], FieldValue::Integer(26));

        let out = user.export(true).unwrap();
        assert_eq!(out["name"], FieldValue::Null);
    }

    #[test]
    fn handles_share_identity() {
        let (_store, users) = model();
        let a = users.lookup("1");
        let b = a.clone();
        assert_eq!(a, b);
        b.set("name", "x");
        assert!(a.is_dirty());
        assert_eq!(format!("{a:?}"), "Entity { model: \"User\", id: \"1\", .. }");
    }

    #[test]
    fn forget_exists_reloads_record_created_elsewhere() {
        let (store, users) = model();
        let user = users.lookup("1");
        assert!(!user.exists().unwrap());
        assert!(user.is_loaded());

        seed(&store, "user:1", &[("name", "John")]);
        user.forget_exists();
        assert!(!user.is_loaded());
        assert!(user.exists().unwrap());
        assert_eq!(user.get("name").unwrap().as_deref(), Some("John"));
    }

    #[test]
    fn forget_exists_keeps_loaded_record() {
        let (store, users) = model();
        seed(&store, "user:1", &[("name", "John")]);
        let user = users.lookup("1");
        user.load().unwrap();
        user.forget_exists();
        assert!(user.is_loaded());
        assert!(user.exists().unwrap());
    }
}
