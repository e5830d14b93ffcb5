//! Registry of model types.

use crate::config::Config;
use crate::connector::Connector;
use crate::error::{CoreError, CoreResult};
use crate::model::ModelType;
use crate::scope::RequestScope;
use parking_lot::RwLock;
use std::sync::{Arc, LazyLock};

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::default);

/// A set of named model types sharing a [`Config`].
///
/// Most programs use [`Registry::global`]; tests build their own to stay
/// isolated.
#[derive(Debug, Default)]
pub struct Registry {
    config: RwLock<Config>,
    types: RwLock<Vec<Arc<ModelType>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
            types: RwLock::new(Vec::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// A copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Replaces the configuration. Models already registered keep their
    /// connector.
    pub fn configure(&self, config: Config) {
        *self.config.write() = config;
    }

    /// Sets the connector used by models registered without one.
    pub fn set_default_connector(&self, connector: Arc<dyn Connector>) {
        self.config.write().connector = Some(connector);
    }

    /// Looks up a registered model by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ModelType>> {
        self.types.read().iter().find(|t| t.name() == name).cloned()
    }

    /// All registered models, in registration order.
    #[must_use]
    pub fn models(&self) -> Vec<Arc<ModelType>> {
        self.types.read().clone()
    }

    pub(crate) fn insert_with<F>(&self, name: &str, build: F) -> CoreResult<Arc<ModelType>>
    where
        F: FnOnce() -> CoreResult<Arc<ModelType>>,
    {
        let mut types = self.types.write();
        if types.iter().any(|t| t.name() == name) {
            return Err(CoreError::invalid_operation(format!(
                "model {name} is already registered"
            )));
        }
        let model = build()?;
        types.push(Arc::clone(&model));
        Ok(model)
    }

    /// Models whose parent is not registered here; class-level operations
    /// start from them and recurse.
    fn roots(&self) -> Vec<Arc<ModelType>> {
        let types = self.types.read();
        types
            .iter()
            .filter(|t| {
                t.parent()
                    .map_or(true, |parent| !types.iter().any(|o| Arc::ptr_eq(o, &parent)))
            })
            .cloned()
            .collect()
    }

    /// Saves every live entity of every model.
    ///
    /// # Errors
    ///
    /// Returns the first failure; see [`ModelType::save_all`].
    pub fn save_all(&self) -> CoreResult<()> {
        for model in self.roots() {
            model.save_all()?;
        }
        Ok(())
    }

    /// Clears the identity map of every model.
    pub fn free_all(&self) {
        for model in self.roots() {
            model.free_all();
        }
    }

    /// Opens a request scope configured from this registry.
    #[must_use]
    pub fn scope(&self) -> RequestScope<'_> {
        RequestScope::begin(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StoreConnector;
    use kvmodel_store::{InMemoryStore, KeyValueStore};

    fn registry() -> (Arc<InMemoryStore>, Registry) {
        let store = Arc::new(InMemoryStore::new());
        let config = Config::new().connector(Arc::new(StoreConnector::new(Arc::clone(&store))));
        (store, Registry::new(config))
    }

    #[test]
    fn register_uses_default_connector() {
        let (_, registry) = registry();
        let users = ModelType::builder("User").register(&registry).unwrap();
        assert!(Arc::ptr_eq(&registry.get("User").unwrap(), &users));
        assert!(registry.get("Post").is_none());
    }

    #[test]
    fn register_without_any_connector_fails() {
        let registry = Registry::default();
        assert!(ModelType::builder("User").register(&registry).is_err());
        assert!(registry.models().is_empty());
    }

    #[test]
    fn default_connector_set_after_construction() {
        let registry = Registry::default();
        assert!(ModelType::builder("Early").register(&registry).is_err());

        let store = Arc::new(InMemoryStore::new());
        registry.set_default_connector(Arc::new(StoreConnector::new(Arc::clone(&store))));
        let users = ModelType::builder("User").register(&registry).unwrap();
        users.lookup("1").set("name", "John");
        registry.save_all().unwrap();
        assert!(store.exists("user:1").unwrap());
    }

    #[test]
    fn duplicate_names_rejected() {
        let (_, registry) = registry();
        ModelType::builder("User").register(&registry).unwrap();
        let err = ModelType::builder("User").register(&registry).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn save_all_visits_children_once() {
        let (store, registry) = registry();
        let base = ModelType::builder("Base").register(&registry).unwrap();
        let child = ModelType::builder("Child")
            .extends(&base)
            .register(&registry)
            .unwrap();

        base.lookup("1").set("n", "1");
        child.lookup("1").set("n", "1");
        registry.save_all().unwrap();
        assert!(store.exists("base:1").unwrap());
        assert!(store.exists("child:1").unwrap());

        registry.free_all();
        assert_eq!(base.live_count() + child.live_count(), 0);
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(std::ptr::eq(Registry::global(), Registry::global()));
    }
}
