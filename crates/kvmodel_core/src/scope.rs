//! Request-scoped entity lifecycle.

use crate::error::CoreResult;
use crate::model::Registry;
use tracing::{debug, error};

/// Brackets one unit of work (typically a request) against a [`Registry`].
///
/// When the scope ends, every live entity is saved if autosave is enabled
/// and the scope ended cleanly, and every identity map is cleared in all
/// cases. A scope ends cleanly unless it was marked failed or is dropped
/// during a panic.
///
/// # Example
///
/// ```rust,ignore
/// let scope = registry.scope().autosave(true);
/// handle_request(&users)?;
/// scope.finish()?;
/// ```
#[must_use = "the scope ends when dropped"]
pub struct RequestScope<'a> {
    registry: &'a Registry,
    autosave: bool,
    failed: bool,
    finished: bool,
}

impl<'a> RequestScope<'a> {
    /// Opens a scope; autosave follows the registry configuration.
    pub fn begin(registry: &'a Registry) -> Self {
        Self {
            registry,
            autosave: registry.config().autosave,
            failed: false,
            finished: false,
        }
    }

    /// Overrides autosave for this scope.
    pub fn autosave(mut self, value: bool) -> Self {
        self.autosave = value;
        self
    }

    /// Marks the unit of work as failed; nothing will be saved.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Ends the scope, reporting save errors.
    ///
    /// # Errors
    ///
    /// Returns the first error from saving. Identity maps are cleared
    /// regardless.
    pub fn finish(mut self) -> CoreResult<()> {
        self.finished = true;
        self.end()
    }

    fn end(&self) -> CoreResult<()> {
        let saved = if self.autosave && !self.failed {
            self.registry.save_all()
        } else {
            Ok(())
        };
        self.registry.free_all();
        debug!(autosave = self.autosave, failed = self.failed, "request scope ended");
        saved
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            self.failed = true;
        }
        if let Err(err) = self.end() {
            error!(error = %err, "autosave at end of request scope failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::connector::StoreConnector;
    use crate::field::{Email, Field};
    use crate::model::ModelType;
    use kvmodel_store::{InMemoryStore, KeyValueStore};
    use std::sync::Arc;

    fn registry(autosave: bool) -> (Arc<InMemoryStore>, Registry) {
        let store = Arc::new(InMemoryStore::new());
        let config = Config::new()
            .connector(Arc::new(StoreConnector::new(Arc::clone(&store))))
            .autosave(autosave);
        (store, Registry::new(config))
    }

    #[test]
    fn autosave_then_free() {
        let (store, registry) = registry(true);
        let users = ModelType::builder("User").register(&registry).unwrap();
        {
            let _scope = registry.scope();
            users.lookup("1").set("name", "John");
        }
        assert!(store.exists("user:1").unwrap());
        assert_eq!(users.live_count(), 0);
    }

    #[test]
    fn without_autosave_only_frees() {
        let (store, registry) = registry(false);
        let users = ModelType::builder("User").register(&registry).unwrap();
        let scope = registry.scope();
        users.lookup("1").set("name", "John");
        scope.finish().unwrap();
        assert!(store.is_empty());
        assert_eq!(users.live_count(), 0);
    }

    #[test]
    fn failed_scope_skips_save() {
        let (store, registry) = registry(true);
        let users = ModelType::builder("User").register(&registry).unwrap();
        let mut scope = registry.scope();
        users.lookup("1").set("name", "John");
        scope.mark_failed();
        scope.finish().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn panic_skips_save() {
        let (store, registry) = registry(true);
        let users = ModelType::builder("User").register(&registry).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = registry.scope();
            users.lookup("1").set("name", "John");
            panic!("handler failed");
        }));
        assert!(result.is_err());
        assert!(store.is_empty());
        assert_eq!(users.live_count(), 0);
    }

    #[test]
    fn finish_reports_save_errors() {
        let (_, registry) = registry(false);
        let email = Email::new("email").unique();
        let users = ModelType::builder("User").field(&email).register(&registry).unwrap();
        let scope = registry.scope().autosave(true);
        email.set(&users.lookup("1"), "a@b.cd".into()).unwrap();
        email.set(&users.lookup("2"), "a@b.cd".into()).unwrap();
        assert!(scope.finish().unwrap_err().is_duplicate_key());
        assert_eq!(users.live_count(), 0);
    }
}
