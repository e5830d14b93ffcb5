//! Test fixtures and model helpers.
//!
//! Provides registries over a fresh in-memory store and a `User` model
//! with one field of each common kind.

use kvmodel_core::{
    Boolean, Config, Email, Entity, Field, Integer, ModelType, Password, Registry,
    StoreConnector, Text,
};
use kvmodel_store::InMemoryStore;
use std::sync::Arc;

/// Creates a registry whose default connector writes to a fresh store.
pub fn test_registry() -> (Arc<InMemoryStore>, Registry) {
    let store = Arc::new(InMemoryStore::new());
    let connector = Arc::new(StoreConnector::new(Arc::clone(&store)));
    (store, Registry::new(Config::new().connector(connector)))
}

/// A `User` model with its field descriptors.
///
/// | field | kind | index |
/// |---|---|---|
/// | `email` | email | unique |
/// | `name` | text (1..=64 chars) | exact |
/// | `age` | integer in `[0, 150]` | range |
/// | `active` | boolean, new value `true` | exact |
/// | `password` | password | none |
pub struct TestModels {
    /// Backing store.
    pub store: Arc<InMemoryStore>,
    /// Registry holding `users`.
    pub registry: Registry,
    /// The `User` model (prefix `user`).
    pub users: Arc<ModelType>,
    /// Unique email.
    pub email: Email,
    /// Indexed display name.
    pub name: Text,
    /// Indexed, bounded age.
    pub age: Integer,
    /// Indexed flag, `true` for new users.
    pub active: Boolean,
    /// Hashed password.
    pub password: Password,
}

impl TestModels {
    /// Creates the fixture over a fresh store.
    pub fn new() -> Self {
        let (store, registry) = test_registry();
        let email = Email::new("email").unique();
        let name = Text::new("name").length(Some(1), Some(64)).indexed();
        let age = Integer::new("age").bounds(Some(0), Some(150)).indexed();
        let active = Boolean::new("active").indexed().new_value(true);
        let password = Password::new("password").length(Some(4), None);
        let users = ModelType::builder("User")
            .field(&email)
            .field(&name)
            .field(&age)
            .field(&active)
            .field(&password)
            .register(&registry)
            .expect("Failed to register User model");

        Self {
            store,
            registry,
            users,
            email,
            name,
            age,
            active,
            password,
        }
    }

    /// Creates and saves a user.
    pub fn user(&self, id: &str, email: &str, age: i64) -> Entity {
        let user = self.users.create(id).expect("Failed to create user");
        self.email
            .set(&user, email.to_string())
            .expect("Invalid email");
        self.age.set(&user, age).expect("Invalid age");
        user.save().expect("Failed to save user");
        user
    }
}

impl Default for TestModels {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh [`TestModels`].
///
/// # Example
///
/// ```rust,ignore
/// use kvmodel_testkit::with_models;
///
/// #[test]
/// fn my_test() {
///     with_models(|m| {
///         let user = m.users.lookup("1");
///         // ... test operations
///     });
/// }
/// ```
pub fn with_models<F, R>(f: F) -> R
where
    F: FnOnce(&TestModels) -> R,
{
    let models = TestModels::new();
    f(&models)
}

/// Exports an entity (absent fields as `null`) as JSON.
pub fn export_json(entity: &Entity) -> serde_json::Value {
    let exported = entity.export(true).expect("Failed to export entity");
    serde_json::to_value(exported).expect("Failed to serialize export")
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates `count` saved users `u0..`, aged `i % 100`.
    pub fn populated_users(count: usize) -> TestModels {
        let models = TestModels::new();
        for i in 0..count {
            let age = i64::try_from(i % 100).expect("age fits");
            models.user(&format!("u{i}"), &format!("user{i}@example.com"), age);
        }
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvmodel_core::Query;
    use kvmodel_store::KeyValueStore;

    #[test]
    fn test_user_is_saved_with_defaults() {
        with_models(|m| {
            let user = m.user("1", "A@B.cd", 30);
            assert!(m.store.exists("user:1").unwrap());
            assert_eq!(m.active.read(&user).unwrap(), Some(true));
            assert_eq!(m.email.read(&user).unwrap().as_deref(), Some("a@b.cd"));
        });
    }

    #[test]
    fn test_export_json() {
        with_models(|m| {
            let user = m.user("1", "a@b.cd", 30);
            let json = export_json(&user);
            assert_eq!(json["age"], 30);
            assert_eq!(json["active"], true);
            assert!(json["name"].is_null());
        });
    }

    #[test]
    fn test_populated_scenario() {
        let m = scenarios::populated_users(10);
        assert_eq!(m.users.live_count(), 10);
        let young = Query::less_than(&m.users, &m.age, &5).unwrap();
        assert_eq!(young.len().unwrap(), 5);
    }
}
