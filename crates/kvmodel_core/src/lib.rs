//! # KVModel Core
//!
//! Domain objects over a Redis-like key-value store.
//!
//! This crate provides:
//! - Typed field descriptors with validation ([`field`])
//! - Identity-mapped entities that load lazily and track local changes
//!   ([`Entity`], [`ModelType`])
//! - Exact and range secondary indexes with uniqueness checks
//! - Lazy index queries ([`Query`])
//! - The [`Connector`] contract and its adapter over any
//!   [`kvmodel_store::KeyValueStore`]
//! - A request-scoped lifecycle guard ([`RequestScope`])
//!
//! ## Example
//!
//! ```rust
//! use kvmodel_core::prelude::*;
//! use kvmodel_store::InMemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let registry = Registry::new(Config::new().connector(Arc::new(StoreConnector::new(store))));
//!
//! let email = Email::new("email").unique();
//! let age = Integer::new("age").bounds(Some(0), Some(150)).indexed();
//! let users = ModelType::builder("User")
//!     .field(&email)
//!     .field(&age)
//!     .register(&registry)
//!     .unwrap();
//!
//! let user = users.create(kvmodel_core::int_id()).unwrap();
//! email.set(&user, "John@Example.com".into()).unwrap();
//! age.set(&user, 26).unwrap();
//! user.save().unwrap();
//!
//! let found = Query::equals(&users, &email, &"john@example.com".to_string()).unwrap();
//! assert_eq!(found.get(0).unwrap(), Some(user));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod connector;
mod error;
pub mod field;
mod id;
mod model;
mod query;
mod scope;

pub use config::Config;
pub use connector::{Connector, Record, StoreConnector};
pub use error::{CoreError, CoreResult};
pub use field::{
    Boolean, Email, Field, FieldSpec, FieldValue, IndexKind, Integer, Password, Reference, Text,
    Timestamp,
};
pub use id::{hex_id, int_id};
pub use model::{Entity, ModelBuilder, ModelId, ModelType, ReadOptions, Registry};
pub use query::{Operator, Query};
pub use scope::RequestScope;

/// Common imports.
pub mod prelude {
    pub use crate::{
        Boolean, Config, Connector, CoreError, CoreResult, Email, Entity, Field, Integer,
        ModelType, Operator, Password, Query, Reference, Registry, RequestScope, StoreConnector,
        Text, Timestamp,
    };
}
