//! # KVModel Store
//!
//! Key-value store contract and in-memory implementation for KVModel.
//!
//! This crate is the lowest layer of KVModel. It models the subset of a
//! Redis-like server that the data-mapping layer needs:
//!
//! - **Hashes** holding entity records (`prefix:id`)
//! - **Sets** holding exact-match index entries (`prefix:field:value`)
//! - **Sorted sets** holding range index entries (`prefix:field`)
//! - **Atomic batches** that apply a command sequence all-or-nothing
//!
//! ## Design Principles
//!
//! - Stores know nothing about models, fields or indexes
//! - Writes only happen through [`Batch`] + [`KeyValueStore::execute`]
//! - Batches may carry [`Precondition`]s that are checked under the same
//!   critical section as the writes
//! - Stores must be `Send + Sync` for concurrent access
//!
//! ## Example
//!
//! ```rust
//! use kvmodel_store::{Batch, InMemoryStore, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! let mut batch = Batch::new();
//! batch.hset("user:1", [("name".to_string(), "John".to_string())]);
//! batch.sadd("user:name:John", "1");
//! store.execute(batch).unwrap();
//!
//! assert_eq!(store.hget("user:1", "name").unwrap().as_deref(), Some("John"));
//! assert_eq!(store.smembers("user:name:John").unwrap(), vec!["1".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod batch;
mod error;
mod memory;
mod score;

pub use backend::KeyValueStore;
pub use batch::{Batch, Command, Operation, Precondition};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use score::{ScoreBound, ScoreRange};
