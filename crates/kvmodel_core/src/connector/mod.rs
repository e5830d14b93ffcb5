//! Connector contract between models and a store.
//!
//! Models never talk to a [`kvmodel_store::KeyValueStore`] directly. They
//! hand a [`Record`] snapshot to a [`Connector`], which derives keys, reads
//! records, and turns saves and deletes into one atomic batch that also
//! maintains the secondary indexes.
//!
//! # Key Layout
//!
//! | data | key | store type |
//! |---|---|---|
//! | entity record | `prefix:id` | hash |
//! | exact index | `prefix:field:value` | set of ids |
//! | range index | `prefix:field` | sorted set of ids |

mod store;
mod traits;

pub use store::StoreConnector;
pub use traits::{Connector, Record};

/// Key of an entity's record hash.
#[must_use]
pub fn record_key(prefix: &str, id: &str) -> String {
    format!("{prefix}:{id}")
}

/// Key of the exact-index set for one field value.
#[must_use]
pub fn exact_index_key(prefix: &str, field: &str, value: &str) -> String {
    format!("{prefix}:{field}:{value}")
}

/// Key of the range-index sorted set for a field.
#[must_use]
pub fn range_index_key(prefix: &str, field: &str) -> String {
    format!("{prefix}:{field}")
}
