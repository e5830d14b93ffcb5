//! Connector trait and entity snapshots.

use crate::connector::record_key;
use crate::error::CoreResult;
use crate::field::FieldSpec;
use kvmodel_store::{Batch, ScoreRange};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Read-only view of an entity handed to a connector.
///
/// Connectors receive everything they need through the snapshot and never
/// call back into the entity, which stays locked for the duration of the
/// call.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// Model key prefix.
    pub prefix: &'a str,
    /// Entity id.
    pub id: &'a str,
    /// Declared fields of the model, in declaration order.
    pub fields: &'a [Arc<dyn FieldSpec>],
    /// Whether the record is known to exist (`None` if never checked).
    pub exists: Option<bool>,
    /// Backing data, if loaded.
    pub data: Option<&'a HashMap<String, String>>,
    /// Staged writes.
    pub diff: &'a HashMap<String, String>,
    /// Staged deletions.
    pub dels: &'a HashSet<String>,
}

impl Record<'_> {
    /// Key of the record hash.
    #[must_use]
    pub fn key(&self) -> String {
        record_key(self.prefix, self.id)
    }

    /// Returns true if the record is known not to exist.
    #[must_use]
    pub fn is_known_missing(&self) -> bool {
        self.exists == Some(false)
    }
}

/// Storage operations needed by models and queries.
///
/// Implementations must make [`Connector::save`] and [`Connector::delete`]
/// atomic: either the record and every index entry change, or nothing does.
/// Uniqueness checks must hold at the moment the batch applies, not only when
/// it is built.
///
/// Operations taking `Option<&mut Batch>` append to the given batch when one
/// is supplied (the caller executes it later, composing several entities
/// into one atomic unit), and otherwise execute a batch of their own before
/// returning.
///
/// # Implementors
///
/// - [`super::StoreConnector`] - Over any [`kvmodel_store::KeyValueStore`]
pub trait Connector: Send + Sync {
    /// Canonical key of an entity record.
    fn key(&self, prefix: &str, id: &str) -> String {
        record_key(prefix, id)
    }

    /// Begins an empty batch.
    fn batch(&self) -> Batch {
        Batch::new()
    }

    /// Applies a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::DuplicateKey`] if a uniqueness check
    /// failed, or a store error. Nothing is applied in either case.
    fn execute(&self, batch: Batch) -> CoreResult<()>;

    /// Checks whether the record exists.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    fn exists(&self, record: &Record<'_>) -> CoreResult<bool>;

    /// Fetches a single field without loading the record.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    fn get_field(&self, record: &Record<'_>, name: &str) -> CoreResult<Option<String>>;

    /// Fetches the whole record; missing records yield an empty map.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    fn get_all_fields(&self, record: &Record<'_>) -> CoreResult<HashMap<String, String>>;

    /// Persists staged writes and deletions together with index updates.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::DuplicateKey`] if a unique field value is
    /// held by another entity. Nothing is written or queued in that case.
    fn save(&self, record: &Record<'_>, batch: Option<&mut Batch>) -> CoreResult<()>;

    /// Removes the record and all of its index entries.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    fn delete(&self, record: &Record<'_>, batch: Option<&mut Batch>) -> CoreResult<()>;

    /// Ids in the exact index of `field` for `value`.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    fn resolve_exact_index(&self, prefix: &str, field: &str, value: &str) -> CoreResult<Vec<String>>;

    /// Ids in the range index of `field` scored inside `range`, ascending.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    fn resolve_range_index(
        &self,
        prefix: &str,
        field: &str,
        range: ScoreRange,
        offset: usize,
        limit: Option<usize>,
    ) -> CoreResult<Vec<String>>;

    /// Up to `count` random ids from the exact index of `field` for
    /// `value`, or `None` if the index entry is empty.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    fn pick_random(
        &self,
        prefix: &str,
        field: &str,
        value: &str,
        count: usize,
    ) -> CoreResult<Option<Vec<String>>>;
}
