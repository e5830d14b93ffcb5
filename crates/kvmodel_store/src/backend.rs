//! Key-value store trait definition.

use crate::batch::Batch;
use crate::error::StoreResult;
use crate::score::ScoreRange;
use std::collections::HashMap;

/// A Redis-like store used by KVModel.
///
/// Stores are **opaque**: they hold hashes, sets and sorted sets under
/// string keys and have no notion of models, fields or indexes. KVModel owns
/// the key layout.
///
/// # Invariants
///
/// - Reads never observe a partially applied batch
/// - `execute` applies every command of a batch or none of them
/// - `execute` evaluates a batch's preconditions inside the same critical
///   section as its writes
/// - Empty hashes and sets do not exist (`exists` returns false)
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing and embedded use
pub trait KeyValueStore: Send + Sync {
    /// Returns true if any value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Reads one hash field.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::WrongType`] if `key` is not a hash.
    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Reads a whole hash. Missing keys yield an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::WrongType`] if `key` is not a hash.
    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Returns all members of a set, in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::WrongType`] if `key` is not a set.
    fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Returns up to `count` distinct random members of a set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::WrongType`] if `key` is not a set.
    fn srandmember(&self, key: &str, count: usize) -> StoreResult<Vec<String>>;

    /// Returns sorted-set members whose score lies in `range`, ordered by
    /// ascending score (ties broken by member), skipping `offset` matches
    /// and returning at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::WrongType`] if `key` is not a sorted set.
    fn zrangebyscore(
        &self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>>;

    /// Returns the score of a sorted-set member.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::WrongType`] if `key` is not a sorted set.
    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Applies a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::PreconditionFailed`] if a check fails, or
    /// any command error. In both cases nothing is applied.
    fn execute(&self, batch: Batch) -> StoreResult<()>;
}
