//! Connector over a [`KeyValueStore`].

use crate::connector::traits::{Connector, Record};
use crate::connector::{exact_index_key, range_index_key};
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldSpec, IndexKind};
use kvmodel_store::{Batch, KeyValueStore, Precondition, ScoreRange, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps models onto hashes, sets and sorted sets of a [`KeyValueStore`].
///
/// Saves and deletes are staged into a local batch first. A failed
/// uniqueness pre-check therefore leaves both the store and any caller
/// batch untouched. Every unique write also carries a [`Precondition`], so
/// two concurrent saves racing for the same value cannot both commit.
pub struct StoreConnector<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
}

impl<S: KeyValueStore + ?Sized> StoreConnector<S> {
    /// Creates a connector over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn stage_save(&self, record: &Record<'_>, batch: &mut Batch) -> CoreResult<()> {
        for field in record.fields.iter().filter(|f| f.maintains_index()) {
            let name = field.name();
            if record.dels.contains(name) {
                if !record.is_known_missing() {
                    self.stage_unindex(record, field.as_ref(), batch)?;
                }
            } else if let Some(value) = record.diff.get(name) {
                match field.index_kind() {
                    IndexKind::Exact => self.stage_exact(record, field.as_ref(), value, batch)?,
                    IndexKind::Range => self.stage_range(record, field.as_ref(), value, batch)?,
                }
            }
        }

        let key = self.key(record.prefix, record.id);
        if !record.is_known_missing() {
            let mut dels: Vec<&String> = record.dels.iter().collect();
            dels.sort();
            batch.hdel(key.clone(), dels.into_iter().cloned());
        }
        let mut diff: Vec<(String, String)> = record
            .diff
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        diff.sort();
        batch.hset(key, diff);
        Ok(())
    }

    fn stage_exact(
        &self,
        record: &Record<'_>,
        field: &dyn FieldSpec,
        value: &str,
        batch: &mut Batch,
    ) -> CoreResult<()> {
        let index = exact_index_key(record.prefix, field.name(), value);
        if field.is_unique() {
            let holders = self.store.smembers(&index)?;
            if holders.iter().any(|m| m != record.id) {
                warn!(key = %index, id = record.id, "unique value already taken");
                return Err(CoreError::duplicate_key(index));
            }
            batch.require(Precondition::SetExclusive {
                key: index.clone(),
                member: record.id.to_string(),
            });
        }
        if !record.is_known_missing() {
            self.stage_unindex(record, field, batch)?;
        }
        batch.sadd(index, record.id);
        Ok(())
    }

    fn stage_range(
        &self,
        record: &Record<'_>,
        field: &dyn FieldSpec,
        value: &str,
        batch: &mut Batch,
    ) -> CoreResult<()> {
        let index = range_index_key(record.prefix, field.name());
        let score = field.score(value)?;
        if field.is_unique() {
            let holders = self
                .store
                .zrangebyscore(&index, ScoreRange::exact(score), 0, Some(2))?;
            if holders.iter().any(|m| m != record.id) {
                warn!(key = %index, score, id = record.id, "unique score already taken");
                return Err(CoreError::duplicate_key(index));
            }
            batch.require(Precondition::ScoreExclusive {
                key: index.clone(),
                score,
                member: record.id.to_string(),
            });
        }
        batch.zadd(index, record.id, score);
        Ok(())
    }

    /// Removes the entity from the index entry of its persisted value.
    fn stage_unindex(
        &self,
        record: &Record<'_>,
        field: &dyn FieldSpec,
        batch: &mut Batch,
    ) -> CoreResult<()> {
        match field.index_kind() {
            IndexKind::Exact => {
                let old = match record.data {
                    Some(data) => data.get(field.name()).cloned(),
                    None => self
                        .store
                        .hget(&self.key(record.prefix, record.id), field.name())?,
                };
                if let Some(old) = old {
                    batch.srem(exact_index_key(record.prefix, field.name(), &old), record.id);
                }
            }
            IndexKind::Range => {
                batch.zrem(range_index_key(record.prefix, field.name()), record.id);
            }
        }
        Ok(())
    }

    fn finish(&self, mut local: Batch, batch: Option<&mut Batch>) -> CoreResult<()> {
        match batch {
            Some(outer) => {
                outer.append(&mut local);
                Ok(())
            }
            None => self.execute(local),
        }
    }
}

impl<S: KeyValueStore + ?Sized> Connector for StoreConnector<S> {
    fn execute(&self, batch: Batch) -> CoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(operations = batch.len(), "executing batch");
        self.store.execute(batch).map_err(|err| match err {
            StoreError::PreconditionFailed { key } => CoreError::duplicate_key(key),
            other => other.into(),
        })
    }

    fn exists(&self, record: &Record<'_>) -> CoreResult<bool> {
        Ok(self.store.exists(&self.key(record.prefix, record.id))?)
    }

    fn get_field(&self, record: &Record<'_>, name: &str) -> CoreResult<Option<String>> {
        Ok(self.store.hget(&self.key(record.prefix, record.id), name)?)
    }

    fn get_all_fields(&self, record: &Record<'_>) -> CoreResult<HashMap<String, String>> {
        Ok(self.store.hgetall(&self.key(record.prefix, record.id))?)
    }

    fn save(&self, record: &Record<'_>, batch: Option<&mut Batch>) -> CoreResult<()> {
        let mut local = self.batch();
        self.stage_save(record, &mut local)?;
        debug!(
            prefix = record.prefix,
            id = record.id,
            commands = local.command_count(),
            "staged save"
        );
        self.finish(local, batch)
    }

    fn delete(&self, record: &Record<'_>, batch: Option<&mut Batch>) -> CoreResult<()> {
        let mut local = self.batch();
        for field in record.fields.iter().filter(|f| f.maintains_index()) {
            self.stage_unindex(record, field.as_ref(), &mut local)?;
        }
        local.del(self.key(record.prefix, record.id));
        debug!(prefix = record.prefix, id = record.id, "staged delete");
        self.finish(local, batch)
    }

    fn resolve_exact_index(&self, prefix: &str, field: &str, value: &str) -> CoreResult<Vec<String>> {
        Ok(self.store.smembers(&exact_index_key(prefix, field, value))?)
    }

    fn resolve_range_index(
        &self,
        prefix: &str,
        field: &str,
        range: ScoreRange,
        offset: usize,
        limit: Option<usize>,
    ) -> CoreResult<Vec<String>> {
        Ok(self
            .store
            .zrangebyscore(&range_index_key(prefix, field), range, offset, limit)?)
    }

    fn pick_random(
        &self,
        prefix: &str,
        field: &str,
        value: &str,
        count: usize,
    ) -> CoreResult<Option<Vec<String>>> {
        let ids = self
            .store
            .srandmember(&exact_index_key(prefix, field, value), count)?;
        Ok((!ids.is_empty()).then_some(ids))
    }
}
