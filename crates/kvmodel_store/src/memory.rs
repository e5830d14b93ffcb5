//! In-memory store for testing and embedded use.

use crate::backend::KeyValueStore;
use crate::batch::{Batch, Command, Operation, Precondition};
use crate::error::{StoreError, StoreResult};
use crate::score::ScoreRange;
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use tracing::{debug, trace};

/// A stored value.
#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    Sorted(SortedSet),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Self::Hash(h) => h.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::Sorted(z) => z.scores.is_empty(),
        }
    }
}

/// Totally ordered score.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Sorted set: member -> score plus a (score, member) ordering.
#[derive(Debug, Clone, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: String, score: f64) {
        if let Some(old) = self.scores.insert(member.clone(), score) {
            self.order.remove(&(Score(old), member.clone()));
        }
        self.order.insert((Score(score), member));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(Score(score), member.to_string()));
                true
            }
            None => false,
        }
    }

    fn range(&self, range: ScoreRange) -> impl Iterator<Item = (f64, &str)> + '_ {
        let start = match range.lower_score() {
            Some(v) => Bound::Included((Score(v), String::new())),
            None => Bound::Unbounded,
        };
        self.order
            .range((start, Bound::Unbounded))
            .skip_while(move |(score, _)| !range.above_min(score.0))
            .take_while(move |(score, _)| range.below_max(score.0))
            .map(|(score, member)| (score.0, member.as_str()))
    }
}

/// Inverse of one change made while a batch runs.
///
/// Replayed newest first when the batch fails.
#[derive(Debug)]
enum Undo {
    /// The key did not exist before.
    Remove(String),
    /// The key held this value before it was deleted.
    Restore(String, Value),
    /// Previous value of a hash field.
    HashField {
        key: String,
        field: String,
        old: Option<String>,
    },
    /// Previous membership of a set member.
    SetMember {
        key: String,
        member: String,
        present: bool,
    },
    /// Previous score of a sorted-set member.
    SortedMember {
        key: String,
        member: String,
        old: Option<f64>,
    },
}

/// An in-memory key-value store.
///
/// Suitable for:
/// - Unit and integration tests
/// - Single-process deployments that do not need persistence
///
/// # Thread Safety
///
/// All state sits behind one `RwLock`. [`KeyValueStore::execute`] holds the
/// write lock while it evaluates preconditions and applies commands, so a
/// batch is a single critical section: concurrent batches serialize, and a
/// batch whose check fails leaves no trace.
///
/// # Example
///
/// ```rust
/// use kvmodel_store::{Batch, InMemoryStore, KeyValueStore, ScoreRange};
///
/// let store = InMemoryStore::new();
/// let mut batch = Batch::new();
/// batch.zadd("user:age", "1", 30.0).zadd("user:age", "2", 17.0);
/// store.execute(batch).unwrap();
///
/// let adults = store.zrangebyscore("user:age", ScoreRange::at_least(18.0), 0, None).unwrap();
/// assert_eq!(adults, vec!["1".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<HashMap<String, Value>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all keys, sorted.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if no key is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    fn check(data: &HashMap<String, Value>, check: &Precondition) -> StoreResult<()> {
        let holds = match check {
            Precondition::SetExclusive { key, member } => match data.get(key) {
                None => true,
                Some(Value::Set(set)) => set.iter().all(|m| m == member),
                Some(_) => return Err(StoreError::wrong_type(key.as_str(), "set")),
            },
            Precondition::ScoreExclusive { key, score, member } => match data.get(key) {
                None => true,
                Some(Value::Sorted(z)) => z
                    .range(ScoreRange::exact(*score))
                    .all(|(_, m)| m == member.as_str()),
                Some(_) => return Err(StoreError::wrong_type(key.as_str(), "sorted set")),
            },
        };

        if holds {
            Ok(())
        } else {
            debug!(key = check.key(), "batch precondition failed");
            Err(StoreError::precondition_failed(check.key()))
        }
    }

    /// Applies `command` in place, journaling its inverse. Type errors are
    /// raised before anything changes.
    fn apply(
        data: &mut HashMap<String, Value>,
        undo: &mut Vec<Undo>,
        command: Command,
    ) -> StoreResult<()> {
        match command {
            Command::HSet { key, fields } => match data.get_mut(&key) {
                None => {
                    data.insert(key.clone(), Value::Hash(fields.into_iter().collect()));
                    undo.push(Undo::Remove(key));
                }
                Some(Value::Hash(hash)) => {
                    for (field, value) in fields {
                        let old = hash.insert(field.clone(), value);
                        undo.push(Undo::HashField {
                            key: key.clone(),
                            field,
                            old,
                        });
                    }
                }
                Some(_) => return Err(StoreError::wrong_type(key, "hash")),
            },
            Command::HDel { key, fields } => match data.get_mut(&key) {
                None => {}
                Some(Value::Hash(hash)) => {
                    for field in fields {
                        if let Some(old) = hash.remove(&field) {
                            undo.push(Undo::HashField {
                                key: key.clone(),
                                field,
                                old: Some(old),
                            });
                        }
                    }
                    Self::drop_if_empty(data, &key);
                }
                Some(_) => return Err(StoreError::wrong_type(key, "hash")),
            },
            Command::Del { key } => {
                if let Some(old) = data.remove(&key) {
                    undo.push(Undo::Restore(key, old));
                }
            }
            Command::SAdd { key, member } => match data.get_mut(&key) {
                None => {
                    data.insert(key.clone(), Value::Set(BTreeSet::from([member])));
                    undo.push(Undo::Remove(key));
                }
                Some(Value::Set(set)) => {
                    if set.insert(member.clone()) {
                        undo.push(Undo::SetMember {
                            key,
                            member,
                            present: false,
                        });
                    }
                }
                Some(_) => return Err(StoreError::wrong_type(key, "set")),
            },
            Command::SRem { key, member } => match data.get_mut(&key) {
                None => {}
                Some(Value::Set(set)) => {
                    if set.remove(&member) {
                        Self::drop_if_empty(data, &key);
                        undo.push(Undo::SetMember {
                            key,
                            member,
                            present: true,
                        });
                    }
                }
                Some(_) => return Err(StoreError::wrong_type(key, "set")),
            },
            Command::ZAdd { key, member, score } => {
                if score.is_nan() {
                    return Err(StoreError::InvalidScore { key, member });
                }
                match data.get_mut(&key) {
                    None => {
                        let mut z = SortedSet::default();
                        z.insert(member, score);
                        data.insert(key.clone(), Value::Sorted(z));
                        undo.push(Undo::Remove(key));
                    }
                    Some(Value::Sorted(z)) => {
                        let old = z.scores.get(&member).copied();
                        z.insert(member.clone(), score);
                        undo.push(Undo::SortedMember { key, member, old });
                    }
                    Some(_) => return Err(StoreError::wrong_type(key, "sorted set")),
                }
            }
            Command::ZRem { key, member } => match data.get_mut(&key) {
                None => {}
                Some(Value::Sorted(z)) => {
                    if let Some(old) = z.scores.get(&member).copied() {
                        z.remove(&member);
                        Self::drop_if_empty(data, &key);
                        undo.push(Undo::SortedMember {
                            key,
                            member,
                            old: Some(old),
                        });
                    }
                }
                Some(_) => return Err(StoreError::wrong_type(key, "sorted set")),
            },
        }
        Ok(())
    }

    fn drop_if_empty(data: &mut HashMap<String, Value>, key: &str) {
        if data.get(key).is_some_and(Value::is_empty) {
            data.remove(key);
        }
    }

    fn rollback(data: &mut HashMap<String, Value>, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Remove(key) => {
                    data.remove(&key);
                }
                Undo::Restore(key, value) => {
                    data.insert(key, value);
                }
                Undo::HashField { key, field, old } => {
                    if let Value::Hash(hash) = data
                        .entry(key.clone())
                        .or_insert_with(|| Value::Hash(HashMap::new()))
                    {
                        match old {
                            Some(old) => hash.insert(field, old),
                            None => hash.remove(&field),
                        };
                    }
                    Self::drop_if_empty(data, &key);
                }
                Undo::SetMember {
                    key,
                    member,
                    present,
                } => {
                    if let Value::Set(set) = data
                        .entry(key.clone())
                        .or_insert_with(|| Value::Set(BTreeSet::new()))
                    {
                        if present {
                            set.insert(member);
                        } else {
                            set.remove(&member);
                        }
                    }
                    Self::drop_if_empty(data, &key);
                }
                Undo::SortedMember { key, member, old } => {
                    if let Value::Sorted(z) = data
                        .entry(key.clone())
                        .or_insert_with(|| Value::Sorted(SortedSet::default()))
                    {
                        match old {
                            Some(score) => z.insert(member, score),
                            None => {
                                z.remove(&member);
                            }
                        }
                    }
                    Self::drop_if_empty(data, &key);
                }
            }
        }
    }

    fn run(
        data: &mut HashMap<String, Value>,
        undo: &mut Vec<Undo>,
        batch: Batch,
    ) -> StoreResult<()> {
        for op in batch.into_operations() {
            match op {
                Operation::Check(check) => Self::check(data, &check)?,
                Operation::Command(command) => Self::apply(data, undo, command)?,
            }
        }
        Ok(())
    }
}

impl KeyValueStore for InMemoryStore {
    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match self.data.read().get(key) {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(StoreError::wrong_type(key, "hash")),
        }
    }

    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        match self.data.read().get(key) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(StoreError::wrong_type(key, "hash")),
        }
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.data.read().get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(StoreError::wrong_type(key, "set")),
        }
    }

    fn srandmember(&self, key: &str, count: usize) -> StoreResult<Vec<String>> {
        match self.data.read().get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set
                .iter()
                .cloned()
                .choose_multiple(&mut rand::thread_rng(), count)),
            Some(_) => Err(StoreError::wrong_type(key, "set")),
        }
    }

    fn zrangebyscore(
        &self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>> {
        match self.data.read().get(key) {
            None => Ok(Vec::new()),
            Some(Value::Sorted(z)) => {
                let matches = z.range(range).skip(offset).map(|(_, m)| m.to_string());
                Ok(match limit {
                    Some(n) => matches.take(n).collect(),
                    None => matches.collect(),
                })
            }
            Some(_) => Err(StoreError::wrong_type(key, "sorted set")),
        }
    }

    fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        match self.data.read().get(key) {
            None => Ok(None),
            Some(Value::Sorted(z)) => Ok(z.scores.get(member).copied()),
            Some(_) => Err(StoreError::wrong_type(key, "sorted set")),
        }
    }

    fn execute(&self, batch: Batch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut data = self.data.write();
        let mut undo = Vec::new();
        trace!(ops = batch.len(), "executing batch");

        if let Err(err) = Self::run(&mut data, &mut undo, batch) {
            trace!(changes = undo.len(), "rolling back batch");
            Self::rollback(&mut data, undo);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(store: &InMemoryStore, f: impl FnOnce(&mut Batch)) -> StoreResult<()> {
        let mut batch = Batch::new();
        f(&mut batch);
        store.execute(batch)
    }

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert!(!store.exists("anything").unwrap());
    }

    #[test]
    fn memory_hash_set_and_get() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.hset("user:1", [("name".into(), "John".into()), ("age".into(), "26".into())]);
        })
        .unwrap();

        assert!(store.exists("user:1").unwrap());
        assert_eq!(store.hget("user:1", "name").unwrap().as_deref(), Some("John"));
        assert_eq!(store.hget("user:1", "missing").unwrap(), None);
        assert_eq!(store.hgetall("user:1").unwrap().len(), 2);
    }

    #[test]
    fn memory_hdel_last_field_removes_key() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.hset("h", [("a".into(), "1".into())]);
        })
        .unwrap();
        run(&store, |b| {
            b.hdel("h", ["a"]);
        })
        .unwrap();

        assert!(!store.exists("h").unwrap());
        assert!(store.hgetall("h").unwrap().is_empty());
    }

    #[test]
    fn memory_set_membership() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.sadd("s", "b").sadd("s", "a").sadd("s", "a");
        })
        .unwrap();
        assert_eq!(store.smembers("s").unwrap(), vec!["a", "b"]);

        run(&store, |b| {
            b.srem("s", "a").srem("s", "b");
        })
        .unwrap();
        assert!(!store.exists("s").unwrap());
    }

    #[test]
    fn memory_srandmember_is_bounded_and_distinct() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            for i in 0..5 {
                b.sadd("s", i.to_string());
            }
        })
        .unwrap();

        let picked = store.srandmember("s", 3).unwrap();
        assert_eq!(picked.len(), 3);
        let distinct: BTreeSet<_> = picked.iter().collect();
        assert_eq!(distinct.len(), 3);

        assert_eq!(store.srandmember("s", 10).unwrap().len(), 5);
        assert!(store.srandmember("missing", 1).unwrap().is_empty());
    }

    #[test]
    fn memory_zrangebyscore_with_offset_and_limit() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            for i in 1..=9 {
                b.zadd("z", format!("m{i}"), f64::from(i));
            }
        })
        .unwrap();

        let below = store.zrangebyscore("z", ScoreRange::below(7.0), 0, None).unwrap();
        assert_eq!(below.len(), 6);

        let page = store
            .zrangebyscore("z", ScoreRange::at_least(2.0), 1, Some(2))
            .unwrap();
        assert_eq!(page, vec!["m3", "m4"]);

        let above = store.zrangebyscore("z", ScoreRange::above(8.0), 0, None).unwrap();
        assert_eq!(above, vec!["m9"]);
    }

    #[test]
    fn memory_zadd_rescores_member() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.zadd("z", "a", 1.0).zadd("z", "a", 5.0);
        })
        .unwrap();

        assert_eq!(store.zscore("z", "a").unwrap(), Some(5.0));
        assert!(store.zrangebyscore("z", ScoreRange::exact(1.0), 0, None).unwrap().is_empty());
    }

    #[test]
    fn memory_zadd_nan_rejected() {
        let store = InMemoryStore::new();
        let result = run(&store, |b| {
            b.zadd("z", "a", f64::NAN);
        });
        assert!(matches!(result, Err(StoreError::InvalidScore { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn memory_wrong_type_fails() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.sadd("k", "1");
        })
        .unwrap();

        assert!(matches!(store.hget("k", "f"), Err(StoreError::WrongType { .. })));
        let result = run(&store, |b| {
            b.zadd("k", "1", 1.0);
        });
        assert!(matches!(result, Err(StoreError::WrongType { .. })));
    }

    #[test]
    fn memory_failed_precondition_applies_nothing() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.sadd("idx", "a");
        })
        .unwrap();

        let result = run(&store, |b| {
            b.hset("rec:b", [("f".into(), "v".into())]);
            b.require(Precondition::SetExclusive {
                key: "idx".into(),
                member: "b".into(),
            });
            b.sadd("idx", "b");
        });

        assert!(matches!(result, Err(StoreError::PreconditionFailed { .. })));
        assert!(!store.exists("rec:b").unwrap());
        assert_eq!(store.smembers("idx").unwrap(), vec!["a"]);
    }

    #[test]
    fn memory_failed_batch_rolls_back_in_place_changes() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.hset("h", [("a".into(), "1".into()), ("b".into(), "2".into())]);
            b.hset("d", [("f".into(), "v".into())]);
            b.sadd("s", "x");
            b.zadd("z", "m", 1.0);
        })
        .unwrap();

        let result = run(&store, |b| {
            b.hset("h", [("a".into(), "9".into()), ("c".into(), "3".into())]);
            b.hdel("h", ["b"]);
            b.del("d");
            b.sadd("s", "y");
            b.srem("s", "x");
            b.zadd("z", "m", 5.0).zadd("z", "n", 2.0).zrem("z", "m");
            b.sadd("fresh", "q");
            b.require(Precondition::SetExclusive {
                key: "s".into(),
                member: "x".into(),
            });
        });

        assert!(matches!(result, Err(StoreError::PreconditionFailed { .. })));
        let h = store.hgetall("h").unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h["a"], "1");
        assert_eq!(h["b"], "2");
        assert_eq!(store.hget("d", "f").unwrap().as_deref(), Some("v"));
        assert_eq!(store.smembers("s").unwrap(), vec!["x"]);
        assert_eq!(store.zscore("z", "m").unwrap(), Some(1.0));
        assert_eq!(store.zscore("z", "n").unwrap(), None);
        assert!(!store.exists("fresh").unwrap());
        assert_eq!(store.keys(), vec!["d", "h", "s", "z"]);
    }

    #[test]
    fn memory_type_error_mid_batch_rolls_back() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.sadd("s", "w").sadd("s", "x");
        })
        .unwrap();

        let result = run(&store, |b| {
            b.hset("h", [("a".into(), "1".into())]);
            b.srem("s", "x");
            b.hset("s", [("a".into(), "1".into())]);
        });

        assert!(matches!(result, Err(StoreError::WrongType { .. })));
        assert!(!store.exists("h").unwrap());
        assert_eq!(store.smembers("s").unwrap(), vec!["w", "x"]);
    }

    #[test]
    fn memory_precondition_sees_earlier_writes_in_batch() {
        let store = InMemoryStore::new();

        let result = run(&store, |b| {
            b.require(Precondition::SetExclusive {
                key: "idx".into(),
                member: "a".into(),
            });
            b.sadd("idx", "a");
            b.require(Precondition::SetExclusive {
                key: "idx".into(),
                member: "b".into(),
            });
            b.sadd("idx", "b");
        });

        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn memory_score_exclusive_allows_own_member() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.zadd("z", "a", 3.0);
        })
        .unwrap();

        let own = run(&store, |b| {
            b.require(Precondition::ScoreExclusive {
                key: "z".into(),
                score: 3.0,
                member: "a".into(),
            });
        });
        assert!(own.is_ok());

        let other = run(&store, |b| {
            b.require(Precondition::ScoreExclusive {
                key: "z".into(),
                score: 3.0,
                member: "b".into(),
            });
            b.zadd("z", "b", 3.0);
        });
        assert!(other.is_err());
        assert_eq!(store.zscore("z", "b").unwrap(), None);
    }

    #[test]
    fn memory_del_then_recreate_in_one_batch() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.hset("h", [("a".into(), "1".into())]);
        })
        .unwrap();
        run(&store, |b| {
            b.del("h");
            b.hset("h", [("b".into(), "2".into())]);
        })
        .unwrap();

        let all = store.hgetall("h").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn memory_keys_and_clear() {
        let store = InMemoryStore::new();
        run(&store, |b| {
            b.sadd("b", "1").hset("a", [("f".into(), "v".into())]);
        })
        .unwrap();
        assert_eq!(store.keys(), vec!["a", "b"]);
        assert_eq!(store.len(), 2);

        store.clear();
        assert!(store.is_empty());
    }
}
