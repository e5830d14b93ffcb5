//! Atomic command batches.

/// A single write command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set hash fields (`HSET key f1 v1 ...`).
    HSet {
        /// Hash key.
        key: String,
        /// Field/value pairs.
        fields: Vec<(String, String)>,
    },
    /// Remove hash fields (`HDEL key f1 ...`).
    HDel {
        /// Hash key.
        key: String,
        /// Field names.
        fields: Vec<String>,
    },
    /// Remove a key of any kind (`DEL key`).
    Del {
        /// Key to remove.
        key: String,
    },
    /// Add a set member (`SADD key member`).
    SAdd {
        /// Set key.
        key: String,
        /// Member to add.
        member: String,
    },
    /// Remove a set member (`SREM key member`).
    SRem {
        /// Set key.
        key: String,
        /// Member to remove.
        member: String,
    },
    /// Insert or rescore a sorted-set member (`ZADD key score member`).
    ZAdd {
        /// Sorted-set key.
        key: String,
        /// Member to upsert.
        member: String,
        /// Its score.
        score: f64,
    },
    /// Remove a sorted-set member (`ZREM key member`).
    ZRem {
        /// Sorted-set key.
        key: String,
        /// Member to remove.
        member: String,
    },
}

impl Command {
    /// Returns the key the command writes to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::HSet { key, .. }
            | Self::HDel { key, .. }
            | Self::Del { key }
            | Self::SAdd { key, .. }
            | Self::SRem { key, .. }
            | Self::ZAdd { key, .. }
            | Self::ZRem { key, .. } => key,
        }
    }
}

/// A condition checked inside the batch's critical section.
///
/// Preconditions are evaluated in batch order against the store state as
/// modified by the commands queued before them, so a batch always reads its
/// own writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The set at `key` holds no member other than `member`.
    SetExclusive {
        /// Set key.
        key: String,
        /// The only member allowed to be present.
        member: String,
    },
    /// The sorted set at `key` holds no member other than `member` scored
    /// exactly `score`.
    ScoreExclusive {
        /// Sorted-set key.
        key: String,
        /// Score that must be free.
        score: f64,
        /// The only member allowed to hold it.
        member: String,
    },
}

impl Precondition {
    /// Returns the key the precondition inspects.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::SetExclusive { key, .. } | Self::ScoreExclusive { key, .. } => key,
        }
    }
}

/// One step of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// A write.
    Command(Command),
    /// A check; failing it discards the whole batch.
    Check(Precondition),
}

/// An ordered sequence of writes and checks applied as one unit.
///
/// Nothing is sent to the store until [`crate::KeyValueStore::execute`] is
/// called. Either every command applies or none does.
///
/// # Example
///
/// ```rust
/// use kvmodel_store::{Batch, Precondition};
///
/// let mut batch = Batch::new();
/// batch.require(Precondition::SetExclusive {
///     key: "user:email:a@b.cd".into(),
///     member: "1".into(),
/// });
/// batch.sadd("user:email:a@b.cd", "1");
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.command_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<Operation>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `HSET`. Empty field lists are ignored.
    pub fn hset<I>(&mut self, key: impl Into<String>, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let fields: Vec<_> = fields.into_iter().collect();
        if !fields.is_empty() {
            self.push(Command::HSet {
                key: key.into(),
                fields,
            });
        }
        self
    }

    /// Queues `HDEL`. Empty field lists are ignored.
    pub fn hdel<I, S>(&mut self, key: impl Into<String>, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if !fields.is_empty() {
            self.push(Command::HDel {
                key: key.into(),
                fields,
            });
        }
        self
    }

    /// Queues `DEL`.
    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Del { key: key.into() })
    }

    /// Queues `SADD`.
    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Queues `SREM`.
    pub fn srem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SRem {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Queues `ZADD`.
    pub fn zadd(&mut self, key: impl Into<String>, member: impl Into<String>, score: f64) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        })
    }

    /// Queues `ZREM`.
    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::ZRem {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Queues a precondition.
    pub fn require(&mut self, check: Precondition) -> &mut Self {
        self.ops.push(Operation::Check(check));
        self
    }

    /// Queues an arbitrary command.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.ops.push(Operation::Command(command));
        self
    }

    /// Moves every operation of `other` to the end of this batch.
    pub fn append(&mut self, other: &mut Batch) {
        self.ops.append(&mut other.ops);
    }

    /// Returns all queued operations in order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Returns the queued commands, skipping checks.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.ops.iter().filter_map(|op| match op {
            Operation::Command(c) => Some(c),
            Operation::Check(_) => None,
        })
    }

    /// Number of queued operations (commands and checks).
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Number of queued commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands().count()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes the batch, yielding its operations.
    #[must_use]
    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_lists_are_skipped() {
        let mut batch = Batch::new();
        batch.hset("h", Vec::new());
        batch.hdel("h", Vec::<String>::new());
        assert!(batch.is_empty());
    }

    #[test]
    fn operations_keep_order() {
        let mut batch = Batch::new();
        batch.srem("s:old", "1").sadd("s:new", "1").zadd("z", "1", 3.0);

        let keys: Vec<&str> = batch.commands().map(Command::key).collect();
        assert_eq!(keys, vec!["s:old", "s:new", "z"]);
    }

    #[test]
    fn append_moves_operations() {
        let mut a = Batch::new();
        a.del("k1");
        let mut b = Batch::new();
        b.del("k2");
        b.require(Precondition::SetExclusive {
            key: "s".into(),
            member: "1".into(),
        });

        a.append(&mut b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.command_count(), 2);
        assert!(b.is_empty());
    }
}
