//! Property-based test generators using proptest.
//!
//! Provides strategies for ids, field values and sequences of entity
//! operations.

use proptest::prelude::*;

/// Strategy for generating entity ids.
pub fn model_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating valid emails, possibly mixed case.
pub fn email_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_-]{0,10}@[a-z0-9][a-z0-9-]{0,8}\\.(com|org|net|io)")
        .expect("Invalid regex")
}

/// Strategy for generating short display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z ]{0,15}").expect("Invalid regex")
}

/// Strategy for ages within the fixture bounds.
pub fn age_strategy() -> impl Strategy<Value = i64> {
    0i64..=150
}

/// One step applied to an entity of the fixture model.
#[derive(Debug, Clone)]
pub enum EntityOperation {
    /// Assign the name.
    SetName {
        /// Entity id.
        id: String,
        /// New name.
        name: String,
    },
    /// Assign the age.
    SetAge {
        /// Entity id.
        id: String,
        /// New age.
        age: i64,
    },
    /// Remove the name.
    RemoveName {
        /// Entity id.
        id: String,
    },
    /// Persist local changes.
    Save {
        /// Entity id.
        id: String,
    },
    /// Delete the entity.
    Delete {
        /// Entity id.
        id: String,
    },
    /// Discard local changes.
    Revert {
        /// Entity id.
        id: String,
    },
}

impl EntityOperation {
    /// The id this operation targets.
    pub fn id(&self) -> &str {
        match self {
            Self::SetName { id, .. }
            | Self::SetAge { id, .. }
            | Self::RemoveName { id }
            | Self::Save { id }
            | Self::Delete { id }
            | Self::Revert { id } => id,
        }
    }
}

/// Strategy for generating entity operations over a small id pool.
pub fn entity_operation_strategy() -> impl Strategy<Value = EntityOperation> {
    let id = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(String::from);
    prop_oneof![
        3 => (id.clone(), name_strategy()).prop_map(|(id, name)| EntityOperation::SetName { id, name }),
        3 => (id.clone(), age_strategy()).prop_map(|(id, age)| EntityOperation::SetAge { id, age }),
        1 => id.clone().prop_map(|id| EntityOperation::RemoveName { id }),
        3 => id.clone().prop_map(|id| EntityOperation::Save { id }),
        1 => id.clone().prop_map(|id| EntityOperation::Delete { id }),
        1 => id.prop_map(|id| EntityOperation::Revert { id }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    max_len: usize,
) -> impl Strategy<Value = Vec<EntityOperation>> {
    prop::collection::vec(entity_operation_strategy(), 1..max_len)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
