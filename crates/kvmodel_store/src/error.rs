//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key holds a value of another kind (hash, set or sorted set).
    #[error("wrong type for key {key}: expected {expected}")]
    WrongType {
        /// The offending key.
        key: String,
        /// The kind the operation expected.
        expected: &'static str,
    },

    /// A batch precondition did not hold; nothing in the batch was applied.
    #[error("precondition failed on {key}")]
    PreconditionFailed {
        /// Key the failed precondition was attached to.
        key: String,
    },

    /// A sorted-set score was not a number.
    #[error("invalid score for member {member} of {key}")]
    InvalidScore {
        /// The sorted-set key.
        key: String,
        /// The member being scored.
        member: String,
    },

    /// The store is no longer reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a wrong type error.
    pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            key: key.into(),
            expected,
        }
    }

    /// Creates a precondition failure.
    pub fn precondition_failed(key: impl Into<String>) -> Self {
        Self::PreconditionFailed { key: key.into() }
    }
}
