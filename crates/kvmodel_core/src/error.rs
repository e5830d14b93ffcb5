//! Error types for KVModel core.

use kvmodel_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in KVModel core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A field rejected a value on conversion to its stored form.
    #[error("validation failed for field {field}: {message}")]
    Validation {
        /// Field name.
        field: String,
        /// What was wrong with the value.
        message: String,
    },

    /// A field has no value locally nor in the loaded record.
    #[error("key not found: {name}")]
    KeyNotFound {
        /// Field name.
        name: String,
    },

    /// `create` found an existing record for the id.
    #[error("{model}({id}) already exists")]
    AlreadyExists {
        /// Model name.
        model: String,
        /// Entity id.
        id: String,
    },

    /// A record required to exist was not found.
    #[error("{model}({id}) not found")]
    NotFound {
        /// Model name.
        model: String,
        /// Entity id.
        id: String,
    },

    /// A unique index already holds the value for another entity.
    #[error("duplicate key error on {key}")]
    DuplicateKey {
        /// Index key that rejected the write.
        key: String,
    },

    /// The comparison operator cannot be served by the field's index kind.
    #[error("unsupported operator {operator} for field {field}")]
    UnsupportedOperator {
        /// Field name.
        field: String,
        /// Operator symbol.
        operator: String,
    },

    /// Stored data could not be converted back to a native value.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A field was declared with inconsistent options.
    #[error("invalid field {field}: {message}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a key not found error.
    pub fn key_not_found(name: impl Into<String>) -> Self {
        Self::KeyNotFound { name: name.into() }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::DuplicateKey`].
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
