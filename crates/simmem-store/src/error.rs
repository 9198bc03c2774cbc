//! Error types for simmem-store

use thiserror::Error;

use crate::property::{Step, ValueKind};

/// Errors that can occur in the storage layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// A property was stored with a step before the start of the simulation
    #[error("Invalid timestamp {timestamp} for property '{key}': steps must be non-negative")]
    InvalidTimestamp { key: String, timestamp: Step },

    /// A fetch/recall did not find a matching property
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    /// A remove/forget did not find a matching property
    #[error(transparent)]
    Remove(#[from] RemoveError),
}

/// Lookup failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrieveError {
    #[error("No property stored under key '{key}'")]
    Missing { key: String },

    #[error("No property stored under key '{key}' at step {step}")]
    MissingAt { key: String, step: Step },

    #[error("Property '{key}' holds a {actual} value, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        actual: ValueKind,
    },
}

/// Removal failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoveError {
    #[error("Cannot remove '{key}': no property stored under that key")]
    MissingKey { key: String },

    #[error("Cannot remove '{key}' at step {step}: no property stored at that step")]
    MissingAt { key: String, step: Step },

    /// Another instance may live at the same (key, step); only the exact
    /// instance is removable by identity.
    #[error("Cannot remove '{key}' at step {step}: that instance is not stored")]
    MissingInstance { key: String, step: Step },
}

impl StorageError {
    /// True for any lookup failure.
    pub fn is_retrieve(&self) -> bool {
        matches!(self, StorageError::Retrieve(_))
    }

    /// True for any removal failure.
    pub fn is_remove(&self) -> bool {
        matches!(self, StorageError::Remove(_))
    }
}
