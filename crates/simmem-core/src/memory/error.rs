//! Error types for the memory subsystem.

use simmem_store::{Step, StorageError};

/// Errors produced by memory operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MemoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The operation exists on the versioned memory only.
    #[error("{operation} is not implemented for {variant} memory")]
    NotImplemented {
        operation: &'static str,
        variant: &'static str,
    },

    /// The refreshed instance was dropped by the capacity manager; the
    /// original instance is still stored.
    #[error("refresh of '{key}' at step {step} rejected: memory is full")]
    RefreshRejected { key: String, step: Step },

    #[error("invalid memory config: {0}")]
    InvalidConfig(String),
}

impl MemoryError {
    pub fn is_retrieve(&self) -> bool {
        matches!(self, MemoryError::Storage(e) if e.is_retrieve())
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, MemoryError::Storage(e) if e.is_remove())
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, MemoryError::NotImplemented { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, MemoryError::RefreshRejected { .. })
    }
}

/// Result type for memory operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
