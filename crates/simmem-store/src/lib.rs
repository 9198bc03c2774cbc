//! Simmem-Store: Property Storage for Simulated Agents
//!
//! This crate provides the storage layer underneath agent memory. It indexes
//! immutable, step-stamped properties by key and by (key, step), filters them
//! by declared value kind, and keeps the container within a configurable
//! capacity through pluggable eviction policies.
//!
//! ## Layer 0 - Data
//!
//! Focus: index consistency, capacity enforcement, and eviction.
//!
//! ## Key Components
//!
//! - `Property`: Immutable keyed, timestamped value record
//! - `Storage`: Indexed container, generic over a `VersionPolicy`
//! - `CapacityManager`: Eviction strategy (`Fifo`, `Filo`, `Nino`)
//! - `CapacityView`: The narrow view a `CapacityManager` works through

pub mod capacity;
mod error;
pub mod events;
pub mod property;
pub mod storage;

pub use capacity::{
    Capacity, CapacityManager, CapacityView, Fifo, Filo, Nino, PolicyKind, ViewEntry,
};
pub use error::{RemoveError, RetrieveError, StorageError};
pub use events::{Observers, StorageEvent, StorageListener};
pub use property::{Property, PropertyId, Step, Value, ValueKind};
pub use storage::{
    Admission, Overwrite, OverwriteStorage, Storage, StoreOutcome, VersionPolicy, Versioned,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;
