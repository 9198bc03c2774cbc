//! Memory subsystem: retention, lazy expiry, eviction and observers on top
//! of property storage.

pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod retention;
pub mod view;

pub use config::{MemoryConfig, MemoryName};
pub use error::{MemoryError, MemoryResult};
pub use events::{MemoryEvent, MemoryListener};
pub use facade::{Memory, OverwriteMemory};
pub use retention::Retention;
pub use view::MemoryCapacityView;
