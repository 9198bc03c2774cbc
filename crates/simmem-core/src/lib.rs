//! Simmem-Core: Agent Memory
//!
//! Bounded, time-versioned memory for boundedly-rational agents. A
//! [`Memory`] stores step-stamped properties, expires them once their
//! retention runs out as the simulation clock advances, keeps itself within
//! capacity through a pluggable eviction policy, and reports its lifecycle to
//! registered listeners.
//!
//! ## Layer 1 - Memory
//!
//! Focus: retention bookkeeping, lazy expiry, and lifecycle events.

pub mod clock;
pub mod memory;
pub mod obs;
pub mod stats;
pub mod telemetry;

pub use clock::{ManualClock, StepClock};
pub use memory::{
    Memory, MemoryCapacityView, MemoryConfig, MemoryError, MemoryEvent, MemoryListener,
    MemoryName, MemoryResult, OverwriteMemory, Retention,
};
pub use obs::{
    emit_capacity_changed, emit_evicted, emit_expired, emit_memorized, emit_rejected,
    emit_sweep_error, MemorySpan,
};
pub use stats::{MemoryStats, StatsSnapshot};
pub use telemetry::init_tracing;

pub use simmem_store::{
    Admission, Capacity, CapacityManager, CapacityView, Fifo, Filo, Nino, PolicyKind, Property,
    PropertyId, Step, StoreOutcome, Value, ValueKind,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
