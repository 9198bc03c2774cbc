//! Structured observability hooks for memory lifecycle events.
//!
//! This module provides:
//! - Memory-scoped tracing spans via `MemorySpan` RAII guard
//! - Emission functions for memorize, expiry, eviction, rejection and
//!   capacity changes
//!
//! Events are emitted at `debug!`/`info!` level; filter with `RUST_LOG`.

use simmem_store::{Capacity, Property, Step};
use tracing::{debug, info};

/// RAII guard that enters a memory-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = MemorySpan::enter("forager-7");
/// // tracing calls below carry memory = "forager-7"
/// ```
pub struct MemorySpan {
    _span: tracing::span::EnteredSpan,
}

impl MemorySpan {
    pub fn enter(memory: &str) -> Self {
        let span = tracing::info_span!("simmem.memory", memory = %memory);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: property memorized, with its time of death if limited.
pub fn emit_memorized(memory: &str, property: &Property, time_of_death: Option<Step>) {
    debug!(
        event = "memory.memorized",
        memory = %memory,
        key = property.key(),
        step = property.timestamp(),
        time_of_death = ?time_of_death,
    );
}

/// Emit event: property forgotten because its retention ran out.
pub fn emit_expired(memory: &str, property: &Property, now: Step) {
    debug!(
        event = "memory.expired",
        memory = %memory,
        key = property.key(),
        step = property.timestamp(),
        now = now,
    );
}

/// Emit event: property evicted by the capacity manager.
pub fn emit_evicted(memory: &str, property: &Property, policy: &str) {
    debug!(
        event = "memory.evicted",
        memory = %memory,
        key = property.key(),
        step = property.timestamp(),
        policy = policy,
    );
}

/// Emit event: incoming property dropped by a full memory.
pub fn emit_rejected(memory: &str, property: &Property, policy: &str) {
    info!(
        event = "memory.rejected",
        memory = %memory,
        key = property.key(),
        step = property.timestamp(),
        policy = policy,
    );
}

/// Emit event: capacity changed.
pub fn emit_capacity_changed(memory: &str, from: Capacity, to: Capacity, evicted: usize) {
    info!(
        event = "memory.capacity_changed",
        memory = %memory,
        from = %from,
        to = %to,
        evicted = evicted,
    );
}

/// Emit event: an expired property could not be forgotten (warning level).
pub fn emit_sweep_error(memory: &str, property: &Property, error: &dyn std::fmt::Display) {
    tracing::warn!(
        event = "memory.sweep_error",
        memory = %memory,
        key = property.key(),
        step = property.timestamp(),
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_span_create() {
        let _span = MemorySpan::enter("test-memory");
    }
}
