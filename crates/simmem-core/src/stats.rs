//! Per-memory lifecycle counters.
//!
//! Counters are incremented silently at the call site. Call
//! [`MemoryStats::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a simulation).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::memory::MemoryName;

/// Lightweight atomic counters owned by one memory.
#[derive(Debug, Default)]
pub struct MemoryStats {
    memorized: AtomicU64,
    forgotten: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    recalled: AtomicU64,
    refreshed: AtomicU64,
}

/// Point-in-time copy of [`MemoryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub memorized: u64,
    pub forgotten: u64,
    pub expired: u64,
    pub evicted: u64,
    pub rejected: u64,
    pub recalled: u64,
    pub refreshed: u64,
}

macro_rules! counter {
    ($inc:ident, $get:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(metric = stringify!($field), "counter incremented");
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl MemoryStats {
    pub const fn new() -> Self {
        Self {
            memorized: AtomicU64::new(0),
            forgotten: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            recalled: AtomicU64::new(0),
            refreshed: AtomicU64::new(0),
        }
    }

    counter!(inc_memorized, memorized, memorized);
    counter!(inc_forgotten, forgotten, forgotten);
    counter!(inc_expired, expired, expired);
    counter!(inc_evicted, evicted, evicted);
    counter!(inc_rejected, rejected, rejected);
    counter!(inc_recalled, recalled, recalled);
    counter!(inc_refreshed, refreshed, refreshed);

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            memorized: self.memorized(),
            forgotten: self.forgotten(),
            expired: self.expired(),
            evicted: self.evicted(),
            rejected: self.rejected(),
            recalled: self.recalled(),
            refreshed: self.refreshed(),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self, name: &MemoryName) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            memory = %name,
            memorized = s.memorized,
            forgotten = s.forgotten,
            expired = s.expired,
            evicted = s.evicted,
            rejected = s.rejected,
            recalled = s.recalled,
            refreshed = s.refreshed,
        );
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.memorized,
            &self.forgotten,
            &self.expired,
            &self.evicted,
            &self.rejected,
            &self.recalled,
            &self.refreshed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
