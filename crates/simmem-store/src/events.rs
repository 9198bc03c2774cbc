//! Lifecycle events and the per-container observer registry.
//!
//! Listeners are registered per event kind and notified synchronously,
//! strictly after the mutation they describe has succeeded. Registries are
//! scoped to a single container; there is no global listener list.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::property::Property;

/// Storage-level lifecycle events.
///
/// A write that replaces an existing version fires `Overwritten` (or
/// `Restored`) with the *replaced* property, followed by `Stored` with the
/// new one. A fresh insert fires `Stored` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageEvent {
    Stored,
    Fetched,
    Removed,
    /// Evicted by the capacity manager.
    AutoRemoved,
    /// Replaced by a write with an equal or later timestamp.
    Overwritten,
    /// Replaced by a write with an earlier timestamp (one-version storage).
    Restored,
    /// Incoming property dropped because no slot could be freed.
    Rejected,
}

impl StorageEvent {
    pub const ALL: [StorageEvent; 7] = [
        StorageEvent::Stored,
        StorageEvent::Fetched,
        StorageEvent::Removed,
        StorageEvent::AutoRemoved,
        StorageEvent::Overwritten,
        StorageEvent::Restored,
        StorageEvent::Rejected,
    ];
}

impl std::fmt::Display for StorageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored => write!(f, "stored"),
            Self::Fetched => write!(f, "fetched"),
            Self::Removed => write!(f, "removed"),
            Self::AutoRemoved => write!(f, "auto_removed"),
            Self::Overwritten => write!(f, "overwritten"),
            Self::Restored => write!(f, "restored"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Callback for storage events.
pub trait StorageListener: Send + Sync {
    fn on_event(&self, event: StorageEvent, property: &Property);
}

impl<F> StorageListener for F
where
    F: Fn(StorageEvent, &Property) + Send + Sync,
{
    fn on_event(&self, event: StorageEvent, property: &Property) {
        self(event, property)
    }
}

/// Multimap from event kind to a set of listeners.
///
/// Listener identity is the `Arc` allocation: registering the same `Arc`
/// twice for one event is a no-op, and removal takes the same `Arc`.
pub struct Observers<E, L: ?Sized> {
    listeners: HashMap<E, Vec<Arc<L>>>,
}

impl<E, L> Observers<E, L>
where
    E: Copy + Eq + Hash,
    L: ?Sized,
{
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    /// Register `listener` for `event`. Returns `false` if it was already
    /// registered.
    pub fn add(&mut self, event: E, listener: Arc<L>) -> bool {
        let slot = self.listeners.entry(event).or_default();
        if slot.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        slot.push(listener);
        true
    }

    /// Unregister `listener` from `event`. Returns `false` if it was not
    /// registered.
    pub fn remove(&mut self, event: E, listener: &Arc<L>) -> bool {
        let Some(slot) = self.listeners.get_mut(&event) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|l| !same_listener(l, listener));
        let removed = slot.len() != before;
        if slot.is_empty() {
            self.listeners.remove(&event);
        }
        removed
    }

    /// Listeners registered for `event`, in registration order.
    pub fn listeners(&self, event: E) -> &[Arc<L>] {
        self.listeners.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Total registrations across all events.
    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }
}

impl<E, L> Default for Observers<E, L>
where
    E: Copy + Eq + Hash,
    L: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
