//! Memory lifecycle events and listeners.

use serde::{Deserialize, Serialize};
use simmem_store::{Property, StorageEvent};

/// Events a [`Memory`](super::Memory) broadcasts to its observers.
///
/// The first group is fired by every memory. The second group relays
/// storage-level events one to one and is only fired by
/// [`OverwriteMemory`](super::OverwriteMemory), where observers need to
/// tell an overwrite from a fresh insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryEvent {
    Memorized,
    /// Explicitly forgotten or expired.
    Forgotten,
    Recalled,
    /// The old instance replaced by a refresh.
    RefreshedPropertyForgotten,
    /// The new instance stored by a refresh.
    RefreshedPropertyMemorized,
    /// Removed by the capacity manager to make room.
    Evicted,
    /// Dropped on memorize because no slot could be freed.
    Rejected,

    Stored,
    Fetched,
    Removed,
    AutoRemoved,
    Overwritten,
    Restored,
}

impl MemoryEvent {
    pub const ALL: [MemoryEvent; 13] = [
        MemoryEvent::Memorized,
        MemoryEvent::Forgotten,
        MemoryEvent::Recalled,
        MemoryEvent::RefreshedPropertyForgotten,
        MemoryEvent::RefreshedPropertyMemorized,
        MemoryEvent::Evicted,
        MemoryEvent::Rejected,
        MemoryEvent::Stored,
        MemoryEvent::Fetched,
        MemoryEvent::Removed,
        MemoryEvent::AutoRemoved,
        MemoryEvent::Overwritten,
        MemoryEvent::Restored,
    ];

    /// The relayed counterpart of a storage event, if it has one.
    pub fn relayed(event: StorageEvent) -> Option<MemoryEvent> {
        match event {
            StorageEvent::Stored => Some(MemoryEvent::Stored),
            StorageEvent::Fetched => Some(MemoryEvent::Fetched),
            StorageEvent::Removed => Some(MemoryEvent::Removed),
            StorageEvent::AutoRemoved => Some(MemoryEvent::AutoRemoved),
            StorageEvent::Overwritten => Some(MemoryEvent::Overwritten),
            StorageEvent::Restored => Some(MemoryEvent::Restored),
            // Surfaced as `MemoryEvent::Rejected` by every memory.
            StorageEvent::Rejected => None,
        }
    }
}

impl std::fmt::Display for MemoryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Memorized => "memorized",
            Self::Forgotten => "forgotten",
            Self::Recalled => "recalled",
            Self::RefreshedPropertyForgotten => "refreshed_property_forgotten",
            Self::RefreshedPropertyMemorized => "refreshed_property_memorized",
            Self::Evicted => "evicted",
            Self::Rejected => "rejected",
            Self::Stored => "stored",
            Self::Fetched => "fetched",
            Self::Removed => "removed",
            Self::AutoRemoved => "auto_removed",
            Self::Overwritten => "overwritten",
            Self::Restored => "restored",
        };
        write!(f, "{name}")
    }
}

/// Callback for memory events.
pub trait MemoryListener: Send + Sync {
    fn on_event(&self, event: MemoryEvent, property: &Property);
}

impl<F> MemoryListener for F
where
    F: Fn(MemoryEvent, &Property) + Send + Sync,
{
    fn on_event(&self, event: MemoryEvent, property: &Property) {
        self(event, property)
    }
}
