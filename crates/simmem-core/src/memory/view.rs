//! Capacity view over a whole memory.

use simmem_store::{Capacity, CapacityView, Property, VersionPolicy, ViewEntry};
use tracing::debug;

use super::facade::Memory;

/// [`CapacityView`] handed to callers that shrink a memory from outside.
///
/// Unlike the storage's internal eviction view, removals here go through the
/// memory: retention bookkeeping is dropped and `Forgotten` fires.
pub struct MemoryCapacityView<'a, P: VersionPolicy> {
    memory: &'a mut Memory<P>,
    removed: usize,
}

impl<'a, P: VersionPolicy> MemoryCapacityView<'a, P> {
    pub(super) fn new(memory: &'a mut Memory<P>) -> Self {
        Self { memory, removed: 0 }
    }

    /// Entries removed through this view so far.
    pub fn removed(&self) -> usize {
        self.removed
    }
}

impl<P: VersionPolicy> CapacityView for MemoryCapacityView<'_, P> {
    fn size(&self) -> usize {
        self.memory.storage().len()
    }

    fn capacity(&self) -> Capacity {
        self.memory.storage().capacity()
    }

    fn entries(&self) -> Vec<ViewEntry> {
        self.memory.storage().view_entries()
    }

    fn remove(&mut self, property: &Property) -> bool {
        match self.memory.forget_instance(property) {
            Ok(_) => {
                self.removed += 1;
                true
            }
            Err(e) => {
                debug!(
                    memory = %self.memory.name(),
                    key = property.key(),
                    error = %e,
                    "capacity view removal failed"
                );
                false
            }
        }
    }
}
