//! Indexed, capacity-bounded property container.
//!
//! Properties are indexed by key and by (key, step). The latest version of a
//! key is the one with the greatest step. Every entry also carries an
//! insertion order, which is what eviction policies see.
//!
//! Whether a key keeps its history is decided at the type level by a
//! [`VersionPolicy`]: [`Versioned`] keeps one entry per (key, step),
//! [`Overwrite`] keeps one entry per key. Capacity handling, eviction and
//! observers are shared by both.
//!
//! ## Silent drop
//!
//! When the container is full and the [`CapacityManager`] cannot free a slot
//! (for example [`Nino`](crate::capacity::Nino) always declines), the
//! incoming property is dropped. This is **not** an error: `store` returns
//! `Ok` with [`Admission::Rejected`] and fires [`StorageEvent::Rejected`].
//! Callers that need insertion to succeed must check the outcome.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::capacity::{Capacity, CapacityManager, CapacityView, Fifo, PolicyKind, ViewEntry};
use crate::error::{RemoveError, RetrieveError, StorageError};
use crate::events::{Observers, StorageEvent, StorageListener};
use crate::property::{Property, Step, ValueKind};
use crate::StorageResult;

/// How many versions of a key a container keeps.
pub trait VersionPolicy: Send + Sync + 'static {
    /// `true`: one entry per (key, step). `false`: one entry per key.
    const KEEPS_HISTORY: bool;

    const NAME: &'static str;
}

/// Keeps every step-stamped version of a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Versioned;

impl VersionPolicy for Versioned {
    const KEEPS_HISTORY: bool = true;
    const NAME: &'static str = "versioned";
}

/// Keeps only the most recently written version of a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overwrite;

impl VersionPolicy for Overwrite {
    const KEEPS_HISTORY: bool = false;
    const NAME: &'static str = "overwrite";
}

/// One-version-per-key storage.
pub type OverwriteStorage = Storage<Overwrite>;

/// What happened to the property handed to `store`.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Stored in a new slot.
    Inserted,
    /// Stored, replacing this property (same or earlier timestamp).
    Overwritten(Property),
    /// Stored, replacing this property, which had a later timestamp.
    Restored(Property),
    /// Dropped: the container was full and no slot could be freed. The
    /// incoming property is handed back.
    Rejected(Property),
}

/// Result of a successful `store` call.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOutcome {
    pub admission: Admission,
    /// Entries the capacity manager removed to make room, oldest removal
    /// first. Non-empty even on rejection if the manager made partial
    /// progress.
    pub evicted: Vec<Property>,
}

impl StoreOutcome {
    pub fn is_stored(&self) -> bool {
        !self.is_rejected()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.admission, Admission::Rejected(_))
    }

    /// The entry this write displaced, if any.
    pub fn replaced(&self) -> Option<&Property> {
        match &self.admission {
            Admission::Overwritten(p) | Admission::Restored(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    order: u64,
    property: Property,
}

/// Capacity-bounded property container.
pub struct Storage<P: VersionPolicy = Versioned> {
    entries: HashMap<String, BTreeMap<Step, Slot>>,
    /// Insertion order -> (key, step).
    order: BTreeMap<u64, (String, Step)>,
    next_order: u64,
    capacity: Capacity,
    manager: Arc<dyn CapacityManager>,
    observers: Observers<StorageEvent, dyn StorageListener>,
    _policy: PhantomData<P>,
}

impl<P: VersionPolicy> std::fmt::Debug for Storage<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("policy", &P::NAME)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("manager", &self.manager.name())
            .finish()
    }
}

impl<P: VersionPolicy> Default for Storage<P> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<P: VersionPolicy> Storage<P> {
    pub fn new(manager: Arc<dyn CapacityManager>, capacity: Capacity) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_order: 0,
            capacity,
            manager,
            observers: Observers::new(),
            _policy: PhantomData,
        }
    }

    /// Unlimited capacity with a FIFO manager for later bounds.
    pub fn unbounded() -> Self {
        Self::new(Arc::new(Fifo), Capacity::Unlimited)
    }

    pub fn with_policy(policy: PolicyKind, capacity: Capacity) -> Self {
        Self::new(policy.into_manager(), capacity)
    }

    // =========================================================================
    // Size & capacity
    // =========================================================================

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_full(self.len())
    }

    pub fn capacity_manager(&self) -> &Arc<dyn CapacityManager> {
        &self.manager
    }

    pub fn set_capacity_manager(&mut self, manager: Arc<dyn CapacityManager>) {
        debug!(manager = manager.name(), "capacity manager replaced");
        self.manager = manager;
    }

    /// Change the capacity. When the bound shrinks, the capacity manager is
    /// invoked until the container fits or a call makes no progress; the
    /// capacity is set afterwards either way. Returns the evicted entries.
    pub fn set_capacity(&mut self, capacity: Capacity) -> Vec<Property> {
        let mut evicted = Vec::new();
        if capacity.shrinks(self.capacity) {
            if let Some(bound) = capacity.bound() {
                evicted = self.make_room(|len| len > bound);
            }
        }
        debug!(
            from = %self.capacity,
            to = %capacity,
            evicted = evicted.len(),
            len = self.len(),
            "capacity changed"
        );
        self.capacity = capacity;
        evicted
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn add_observer(&mut self, event: StorageEvent, listener: Arc<dyn StorageListener>) -> bool {
        self.observers.add(event, listener)
    }

    pub fn remove_observer(
        &mut self,
        event: StorageEvent,
        listener: &Arc<dyn StorageListener>,
    ) -> bool {
        self.observers.remove(event, listener)
    }

    fn notify(&self, event: StorageEvent, property: &Property) {
        for listener in self.observers.listeners(event) {
            listener.on_event(event, property);
        }
    }

    // =========================================================================
    // Store
    // =========================================================================

    /// Store `property`, overwriting any entry it replaces.
    ///
    /// Fails only on a negative timestamp. A full container whose manager
    /// cannot free a slot drops the property and reports
    /// [`Admission::Rejected`].
    pub fn store(&mut self, property: Property) -> StorageResult<StoreOutcome> {
        if property.timestamp() < 0 {
            return Err(StorageError::InvalidTimestamp {
                key: property.key().to_string(),
                timestamp: property.timestamp(),
            });
        }

        let displaced = self.displaced_step(&property);
        let mut evicted = Vec::new();

        // A replacing write never needs a new slot.
        if displaced.is_none() && self.is_full() {
            let capacity = self.capacity;
            evicted = self.make_room(|len| capacity.is_full(len));
            if self.is_full() {
                debug!(
                    key = property.key(),
                    step = property.timestamp(),
                    manager = self.manager.name(),
                    "container full, property dropped"
                );
                self.notify(StorageEvent::Rejected, &property);
                return Ok(StoreOutcome {
                    admission: Admission::Rejected(property),
                    evicted,
                });
            }
        }

        let replaced = displaced.and_then(|step| self.take_slot(property.key(), step));
        let admission = match replaced {
            None => Admission::Inserted,
            Some(old) if old.timestamp() > property.timestamp() => Admission::Restored(old),
            Some(old) => Admission::Overwritten(old),
        };

        let order = self.next_order;
        self.next_order += 1;
        self.order
            .insert(order, (property.key().to_string(), property.timestamp()));
        self.entries
            .entry(property.key().to_string())
            .or_default()
            .insert(
                property.timestamp(),
                Slot {
                    order,
                    property: property.clone(),
                },
            );

        debug!(
            key = property.key(),
            step = property.timestamp(),
            len = self.len(),
            "property stored"
        );

        match &admission {
            Admission::Overwritten(old) => self.notify(StorageEvent::Overwritten, old),
            Admission::Restored(old) => self.notify(StorageEvent::Restored, old),
            _ => {}
        }
        self.notify(StorageEvent::Stored, &property);

        Ok(StoreOutcome { admission, evicted })
    }

    /// Step of the entry a write of `property` would replace.
    fn displaced_step(&self, property: &Property) -> Option<Step> {
        let versions = self.entries.get(property.key())?;
        if P::KEEPS_HISTORY {
            versions
                .contains_key(&property.timestamp())
                .then_some(property.timestamp())
        } else {
            versions.keys().next_back().copied()
        }
    }

    /// Invoke the capacity manager while `over(len)` holds and it keeps
    /// making progress.
    fn make_room(&mut self, over: impl Fn(usize) -> bool) -> Vec<Property> {
        let manager = Arc::clone(&self.manager);
        let mut view = EvictionView {
            storage: self,
            evicted: Vec::new(),
        };
        while over(view.storage.len()) {
            let before = view.storage.len();
            let freed = manager.manage(&mut view);
            if view.storage.len() == before {
                trace!(manager = manager.name(), freed, "capacity manager made no progress");
                break;
            }
        }
        view.evicted
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Latest version of `key`.
    pub fn fetch(&self, key: &str) -> StorageResult<Property> {
        let property = self.latest(key).ok_or_else(|| RetrieveError::Missing {
            key: key.to_string(),
        })?;
        self.notify(StorageEvent::Fetched, property);
        Ok(property.clone())
    }

    /// Version of `key` stored at exactly `step`.
    pub fn fetch_at(&self, key: &str, step: Step) -> StorageResult<Property> {
        let property = self.at(key, step).ok_or_else(|| RetrieveError::MissingAt {
            key: key.to_string(),
            step,
        })?;
        self.notify(StorageEvent::Fetched, property);
        Ok(property.clone())
    }

    /// Latest version of `key`, which must hold a value of `kind`.
    pub fn fetch_typed(&self, kind: ValueKind, key: &str) -> StorageResult<Property> {
        let property = self.latest(key).ok_or_else(|| RetrieveError::Missing {
            key: key.to_string(),
        })?;
        check_kind(property, kind)?;
        self.notify(StorageEvent::Fetched, property);
        Ok(property.clone())
    }

    /// Version of `key` at `step`, which must hold a value of `kind`.
    pub fn fetch_typed_at(&self, kind: ValueKind, key: &str, step: Step) -> StorageResult<Property> {
        let property = self.at(key, step).ok_or_else(|| RetrieveError::MissingAt {
            key: key.to_string(),
            step,
        })?;
        check_kind(property, kind)?;
        self.notify(StorageEvent::Fetched, property);
        Ok(property.clone())
    }

    /// Every stored property whose value satisfies `kind`, across all keys
    /// and steps, in insertion order.
    pub fn fetch_all(&self, kind: ValueKind) -> Vec<Property> {
        let found: Vec<Property> = self
            .iter()
            .filter(|p| p.value().satisfies(kind))
            .cloned()
            .collect();
        for property in &found {
            self.notify(StorageEvent::Fetched, property);
        }
        found
    }

    /// Every version of `key`, oldest step first.
    pub fn fetch_history(&self, key: &str) -> StorageResult<Vec<Property>> {
        let versions = self
            .entries
            .get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RetrieveError::Missing {
                key: key.to_string(),
            })?;
        let found: Vec<Property> = versions.values().map(|s| s.property.clone()).collect();
        for property in &found {
            self.notify(StorageEvent::Fetched, property);
        }
        Ok(found)
    }

    fn latest(&self, key: &str) -> Option<&Property> {
        self.entries
            .get(key)
            .and_then(|versions| versions.values().next_back())
            .map(|slot| &slot.property)
    }

    fn at(&self, key: &str, step: Step) -> Option<&Property> {
        self.entries
            .get(key)
            .and_then(|versions| versions.get(&step))
            .map(|slot| &slot.property)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether this exact instance is stored.
    pub fn contains(&self, property: &Property) -> bool {
        self.at(property.key(), property.timestamp())
            .is_some_and(|p| p.is_same_instance(property))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|v| !v.is_empty())
    }

    pub fn contains_at(&self, key: &str, step: Step) -> bool {
        self.at(key, step).is_some()
    }

    /// The step of the latest version of `key`.
    pub fn latest_step(&self, key: &str) -> Option<Step> {
        self.latest(key).map(Property::timestamp)
    }

    /// Distinct keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Iterate all entries in insertion order. Each call starts over.
    pub fn iter(&self) -> impl Iterator<Item = &Property> + '_ {
        self.order
            .values()
            .filter_map(move |(key, step)| self.at(key, *step))
    }

    /// Snapshot of all entries with their insertion order, oldest first.
    pub fn view_entries(&self) -> Vec<ViewEntry> {
        self.order
            .iter()
            .filter_map(|(order, (key, step))| {
                self.at(key, *step).map(|p| ViewEntry {
                    order: *order,
                    property: p.clone(),
                })
            })
            .collect()
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Remove exactly this instance.
    pub fn remove(&mut self, property: &Property) -> StorageResult<Property> {
        let removed = self.take_instance(property)?;
        debug!(key = removed.key(), step = removed.timestamp(), "property removed");
        self.notify(StorageEvent::Removed, &removed);
        Ok(removed)
    }

    /// Remove the version of `key` stored at `step`.
    pub fn remove_at(&mut self, key: &str, step: Step) -> StorageResult<Property> {
        if !self.contains_key(key) {
            return Err(RemoveError::MissingKey {
                key: key.to_string(),
            }
            .into());
        }
        let removed = self.take_slot(key, step).ok_or_else(|| RemoveError::MissingAt {
            key: key.to_string(),
            step,
        })?;
        debug!(key, step, "property removed");
        self.notify(StorageEvent::Removed, &removed);
        Ok(removed)
    }

    /// Remove every version of `key`, returned oldest step first.
    pub fn remove_all(&mut self, key: &str) -> StorageResult<Vec<Property>> {
        let versions = self
            .entries
            .remove(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RemoveError::MissingKey {
                key: key.to_string(),
            })?;
        let removed: Vec<Property> = versions
            .into_values()
            .map(|slot| {
                self.order.remove(&slot.order);
                slot.property
            })
            .collect();
        debug!(key, count = removed.len(), "all versions removed");
        for property in &removed {
            self.notify(StorageEvent::Removed, property);
        }
        Ok(removed)
    }

    /// Remove everything, returned in insertion order.
    pub fn clear(&mut self) -> Vec<Property> {
        let order = std::mem::take(&mut self.order);
        let mut entries = std::mem::take(&mut self.entries);
        let removed: Vec<Property> = order
            .into_values()
            .filter_map(|(key, step)| {
                entries
                    .get_mut(&key)
                    .and_then(|versions| versions.remove(&step))
                    .map(|slot| slot.property)
            })
            .collect();
        for property in &removed {
            self.notify(StorageEvent::Removed, property);
        }
        removed
    }

    /// Swap the stored instance `old` for `new` as one operation.
    ///
    /// `old` does not count against the capacity while `new` is admitted. If
    /// `new` is rejected, `old` stays stored at its original insertion
    /// position and no `Removed` event fires. On success `Removed` fires for
    /// `old` after the store events of `new`.
    pub fn replace(&mut self, old: &Property, new: Property) -> StorageResult<StoreOutcome> {
        self.locate_instance(old)?;
        let slot = self
            .unlink(old.key(), old.timestamp())
            .ok_or_else(|| RemoveError::MissingAt {
                key: old.key().to_string(),
                step: old.timestamp(),
            })?;

        let outcome = match self.store(new) {
            Ok(outcome) if !outcome.is_rejected() => outcome,
            other => {
                self.relink(slot);
                return other;
            }
        };
        debug!(
            key = slot.property.key(),
            from = slot.property.timestamp(),
            len = self.len(),
            "property replaced"
        );
        self.notify(StorageEvent::Removed, &slot.property);
        Ok(outcome)
    }

    fn take_instance(&mut self, property: &Property) -> StorageResult<Property> {
        self.locate_instance(property)?;
        self.take_slot(property.key(), property.timestamp())
            .ok_or_else(|| {
                RemoveError::MissingAt {
                    key: property.key().to_string(),
                    step: property.timestamp(),
                }
                .into()
            })
    }

    /// Ok if exactly this instance is stored.
    fn locate_instance(&self, property: &Property) -> StorageResult<()> {
        let key = property.key();
        let step = property.timestamp();
        match self.at(key, step) {
            Some(stored) if stored.is_same_instance(property) => {}
            Some(_) => {
                return Err(RemoveError::MissingInstance {
                    key: key.to_string(),
                    step,
                }
                .into())
            }
            None if self.contains_key(key) => {
                return Err(RemoveError::MissingAt {
                    key: key.to_string(),
                    step,
                }
                .into())
            }
            None => {
                return Err(RemoveError::MissingKey {
                    key: key.to_string(),
                }
                .into())
            }
        }
        Ok(())
    }

    fn take_slot(&mut self, key: &str, step: Step) -> Option<Property> {
        self.unlink(key, step).map(|slot| slot.property)
    }

    /// Unlink the slot at (key, step) from every index.
    fn unlink(&mut self, key: &str, step: Step) -> Option<Slot> {
        let versions = self.entries.get_mut(key)?;
        let slot = versions.remove(&step)?;
        if versions.is_empty() {
            self.entries.remove(key);
        }
        self.order.remove(&slot.order);
        Some(slot)
    }

    /// Put an unlinked slot back under its original insertion order.
    fn relink(&mut self, slot: Slot) {
        let key = slot.property.key().to_string();
        let step = slot.property.timestamp();
        self.order.insert(slot.order, (key.clone(), step));
        self.entries.entry(key).or_default().insert(step, slot);
    }
}

fn check_kind(property: &Property, kind: ValueKind) -> Result<(), RetrieveError> {
    if property.value().satisfies(kind) {
        Ok(())
    } else {
        Err(RetrieveError::TypeMismatch {
            key: property.key().to_string(),
            expected: kind,
            actual: property.value().kind(),
        })
    }
}

/// Adapter handing the capacity manager a remove-only view of a storage.
struct EvictionView<'a, P: VersionPolicy> {
    storage: &'a mut Storage<P>,
    evicted: Vec<Property>,
}

impl<P: VersionPolicy> CapacityView for EvictionView<'_, P> {
    fn size(&self) -> usize {
        self.storage.len()
    }

    fn capacity(&self) -> Capacity {
        self.storage.capacity
    }

    fn entries(&self) -> Vec<ViewEntry> {
        self.storage.view_entries()
    }

    fn remove(&mut self, property: &Property) -> bool {
        match self.storage.take_instance(property) {
            Ok(victim) => {
                debug!(
                    key = victim.key(),
                    step = victim.timestamp(),
                    manager = self.storage.manager.name(),
                    "property evicted"
                );
                self.storage.notify(StorageEvent::AutoRemoved, &victim);
                self.evicted.push(victim);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::{Filo, Nino};
    use std::sync::Mutex;

    fn bounded(manager: Arc<dyn CapacityManager>, n: usize) -> Storage {
        Storage::new(manager, Capacity::Bounded(n))
    }

    #[test]
    fn test_store_and_fetch_latest() {
        let mut s: Storage = Storage::unbounded();
        s.store(Property::new("apple", 1, 3)).unwrap();
        s.store(Property::new("apple", 4, 5)).unwrap();
        s.store(Property::new("apple", 2, 9)).unwrap();

        let latest = s.fetch("apple").unwrap();
        assert_eq!(latest.timestamp(), 4);
        assert_eq!(latest.value().as_i64(), Some(5));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_negative_timestamp_rejected_without_mutation() {
        let mut s: Storage = Storage::unbounded();
        let err = s.store(Property::new("ghost", -1, 0)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidTimestamp { timestamp: -1, .. }));
        assert!(s.is_empty());
    }

    #[test]
    fn test_overwrite_same_key_and_step() {
        let mut s: Storage = Storage::unbounded();
        let first = Property::new("k", 3, "a");
        s.store(first.clone()).unwrap();
        let outcome = s.store(Property::new("k", 3, "b")).unwrap();

        assert_eq!(outcome.admission, Admission::Overwritten(first.clone()));
        assert_eq!(s.len(), 1);
        assert_eq!(s.fetch_at("k", 3).unwrap().value().as_str(), Some("b"));
        assert!(!s.contains(&first));
    }

    #[test]
    fn test_fetch_at_absent_step() {
        let mut s: Storage = Storage::unbounded();
        s.store(Property::new("k", 1, 1)).unwrap();
        let err = s.fetch_at("k", 2).unwrap_err();
        assert_eq!(
            err,
            StorageError::Retrieve(RetrieveError::MissingAt {
                key: "k".to_string(),
                step: 2
            })
        );
    }

    #[test]
    fn test_typed_fetch_narrows() {
        let mut s: Storage = Storage::unbounded();
        s.store(Property::new("price", 1, 2.5)).unwrap();

        assert!(s.fetch_typed(ValueKind::Number, "price").is_ok());
        assert!(s.fetch_typed(ValueKind::Float, "price").is_ok());
        let err = s.fetch_typed(ValueKind::Text, "price").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Retrieve(RetrieveError::TypeMismatch { .. })
        ));
        assert!(s.fetch_typed_at(ValueKind::Any, "price", 2).is_err());
    }

    #[test]
    fn test_fetch_all_by_kind() {
        let mut s: Storage = Storage::unbounded();
        s.store(Property::new("a", 1, 1)).unwrap();
        s.store(Property::new("a", 2, 2.0)).unwrap();
        s.store(Property::new("b", 1, "text")).unwrap();

        assert_eq!(s.fetch_all(ValueKind::Number).len(), 2);
        assert_eq!(s.fetch_all(ValueKind::Integer).len(), 1);
        assert_eq!(s.fetch_all(ValueKind::Any).len(), 3);
        assert!(s.fetch_all(ValueKind::Bool).is_empty());
    }

    #[test]
    fn test_remove_variants() {
        let mut s: Storage = Storage::unbounded();
        let p1 = Property::new("k", 1, 1);
        s.store(p1.clone()).unwrap();
        s.store(Property::new("k", 2, 2)).unwrap();
        s.store(Property::new("k", 3, 3)).unwrap();

        s.remove(&p1).unwrap();
        assert!(s.remove(&p1).unwrap_err().is_remove());
        s.remove_at("k", 3).unwrap();
        assert_eq!(s.fetch("k").unwrap().timestamp(), 2);
        assert_eq!(s.remove_all("k").unwrap().len(), 1);
        assert!(s.remove_all("k").unwrap_err().is_remove());
        assert!(s.is_empty());
    }

    #[test]
    fn test_remove_distinguishes_instances() {
        let mut s: Storage = Storage::unbounded();
        let stored = Property::new("k", 1, 1);
        let twin = Property::new("k", 1, 1);
        s.store(stored.clone()).unwrap();

        let err = s.remove(&twin).unwrap_err();
        assert_eq!(
            err,
            StorageError::Remove(RemoveError::MissingInstance {
                key: "k".to_string(),
                step: 1
            })
        );
        assert!(s.contains(&stored));
    }

    #[test]
    fn test_iter_insertion_order_and_restartable() {
        let mut s: Storage = Storage::unbounded();
        for (i, key) in ["c", "a", "b"].iter().enumerate() {
            s.store(Property::new(*key, i as i64, 0)).unwrap();
        }
        let first: Vec<&str> = s.iter().map(Property::key).collect();
        let second: Vec<&str> = s.iter().map(Property::key).collect();
        assert_eq!(first, vec!["c", "a", "b"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_fifo_store_evicts_oldest() {
        let mut s = bounded(Arc::new(Fifo), 2);
        s.store(Property::new("one", 1, 1)).unwrap();
        s.store(Property::new("two", 2, 2)).unwrap();
        let outcome = s.store(Property::new("three", 3, 3)).unwrap();

        assert_eq!(outcome.admission, Admission::Inserted);
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].key(), "one");
        assert!(!s.contains_key("one"));
    }

    #[test]
    fn test_nino_store_rejects_incoming() {
        let mut s = bounded(Arc::new(Nino), 1);
        s.store(Property::new("one", 1, 1)).unwrap();
        let outcome = s.store(Property::new("two", 2, 2)).unwrap();

        assert!(outcome.is_rejected());
        assert!(outcome.evicted.is_empty());
        assert!(s.contains_key("one"));
        assert!(!s.contains_key("two"));
    }

    #[test]
    fn test_full_overwrite_needs_no_eviction() {
        let mut s = bounded(Arc::new(Nino), 1);
        s.store(Property::new("one", 1, 1)).unwrap();
        let outcome = s.store(Property::new("one", 1, 7)).unwrap();

        assert!(outcome.is_stored());
        assert_eq!(s.fetch("one").unwrap().value().as_i64(), Some(7));
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut s = bounded(Arc::new(Fifo), 0);
        let outcome = s.store(Property::new("k", 0, 0)).unwrap();
        assert!(outcome.is_rejected());
        assert!(s.is_empty());
        assert!(s.is_full());
    }

    #[test]
    fn test_shrink_with_nino_terminates() {
        let mut s = Storage::<Versioned>::with_policy(PolicyKind::Nino, Capacity::Unlimited);
        for i in 0..5 {
            s.store(Property::new(format!("k{i}"), i, i)).unwrap();
        }
        let evicted = s.set_capacity(Capacity::Bounded(2));
        assert!(evicted.is_empty());
        assert_eq!(s.len(), 5);
        assert_eq!(s.capacity(), Capacity::Bounded(2));
        assert!(s.is_full());
    }

    #[test]
    fn test_replace_does_not_count_the_old_instance() {
        let mut s = bounded(Arc::new(Nino), 2);
        let first = Property::new("one", 1, 1);
        s.store(first.clone()).unwrap();
        s.store(Property::new("two", 2, 2)).unwrap();

        let renewed = first.refreshed(5, None);
        let outcome = s.replace(&first, renewed.clone()).unwrap();
        assert_eq!(outcome.admission, Admission::Inserted);
        assert!(!s.contains(&first));
        assert!(s.contains(&renewed));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_rejected_replace_keeps_the_old_instance_in_place() {
        let removed = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&removed);
        let mut s = Storage::<Versioned>::with_policy(PolicyKind::Nino, Capacity::Unlimited);
        s.add_observer(
            StorageEvent::Removed,
            Arc::new(move |_: StorageEvent, _: &Property| *sink.lock().unwrap() += 1),
        );
        let first = Property::new("k0", 0, 0);
        s.store(first.clone()).unwrap();
        for i in 1..5 {
            s.store(Property::new(format!("k{i}"), i, i)).unwrap();
        }
        s.set_capacity(Capacity::Bounded(2));

        let outcome = s.replace(&first, first.refreshed(9, None)).unwrap();
        assert!(outcome.is_rejected());
        assert!(s.contains(&first));
        assert_eq!(s.len(), 5);
        assert_eq!(s.iter().next().map(|p| p.key()), Some("k0"));
        assert_eq!(*removed.lock().unwrap(), 0);
    }

    #[test]
    fn test_replace_of_unknown_instance_fails() {
        let mut s: Storage = Storage::unbounded();
        s.store(Property::new("k", 1, 1)).unwrap();
        let twin = Property::new("k", 1, 1);
        let err = s.replace(&twin, twin.refreshed(2, None)).unwrap_err();
        assert!(err.is_remove());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_swap_manager_at_runtime() {
        let mut s = bounded(Arc::new(Fifo), 2);
        s.store(Property::new("one", 1, 1)).unwrap();
        s.store(Property::new("two", 2, 2)).unwrap();
        s.set_capacity_manager(Arc::new(Filo));
        s.store(Property::new("three", 3, 3)).unwrap();

        assert!(s.contains_key("one"));
        assert!(!s.contains_key("two"));
        assert_eq!(s.capacity_manager().name(), "filo");
    }

    #[test]
    fn test_overwrite_storage_keeps_one_version() {
        let mut s = OverwriteStorage::unbounded();
        s.store(Property::new("k", 1, 1)).unwrap();
        let outcome = s.store(Property::new("k", 5, 2)).unwrap();
        assert!(matches!(outcome.admission, Admission::Overwritten(_)));
        assert_eq!(s.len(), 1);
        assert!(s.contains_at("k", 5));
        assert!(!s.contains_at("k", 1));

        let outcome = s.store(Property::new("k", 3, 3)).unwrap();
        assert!(matches!(outcome.admission, Admission::Restored(ref old) if old.timestamp() == 5));
        assert_eq!(s.fetch("k").unwrap().timestamp(), 3);
    }

    #[test]
    fn test_observers_see_lifecycle() {
        let seen: Arc<Mutex<Vec<(StorageEvent, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn StorageListener> =
            Arc::new(move |event: StorageEvent, p: &Property| {
                sink.lock().unwrap().push((event, p.key().to_string()));
            });

        let mut s = bounded(Arc::new(Fifo), 1);
        for event in StorageEvent::ALL {
            s.add_observer(event, Arc::clone(&listener));
        }
        s.store(Property::new("a", 1, 1)).unwrap();
        s.store(Property::new("b", 2, 2)).unwrap();
        s.fetch("b").unwrap();
        s.remove_at("b", 2).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (StorageEvent::Stored, "a".to_string()),
                (StorageEvent::AutoRemoved, "a".to_string()),
                (StorageEvent::Stored, "b".to_string()),
                (StorageEvent::Fetched, "b".to_string()),
                (StorageEvent::Removed, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_failed_fetch_does_not_notify() {
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let mut s: Storage = Storage::unbounded();
        s.add_observer(
            StorageEvent::Fetched,
            Arc::new(move |_: StorageEvent, _: &Property| *sink.lock().unwrap() += 1),
        );
        assert!(s.fetch("nothing").is_err());
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn test_clear_empties_all_indices() {
        let mut s: Storage = Storage::unbounded();
        s.store(Property::new("a", 1, 1)).unwrap();
        s.store(Property::new("b", 1, 1)).unwrap();
        assert_eq!(s.clear().len(), 2);
        assert!(s.is_empty());
        assert!(s.keys().is_empty());
        s.store(Property::new("a", 2, 1)).unwrap();
        assert_eq!(s.len(), 1);
    }
}
