//! The agent-facing memory.
//!
//! A [`Memory`] wraps a [`Storage`] and adds step-based retention, a lazy
//! expiry sweep driven by an external [`StepClock`], memory-level observers
//! and lifecycle counters.
//!
//! Every public read or write first runs [`Memory::check_if_new_step`]:
//! when the clock has moved since the last call, everything whose time of
//! death is at or before the current step is forgotten, so expired entries
//! never show up as live.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use simmem_store::{
    Admission, Capacity, CapacityManager, Observers, Overwrite, Property, Step, Storage,
    StorageEvent, StoreOutcome, Value, ValueKind, VersionPolicy, Versioned,
};
use tracing::{debug, trace};

use super::config::{MemoryConfig, MemoryName};
use super::error::{MemoryError, MemoryResult};
use super::events::{MemoryEvent, MemoryListener};
use super::retention::{Retention, RetentionLedger, SweepGuard};
use super::view::MemoryCapacityView;
use crate::clock::StepClock;
use crate::obs;
use crate::stats::MemoryStats;

/// Memory keeping one live version per key.
pub type OverwriteMemory = Memory<Overwrite>;

/// Bounded, time-versioned store of properties owned by one agent.
pub struct Memory<P: VersionPolicy = Versioned> {
    name: MemoryName,
    storage: Storage<P>,
    clock: Arc<dyn StepClock>,
    last_step: Step,
    default_retention: Retention,
    ledger: RetentionLedger,
    sweeping: Arc<AtomicBool>,
    observers: Observers<MemoryEvent, dyn MemoryListener>,
    stats: MemoryStats,
}

impl<P: VersionPolicy> std::fmt::Debug for Memory<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("name", &self.name)
            .field("policy", &P::NAME)
            .field("storage", &self.storage)
            .field("last_step", &self.last_step)
            .field("default_retention", &self.default_retention)
            .field("tracked", &self.ledger.len())
            .finish()
    }
}

impl Memory<Versioned> {
    /// Versioned memory using the config's built-in policy.
    pub fn versioned(config: MemoryConfig, clock: Arc<dyn StepClock>) -> MemoryResult<Self> {
        Self::from_config(config, clock)
    }
}

impl Memory<Overwrite> {
    /// One-version-per-key memory using the config's built-in policy.
    ///
    /// Fails with `NotImplemented` if the config asks for a limited default
    /// retention.
    pub fn overwrite(config: MemoryConfig, clock: Arc<dyn StepClock>) -> MemoryResult<Self> {
        Self::from_config(config, clock)
    }
}

impl<P: VersionPolicy> Memory<P> {
    pub fn from_config(config: MemoryConfig, clock: Arc<dyn StepClock>) -> MemoryResult<Self> {
        let manager = config.policy.into_manager();
        Self::with_manager(config, manager, clock)
    }

    /// Build a memory around a custom capacity manager. `config.policy` is
    /// ignored.
    pub fn with_manager(
        config: MemoryConfig,
        manager: Arc<dyn CapacityManager>,
        clock: Arc<dyn StepClock>,
    ) -> MemoryResult<Self> {
        config.validate::<P>()?;
        let last_step = clock.current_step();
        debug!(
            memory = %config.name,
            variant = P::NAME,
            capacity = %config.capacity,
            manager = manager.name(),
            step = last_step,
            "memory created"
        );
        Ok(Self {
            name: config.name,
            storage: Storage::new(manager, config.capacity),
            clock,
            last_step,
            default_retention: config.default_retention,
            ledger: RetentionLedger::default(),
            sweeping: Arc::new(AtomicBool::new(false)),
            observers: Observers::new(),
            stats: MemoryStats::new(),
        })
    }

    pub fn name(&self) -> &MemoryName {
        &self.name
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// The clock's current step.
    pub fn current_step(&self) -> Step {
        self.clock.current_step()
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    /// Forget everything whose time of death has come, if the clock moved
    /// since the last call. A sweep already in progress makes this a no-op.
    pub fn check_if_new_step(&mut self) {
        let now = self.clock.current_step();
        if now == self.last_step {
            return;
        }
        let Some(_guard) = SweepGuard::try_enter(&self.sweeping) else {
            return;
        };
        let _span = obs::MemorySpan::enter(self.name.as_str());

        let due = self.ledger.take_due(now);
        if !due.is_empty() {
            debug!(
                memory = %self.name,
                from = self.last_step,
                to = now,
                due = due.len(),
                "sweeping expired properties"
            );
        }
        for property in &due {
            match self.storage.remove(property) {
                Ok(removed) => {
                    self.stats.inc_expired();
                    obs::emit_expired(self.name.as_str(), &removed, now);
                    self.after_forget(&removed, MemoryEvent::Forgotten);
                }
                Err(e) => obs::emit_sweep_error(self.name.as_str(), property, &e),
            }
        }
        self.last_step = now;
    }

    // =========================================================================
    // Memorize
    // =========================================================================

    /// Store `property` with the default retention.
    ///
    /// A full memory whose capacity manager frees nothing drops the property
    /// without an error; the outcome is then [`Admission::Rejected`] and the
    /// `Rejected` event fires.
    pub fn memorize(&mut self, property: Property) -> MemoryResult<StoreOutcome> {
        let retention = self.default_retention;
        self.memorize_for(property, retention)
    }

    /// Store `property`; it expires `retention` steps after its timestamp.
    pub fn memorize_for(
        &mut self,
        property: Property,
        retention: Retention,
    ) -> MemoryResult<StoreOutcome> {
        if !retention.is_unlimited() {
            self.require_retention("memorize with retention")?;
        }
        self.check_if_new_step();
        self.put(property, retention)
    }

    fn put(&mut self, property: Property, retention: Retention) -> MemoryResult<StoreOutcome> {
        let outcome = self.storage.store(property.clone())?;
        self.after_store_evictions(&outcome);
        self.after_admission(&property, retention, &outcome, false);
        Ok(outcome)
    }

    fn after_store_evictions(&mut self, outcome: &StoreOutcome) {
        for victim in &outcome.evicted {
            self.after_evict(victim);
        }
    }

    fn after_admission(
        &mut self,
        property: &Property,
        retention: Retention,
        outcome: &StoreOutcome,
        refreshed: bool,
    ) {
        match &outcome.admission {
            Admission::Rejected(dropped) => {
                self.stats.inc_rejected();
                obs::emit_rejected(
                    self.name.as_str(),
                    dropped,
                    self.storage.capacity_manager().name(),
                );
                self.notify(MemoryEvent::Rejected, dropped);
            }
            admission => {
                if let Some(old) = outcome.replaced() {
                    self.ledger.release(old);
                }
                let time_of_death = retention.time_of_death(property.timestamp());
                if let Some(tod) = time_of_death {
                    self.ledger.record(property, tod);
                }
                match admission {
                    Admission::Overwritten(old) => self.relay(StorageEvent::Overwritten, old),
                    Admission::Restored(old) => self.relay(StorageEvent::Restored, old),
                    _ => {}
                }
                self.relay(StorageEvent::Stored, property);

                obs::emit_memorized(self.name.as_str(), property, time_of_death);
                if refreshed {
                    self.notify(MemoryEvent::RefreshedPropertyMemorized, property);
                } else {
                    self.stats.inc_memorized();
                    self.notify(MemoryEvent::Memorized, property);
                }
            }
        }
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Steps left before `property` expires; `0` if it is not tracked.
    pub fn get_retention_time(&mut self, property: &Property) -> MemoryResult<Step> {
        self.require_retention("get_retention_time")?;
        self.check_if_new_step();
        let now = self.clock.current_step();
        Ok(self
            .ledger
            .time_of_death(property)
            .map_or(0, |tod| tod.saturating_sub(now)))
    }

    /// Step at which `property` expires, if it is tracked.
    pub fn time_of_death(&mut self, property: &Property) -> MemoryResult<Option<Step>> {
        self.require_retention("time_of_death")?;
        self.check_if_new_step();
        Ok(self.ledger.time_of_death(property))
    }

    pub fn get_default_retention_time(&self) -> MemoryResult<Retention> {
        self.require_retention("get_default_retention_time")?;
        Ok(self.default_retention)
    }

    pub fn set_default_retention_time(&mut self, retention: Retention) -> MemoryResult<()> {
        self.require_retention("set_default_retention_time")?;
        debug!(memory = %self.name, retention = %retention, "default retention changed");
        self.default_retention = retention;
        Ok(())
    }

    fn require_retention(&self, operation: &'static str) -> MemoryResult<()> {
        if P::KEEPS_HISTORY {
            Ok(())
        } else {
            Err(MemoryError::NotImplemented {
                operation,
                variant: P::NAME,
            })
        }
    }

    // =========================================================================
    // Forget
    // =========================================================================

    /// Forget exactly this instance.
    pub fn forget(&mut self, property: &Property) -> MemoryResult<Property> {
        self.check_if_new_step();
        self.forget_instance(property)
    }

    /// Forget the version of `key` stored at `step`.
    pub fn forget_at(&mut self, key: &str, step: Step) -> MemoryResult<Property> {
        self.check_if_new_step();
        let removed = self.storage.remove_at(key, step)?;
        self.after_forget(&removed, MemoryEvent::Forgotten);
        Ok(removed)
    }

    /// Forget every version of `key`, oldest step first.
    pub fn forget_all(&mut self, key: &str) -> MemoryResult<Vec<Property>> {
        self.check_if_new_step();
        let removed = self.storage.remove_all(key)?;
        for property in &removed {
            self.after_forget(property, MemoryEvent::Forgotten);
        }
        Ok(removed)
    }

    /// Forget everything, in insertion order.
    pub fn clear(&mut self) -> Vec<Property> {
        self.check_if_new_step();
        let removed = self.storage.clear();
        for property in &removed {
            self.after_forget(property, MemoryEvent::Forgotten);
        }
        self.ledger.clear();
        removed
    }

    pub(super) fn forget_instance(&mut self, property: &Property) -> MemoryResult<Property> {
        let removed = self.storage.remove(property)?;
        self.after_forget(&removed, MemoryEvent::Forgotten);
        Ok(removed)
    }

    fn after_forget(&mut self, property: &Property, event: MemoryEvent) {
        self.ledger.release(property);
        if event == MemoryEvent::Forgotten {
            self.stats.inc_forgotten();
        }
        debug!(
            memory = %self.name,
            key = property.key(),
            step = property.timestamp(),
            event = %event,
            "property forgotten"
        );
        self.relay(StorageEvent::Removed, property);
        self.notify(event, property);
    }

    fn after_evict(&mut self, victim: &Property) {
        self.ledger.release(victim);
        self.stats.inc_evicted();
        obs::emit_evicted(
            self.name.as_str(),
            victim,
            self.storage.capacity_manager().name(),
        );
        self.relay(StorageEvent::AutoRemoved, victim);
        self.notify(MemoryEvent::Evicted, victim);
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Replace `property` with a renewed instance under the default
    /// retention. Returns the new instance.
    pub fn refresh(&mut self, property: &Property) -> MemoryResult<Property> {
        let retention = self.default_retention;
        self.refresh_with(property, None, retention)
    }

    pub fn refresh_for(
        &mut self,
        property: &Property,
        retention: Retention,
    ) -> MemoryResult<Property> {
        self.refresh_with(property, None, retention)
    }

    /// Forget `property` and memorize a new instance with the same key,
    /// stamped with the current step (never earlier than the old one) and
    /// carrying `value` if given. Fires `RefreshedPropertyForgotten` and
    /// `RefreshedPropertyMemorized` instead of `Forgotten` and `Memorized`.
    ///
    /// The swap is atomic: if the memory is over capacity and the new
    /// instance is rejected, `property` stays stored with its retention,
    /// `Rejected` fires and the call fails with `RefreshRejected`.
    ///
    /// The retention is ignored by memories that keep no history.
    pub fn refresh_with(
        &mut self,
        property: &Property,
        value: Option<Value>,
        retention: Retention,
    ) -> MemoryResult<Property> {
        let retention = if P::KEEPS_HISTORY {
            retention
        } else {
            Retention::Unlimited
        };
        self.check_if_new_step();

        let step = self.clock.current_step().max(property.timestamp());
        let fresh = property.refreshed(step, value);
        let outcome = self.storage.replace(property, fresh.clone())?;

        if outcome.is_rejected() {
            self.after_store_evictions(&outcome);
            self.after_admission(&fresh, retention, &outcome, true);
            return Err(MemoryError::RefreshRejected {
                key: fresh.key().to_string(),
                step,
            });
        }

        self.after_forget(property, MemoryEvent::RefreshedPropertyForgotten);
        self.after_store_evictions(&outcome);
        self.after_admission(&fresh, retention, &outcome, true);
        self.stats.inc_refreshed();
        Ok(fresh)
    }

    // =========================================================================
    // Recall
    // =========================================================================

    /// Latest version of `key`.
    pub fn recall(&mut self, key: &str) -> MemoryResult<Property> {
        self.check_if_new_step();
        let property = self.storage.fetch(key)?;
        self.after_recall(&property);
        Ok(property)
    }

    /// Version of `key` stored at exactly `step`.
    pub fn recall_at(&mut self, key: &str, step: Step) -> MemoryResult<Property> {
        self.check_if_new_step();
        let property = self.storage.fetch_at(key, step)?;
        self.after_recall(&property);
        Ok(property)
    }

    pub fn recall_typed(&mut self, kind: ValueKind, key: &str) -> MemoryResult<Property> {
        self.check_if_new_step();
        let property = self.storage.fetch_typed(kind, key)?;
        self.after_recall(&property);
        Ok(property)
    }

    pub fn recall_typed_at(
        &mut self,
        kind: ValueKind,
        key: &str,
        step: Step,
    ) -> MemoryResult<Property> {
        self.check_if_new_step();
        let property = self.storage.fetch_typed_at(kind, key, step)?;
        self.after_recall(&property);
        Ok(property)
    }

    /// Every live property whose value satisfies `kind`, in insertion order.
    pub fn recall_all(&mut self, kind: ValueKind) -> Vec<Property> {
        self.check_if_new_step();
        let found = self.storage.fetch_all(kind);
        for property in &found {
            self.after_recall(property);
        }
        found
    }

    /// Every live version of `key`, oldest step first.
    pub fn recall_history(&mut self, key: &str) -> MemoryResult<Vec<Property>> {
        self.check_if_new_step();
        let found = self.storage.fetch_history(key)?;
        for property in &found {
            self.after_recall(property);
        }
        Ok(found)
    }

    fn after_recall(&self, property: &Property) {
        self.stats.inc_recalled();
        trace!(
            memory = %self.name,
            key = property.key(),
            step = property.timestamp(),
            "property recalled"
        );
        self.relay(StorageEvent::Fetched, property);
        self.notify(MemoryEvent::Recalled, property);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether this exact instance is live.
    pub fn contains(&mut self, property: &Property) -> bool {
        self.check_if_new_step();
        self.storage.contains(property)
    }

    pub fn contains_key(&mut self, key: &str) -> bool {
        self.check_if_new_step();
        self.storage.contains_key(key)
    }

    pub fn contains_at(&mut self, key: &str, step: Step) -> bool {
        self.check_if_new_step();
        self.storage.contains_at(key, step)
    }

    pub fn len(&mut self) -> usize {
        self.check_if_new_step();
        self.storage.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.check_if_new_step();
        self.storage.is_empty()
    }

    pub fn is_full(&mut self) -> bool {
        self.check_if_new_step();
        self.storage.is_full()
    }

    pub fn capacity(&self) -> Capacity {
        self.storage.capacity()
    }

    /// Distinct live keys, sorted.
    pub fn keys(&mut self) -> Vec<String> {
        self.check_if_new_step();
        self.storage.keys()
    }

    /// Every live property in insertion order.
    pub fn snapshot(&mut self) -> Vec<Property> {
        self.check_if_new_step();
        self.storage.iter().cloned().collect()
    }

    pub(super) fn storage(&self) -> &Storage<P> {
        &self.storage
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    /// Change the capacity, evicting through the capacity manager when it
    /// shrinks. Returns the evicted properties.
    pub fn set_capacity(&mut self, capacity: impl Into<Capacity>) -> Vec<Property> {
        self.check_if_new_step();
        let from = self.storage.capacity();
        let to = capacity.into();
        let evicted = self.storage.set_capacity(to);
        for victim in &evicted {
            self.after_evict(victim);
        }
        obs::emit_capacity_changed(self.name.as_str(), from, to, evicted.len());
        evicted
    }

    pub fn capacity_manager(&self) -> &Arc<dyn CapacityManager> {
        self.storage.capacity_manager()
    }

    pub fn set_capacity_manager(&mut self, manager: Arc<dyn CapacityManager>) {
        self.storage.set_capacity_manager(manager);
    }

    /// A [`CapacityView`](simmem_store::CapacityView) for external shrink
    /// callers. Removals through it behave like [`Memory::forget`].
    pub fn capacity_view(&mut self) -> MemoryCapacityView<'_, P> {
        self.check_if_new_step();
        MemoryCapacityView::new(self)
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Register `listener` for `event`. Returns `false` if it was already
    /// registered.
    pub fn add_observer(&mut self, event: MemoryEvent, listener: Arc<dyn MemoryListener>) -> bool {
        self.observers.add(event, listener)
    }

    pub fn remove_observer(
        &mut self,
        event: MemoryEvent,
        listener: &Arc<dyn MemoryListener>,
    ) -> bool {
        self.observers.remove(event, listener)
    }

    fn notify(&self, event: MemoryEvent, property: &Property) {
        for listener in self.observers.listeners(event) {
            listener.on_event(event, property);
        }
    }

    /// Storage-level events reach memory listeners only when the memory
    /// keeps no history.
    fn relay(&self, event: StorageEvent, property: &Property) {
        if P::KEEPS_HISTORY {
            return;
        }
        if let Some(relayed) = MemoryEvent::relayed(event) {
            self.notify(relayed, property);
        }
    }
}
