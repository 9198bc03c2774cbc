//! Step-based retention bookkeeping.
//!
//! Every property memorized with a limited [`Retention`] gets a time of
//! death (`timestamp + retention`). The ledger indexes it both ways,
//! property -> step and step -> properties, so the sweep can pull everything
//! due at or before the current step in one pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use simmem_store::{Property, PropertyId, Step};

/// How many steps a memorized property stays alive.
///
/// A property stamped `S` with `Steps(R)` is live for steps `S..S+R` and is
/// swept at the first step change that reaches `S+R`. Expiry only happens
/// when the step changes, so `Steps(0)` on a property stamped with the
/// current step keeps it live until the clock moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    Steps(u64),
    #[default]
    Unlimited,
}

impl Retention {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Retention::Unlimited)
    }

    /// Step at which a property stamped `born` expires, if ever.
    pub fn time_of_death(&self, born: Step) -> Option<Step> {
        match self {
            Retention::Steps(n) => {
                let steps = Step::try_from(*n).unwrap_or(Step::MAX);
                Some(born.saturating_add(steps))
            }
            Retention::Unlimited => None,
        }
    }
}

impl From<u64> for Retention {
    fn from(steps: u64) -> Self {
        Retention::Steps(steps)
    }
}

impl std::fmt::Display for Retention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Retention::Steps(n) => write!(f, "{n} steps"),
            Retention::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Two-way index between properties and their time of death.
#[derive(Debug, Default)]
pub(crate) struct RetentionLedger {
    deaths: HashMap<PropertyId, Step>,
    by_step: BTreeMap<Step, HashMap<PropertyId, Property>>,
}

impl RetentionLedger {
    pub(crate) fn record(&mut self, property: &Property, time_of_death: Step) {
        self.release(property);
        self.deaths.insert(property.id(), time_of_death);
        self.by_step
            .entry(time_of_death)
            .or_default()
            .insert(property.id(), property.clone());
    }

    /// Drop the bookkeeping for `property`; returns its time of death.
    pub(crate) fn release(&mut self, property: &Property) -> Option<Step> {
        let step = self.deaths.remove(&property.id())?;
        if let Some(due) = self.by_step.get_mut(&step) {
            due.remove(&property.id());
            if due.is_empty() {
                self.by_step.remove(&step);
            }
        }
        Some(step)
    }

    pub(crate) fn time_of_death(&self, property: &Property) -> Option<Step> {
        self.deaths.get(&property.id()).copied()
    }

    /// Remove and return everything due at or before `now`, ordered by time
    /// of death, then timestamp, then key.
    pub(crate) fn take_due(&mut self, now: Step) -> Vec<Property> {
        let steps: Vec<Step> = self.by_step.range(..=now).map(|(step, _)| *step).collect();
        let mut due = Vec::new();
        for step in steps {
            // Snapshot the whole step before anything is forgotten.
            let Some(batch) = self.by_step.remove(&step) else {
                continue;
            };
            let mut batch: Vec<Property> = batch.into_values().collect();
            batch.sort_by(|a, b| {
                a.timestamp()
                    .cmp(&b.timestamp())
                    .then_with(|| a.key().cmp(b.key()))
            });
            for property in &batch {
                self.deaths.remove(&property.id());
            }
            due.extend(batch);
        }
        due
    }

    pub(crate) fn len(&self) -> usize {
        self.deaths.len()
    }

    pub(crate) fn clear(&mut self) {
        self.deaths.clear();
        self.by_step.clear();
    }
}

/// RAII guard marking a sweep in progress.
///
/// The flag is cleared when the guard drops, including on early return and
/// unwinding.
pub(crate) struct SweepGuard {
    flag: Arc<AtomicBool>,
}

impl SweepGuard {
    /// Enter the sweep, or `None` if one is already running.
    pub(crate) fn try_enter(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_of_death() {
        assert_eq!(Retention::Steps(3).time_of_death(4), Some(7));
        assert_eq!(Retention::Steps(0).time_of_death(4), Some(4));
        assert_eq!(Retention::Unlimited.time_of_death(4), None);
        assert_eq!(Retention::Steps(u64::MAX).time_of_death(1), Some(Step::MAX));
    }

    #[test]
    fn test_record_and_release() {
        let mut ledger = RetentionLedger::default();
        let p = Property::new("k", 1, 1);
        ledger.record(&p, 5);
        assert_eq!(ledger.time_of_death(&p), Some(5));
        assert_eq!(ledger.len(), 1);

        assert_eq!(ledger.release(&p), Some(5));
        assert_eq!(ledger.release(&p), None);
        assert_eq!(ledger.len(), 0);
        assert!(ledger.take_due(Step::MAX).is_empty());
    }

    #[test]
    fn test_record_twice_keeps_one_entry() {
        let mut ledger = RetentionLedger::default();
        let p = Property::new("k", 1, 1);
        ledger.record(&p, 5);
        ledger.record(&p, 9);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.take_due(8).is_empty());
        assert_eq!(ledger.take_due(9).len(), 1);
    }

    #[test]
    fn test_take_due_includes_overdue_steps() {
        let mut ledger = RetentionLedger::default();
        let a = Property::new("a", 0, 0);
        let b = Property::new("b", 0, 0);
        let c = Property::new("c", 0, 0);
        ledger.record(&a, 2);
        ledger.record(&b, 4);
        ledger.record(&c, 6);

        let due: Vec<String> = ledger
            .take_due(4)
            .iter()
            .map(|p| p.key().to_string())
            .collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.time_of_death(&c), Some(6));
    }

    #[test]
    fn test_sweep_guard_is_exclusive_and_clears_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        {
            let guard = SweepGuard::try_enter(&flag);
            assert!(guard.is_some());
            assert!(SweepGuard::try_enter(&flag).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
        assert!(SweepGuard::try_enter(&flag).is_some());
    }

    #[test]
    fn test_sweep_guard_clears_on_unwind() {
        let flag = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&flag);
        let result = std::panic::catch_unwind(move || {
            let _guard = SweepGuard::try_enter(&inner);
            panic!("sweep failed");
        });
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }
}
