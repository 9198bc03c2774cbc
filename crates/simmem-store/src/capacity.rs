//! Capacity bounds and eviction policies.
//!
//! A [`CapacityManager`] is asked to free space whenever a bounded container
//! is full. It sees the container only through a [`CapacityView`]: size,
//! capacity, an insertion-ordered listing, and single-item removal. It can
//! never insert.
//!
//! Policies are stateless and may be shared across containers through an
//! `Arc<dyn CapacityManager>`.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::property::Property;

/// Maximum number of entries a container may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    Bounded(usize),
    #[default]
    Unlimited,
}

impl Capacity {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Capacity::Unlimited)
    }

    /// The bound, if any.
    pub fn bound(&self) -> Option<usize> {
        match self {
            Capacity::Bounded(n) => Some(*n),
            Capacity::Unlimited => None,
        }
    }

    /// Whether a container holding `size` entries has no free slot.
    pub fn is_full(&self, size: usize) -> bool {
        match self {
            Capacity::Bounded(n) => size >= *n,
            Capacity::Unlimited => false,
        }
    }

    /// Whether moving from `current` to `self` lowers the bound.
    pub fn shrinks(&self, current: Capacity) -> bool {
        match (self, current) {
            (Capacity::Bounded(_), Capacity::Unlimited) => true,
            (Capacity::Bounded(new), Capacity::Bounded(old)) => *new < old,
            (Capacity::Unlimited, _) => false,
        }
    }
}

impl From<usize> for Capacity {
    fn from(n: usize) -> Self {
        Capacity::Bounded(n)
    }
}

impl std::fmt::Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capacity::Bounded(n) => write!(f, "{n}"),
            Capacity::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// One entry as seen by a [`CapacityManager`].
#[derive(Debug, Clone)]
pub struct ViewEntry {
    /// Insertion order within the container; larger is more recent.
    pub order: u64,
    pub property: Property,
}

/// The restricted container surface exposed to eviction policies and to
/// external capacity-shrink callers.
pub trait CapacityView {
    fn size(&self) -> usize;

    fn capacity(&self) -> Capacity;

    /// All entries, oldest insertion first.
    fn entries(&self) -> Vec<ViewEntry>;

    /// Remove exactly this instance. Returns `false` if it is not stored.
    fn remove(&mut self, property: &Property) -> bool;
}

/// Eviction strategy invoked when a bounded container is full.
pub trait CapacityManager: std::fmt::Debug + Send + Sync {
    /// Try to free at least one slot. Returns `true` if something was
    /// removed, `false` if the policy declined.
    ///
    /// Declining makes the container drop the *incoming* item instead.
    fn manage(&self, view: &mut dyn CapacityView) -> bool;

    /// Short policy name for logs and reports.
    fn name(&self) -> &'static str;
}

/// First in, first out: evicts the oldest insertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

impl CapacityManager for Fifo {
    fn manage(&self, view: &mut dyn CapacityView) -> bool {
        let victim = view.entries().into_iter().min_by_key(|e| e.order);
        match victim {
            Some(entry) => view.remove(&entry.property),
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}

/// First in, last out: evicts the most recent insertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Filo;

impl CapacityManager for Filo {
    fn manage(&self, view: &mut dyn CapacityView) -> bool {
        let victim = view.entries().into_iter().max_by_key(|e| e.order);
        match victim {
            Some(entry) => view.remove(&entry.property),
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "filo"
    }
}

/// New item not inserted: never evicts, so newcomers are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nino;

impl CapacityManager for Nino {
    fn manage(&self, _view: &mut dyn CapacityView) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "nino"
    }
}

/// Built-in policy selector for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Fifo,
    Filo,
    Nino,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [PolicyKind::Fifo, PolicyKind::Filo, PolicyKind::Nino];

    pub fn into_manager(self) -> Arc<dyn CapacityManager> {
        match self {
            PolicyKind::Fifo => Arc::new(Fifo),
            PolicyKind::Filo => Arc::new(Filo),
            PolicyKind::Nino => Arc::new(Nino),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PolicyKind::Fifo => "evict the oldest insertion",
            PolicyKind::Filo => "evict the most recent insertion",
            PolicyKind::Nino => "never evict; reject the incoming item",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Fifo => write!(f, "fifo"),
            PolicyKind::Filo => write!(f, "filo"),
            PolicyKind::Nino => write!(f, "nino"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(PolicyKind::Fifo),
            "filo" | "lifo" => Ok(PolicyKind::Filo),
            "nino" => Ok(PolicyKind::Nino),
            other => Err(format!(
                "unknown capacity policy '{other}' (expected fifo, filo or nino)"
            )),
        }
    }
}
