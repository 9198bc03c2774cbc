//! Simulation step clock.
//!
//! Memory only ever *reads* the clock; advancing it is the owner's job.

use std::sync::atomic::{AtomicI64, Ordering};

use simmem_store::Step;

/// Provider of the current simulation step.
pub trait StepClock: Send + Sync {
    fn current_step(&self) -> Step;
}

impl<F> StepClock for F
where
    F: Fn() -> Step + Send + Sync,
{
    fn current_step(&self) -> Step {
        self()
    }
}

/// Clock advanced by hand, for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    step: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(step: Step) -> Self {
        Self {
            step: AtomicI64::new(step),
        }
    }

    /// Advance by one step and return the new step.
    pub fn tick(&self) -> Step {
        self.advance(1)
    }

    /// Advance by `steps` and return the new step.
    pub fn advance(&self, steps: Step) -> Step {
        self.step.fetch_add(steps, Ordering::Relaxed) + steps
    }

    pub fn set(&self, step: Step) {
        self.step.store(step, Ordering::Relaxed);
    }
}

impl StepClock for ManualClock {
    fn current_step(&self) -> Step {
        self.step.load(Ordering::Relaxed)
    }
}
