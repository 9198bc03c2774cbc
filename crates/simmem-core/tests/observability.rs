//! Observability tests for memory lifecycle tracing.
//!
//! These tests drive the structured emitters and a memory's sweep, eviction
//! and rejection paths under a captured subscriber.

use std::sync::Arc;

use simmem_core::{
    emit_capacity_changed, emit_evicted, emit_expired, emit_memorized, emit_rejected,
    emit_sweep_error, Capacity, ManualClock, Memory, MemoryConfig, MemorySpan, PolicyKind,
    Property, Retention,
};
use tracing_test::traced_test;

/// Test: emit_memorized creates a debug-level event
#[traced_test]
#[test]
fn test_emit_memorized_with_and_without_time_of_death() {
    let p = Property::new("berries", 3, 7);
    emit_memorized("agent-1", &p, Some(6));
    emit_memorized("agent-1", &p, None);
}

/// Test: emit_expired and emit_evicted create debug-level events
#[traced_test]
#[test]
fn test_emit_removal_events() {
    let p = Property::new("berries", 3, 7);
    emit_expired("agent-1", &p, 6);
    emit_evicted("agent-1", &p, "fifo");
}

/// Test: emit_rejected and emit_capacity_changed create info-level events
#[traced_test]
#[test]
fn test_emit_rejected_and_capacity_changed() {
    let p = Property::new("berries", 3, 7);
    emit_rejected("agent-1", &p, "nino");
    emit_capacity_changed("agent-1", Capacity::Unlimited, Capacity::Bounded(4), 2);
}

/// Test: emit_sweep_error creates a warn-level event
#[traced_test]
#[test]
fn test_emit_sweep_error_logs_warning() {
    let p = Property::new("berries", 3, 7);
    emit_sweep_error("agent-1", &p, &"instance already removed");
}

/// Test: MemorySpan::enter creates an entered span without panicking
#[traced_test]
#[test]
fn test_memory_span_enter_creates_span() {
    let span = MemorySpan::enter("agent-1");
    tracing::info!("inside memory span");
    drop(span);
    assert!(logs_contain("inside memory span"));
}

/// Test: a full lifecycle logs through sweep, eviction and rejection
#[traced_test]
#[test]
fn test_memory_lifecycle_under_subscriber() {
    let clock = Arc::new(ManualClock::new());
    let config = MemoryConfig::new("traced")
        .with_capacity(2)
        .with_policy(PolicyKind::Fifo);
    let mut m = Memory::versioned(config, clock.clone()).expect("build memory");

    m.memorize_for(Property::new("a", 0, 1), Retention::Steps(1))
        .unwrap();
    m.memorize(Property::new("b", 0, 2)).unwrap();
    m.memorize(Property::new("c", 0, 3)).unwrap();
    clock.tick();
    assert_eq!(m.len(), 2);

    m.set_capacity_manager(PolicyKind::Nino.into_manager());
    assert!(m.memorize(Property::new("d", 1, 4)).unwrap().is_rejected());

    m.stats().flush(m.name());
    let stats = m.stats().snapshot();
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.rejected, 1);
}
