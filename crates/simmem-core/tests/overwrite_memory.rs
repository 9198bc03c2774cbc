//! One-version-per-key memory.

use std::sync::{Arc, Mutex};

use simmem_core::{
    Admission, ManualClock, MemoryConfig, MemoryError, MemoryEvent, MemoryListener,
    OverwriteMemory, PolicyKind, Property, Retention,
};

type Seen = Arc<Mutex<Vec<(MemoryEvent, String, i64)>>>;

fn memory(clock: &Arc<ManualClock>, config: MemoryConfig) -> (OverwriteMemory, Seen) {
    let mut m = OverwriteMemory::overwrite(config, clock.clone()).expect("build memory");
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn MemoryListener> = Arc::new(move |event: MemoryEvent, p: &Property| {
        sink.lock()
            .unwrap()
            .push((event, p.key().to_string(), p.timestamp()));
    });
    for event in MemoryEvent::ALL {
        m.add_observer(event, Arc::clone(&listener));
    }
    (m, seen)
}

#[test]
fn test_keeps_one_version_per_key() {
    let clock = Arc::new(ManualClock::new());
    let (mut m, _) = memory(&clock, MemoryConfig::new("ow"));
    m.memorize(Property::new("k", 1, 1)).unwrap();
    m.memorize(Property::new("k", 4, 2)).unwrap();

    assert_eq!(m.len(), 1);
    assert!(m.contains_at("k", 4));
    assert!(!m.contains_at("k", 1));
    assert_eq!(m.recall_history("k").unwrap().len(), 1);
}

#[test]
fn test_retention_is_not_implemented() {
    let clock = Arc::new(ManualClock::new());
    let (mut m, _) = memory(&clock, MemoryConfig::new("ow"));
    let p = Property::new("k", 0, 1);
    m.memorize(p.clone()).unwrap();

    assert!(m.get_default_retention_time().unwrap_err().is_not_implemented());
    assert!(m
        .set_default_retention_time(Retention::Steps(1))
        .unwrap_err()
        .is_not_implemented());
    assert!(m.get_retention_time(&p).unwrap_err().is_not_implemented());
    assert!(m.time_of_death(&p).unwrap_err().is_not_implemented());
    assert!(matches!(
        m.memorize_for(Property::new("x", 0, 1), Retention::Steps(3)),
        Err(MemoryError::NotImplemented { .. })
    ));
    assert!(!m.contains_key("x"));

    // Unlimited retention is what this memory does anyway.
    assert!(m
        .memorize_for(Property::new("y", 0, 1), Retention::Unlimited)
        .is_ok());
}

#[test]
fn test_limited_default_retention_rejected_at_construction() {
    let clock = Arc::new(ManualClock::new());
    let config = MemoryConfig::new("ow").with_default_retention(5);
    let err = OverwriteMemory::overwrite(config, clock.clone()).unwrap_err();
    assert!(err.is_not_implemented());
}

#[test]
fn test_refresh_ignores_retention() {
    let clock = Arc::new(ManualClock::new());
    let (mut m, _) = memory(&clock, MemoryConfig::new("ow"));
    let p = Property::new("k", 0, 1);
    m.memorize(p.clone()).unwrap();

    let fresh = m.refresh_for(&p, Retention::Steps(1)).unwrap();
    clock.advance(10);
    assert!(m.contains(&fresh));
}

#[test]
fn test_relays_storage_events() {
    let clock = Arc::new(ManualClock::new());
    let (mut m, seen) = memory(&clock, MemoryConfig::new("ow"));

    m.memorize(Property::new("k", 1, 1)).unwrap();
    m.memorize(Property::new("k", 2, 2)).unwrap();
    m.recall("k").unwrap();
    m.forget_all("k").unwrap();

    let k = |event: MemoryEvent, step: i64| (event, "k".to_string(), step);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            k(MemoryEvent::Stored, 1),
            k(MemoryEvent::Memorized, 1),
            k(MemoryEvent::Overwritten, 1),
            k(MemoryEvent::Stored, 2),
            k(MemoryEvent::Memorized, 2),
            k(MemoryEvent::Fetched, 2),
            k(MemoryEvent::Recalled, 2),
            k(MemoryEvent::Removed, 2),
            k(MemoryEvent::Forgotten, 2),
        ]
    );
}

#[test]
fn test_older_write_restores() {
    let clock = Arc::new(ManualClock::new());
    let (mut m, seen) = memory(&clock, MemoryConfig::new("ow"));

    m.memorize(Property::new("k", 5, "new")).unwrap();
    let outcome = m.memorize(Property::new("k", 3, "old")).unwrap();

    assert!(matches!(outcome.admission, Admission::Restored(ref p) if p.timestamp() == 5));
    assert_eq!(m.recall("k").unwrap().timestamp(), 3);
    assert!(seen
        .lock()
        .unwrap()
        .contains(&(MemoryEvent::Restored, "k".to_string(), 5)));
}

#[test]
fn test_eviction_relays_auto_removed() {
    let clock = Arc::new(ManualClock::new());
    let config = MemoryConfig::new("ow")
        .with_capacity(1)
        .with_policy(PolicyKind::Fifo);
    let (mut m, seen) = memory(&clock, config);

    m.memorize(Property::new("a", 0, 1)).unwrap();
    m.memorize(Property::new("a", 1, 2)).unwrap();
    assert_eq!(m.stats().evicted(), 0);

    m.memorize(Property::new("b", 1, 3)).unwrap();
    let seen = seen.lock().unwrap();
    let tail = seen[seen.len() - 4..].to_vec();
    assert_eq!(
        tail,
        vec![
            (MemoryEvent::AutoRemoved, "a".to_string(), 1),
            (MemoryEvent::Evicted, "a".to_string(), 1),
            (MemoryEvent::Stored, "b".to_string(), 1),
            (MemoryEvent::Memorized, "b".to_string(), 1),
        ]
    );
}

#[test]
fn test_versioned_memory_does_not_relay() {
    let clock = Arc::new(ManualClock::new());
    let mut m = simmem_core::Memory::versioned(MemoryConfig::new("v"), clock.clone()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn MemoryListener> =
        Arc::new(move |event: MemoryEvent, _: &Property| sink.lock().unwrap().push(event));
    for event in MemoryEvent::ALL {
        m.add_observer(event, Arc::clone(&listener));
    }

    m.memorize(Property::new("k", 1, 1)).unwrap();
    m.recall("k").unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![MemoryEvent::Memorized, MemoryEvent::Recalled]
    );
}
