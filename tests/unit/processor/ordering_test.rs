//! Per-key ordering guarantees across a concurrent unit pool

use std::sync::{Arc, Mutex};
use std::time::Duration;

use keylane::{AsyncShutdown, PartitionProcessor, ProcessorConfig};

use crate::unit::test_utils::{
    init_logger, keyed_task, keyless_task, recording_stages, scope_with, wait_until,
};

#[test]
fn test_same_key_never_splits_across_units() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig {
        partition_concurrency: 3,
        ..Default::default()
    });
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut processor = PartitionProcessor::new(scope, recording_stages(&log)).unwrap();

    // The A, B, A, C, B scenario: both A tasks must land on one unit and
    // keep their relative order; likewise the B tasks.
    for (offset, key) in [(0, "A"), (1, "B"), (2, "A"), (3, "C"), (4, "B")] {
        processor.add_task(keyed_task(key, offset)).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().unwrap().len() == 5
    }));
    processor.shutdown();

    let events = log.lock().unwrap();
    let unit_for = |key: &str| -> Vec<usize> {
        events
            .iter()
            .filter(|event| event.key.as_deref() == Some(key))
            .map(|event| event.subpartition)
            .collect()
    };

    let a_units = unit_for("A");
    let b_units = unit_for("B");
    assert_eq!(a_units.len(), 2);
    assert_eq!(a_units[0], a_units[1], "key A split across units");
    assert_eq!(b_units.len(), 2);
    assert_eq!(b_units[0], b_units[1], "key B split across units");

    let offsets_for = |key: &str| -> Vec<i64> {
        events
            .iter()
            .filter(|event| event.key.as_deref() == Some(key))
            .map(|event| event.offset)
            .collect()
    };
    assert_eq!(offsets_for("A"), vec![0, 2], "key A processed out of order");
    assert_eq!(offsets_for("B"), vec![1, 4], "key B processed out of order");
}

#[test]
fn test_per_key_order_holds_under_load() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig {
        partition_concurrency: 4,
        ..Default::default()
    });
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut processor = PartitionProcessor::new(scope, recording_stages(&log)).unwrap();

    // Interleave 20 keys, 50 tasks each, submitted in offset order.
    let total = 1_000;
    for offset in 0..total {
        let key = format!("key-{}", offset % 20);
        processor.add_task(keyed_task(&key, offset)).unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || {
        log.lock().unwrap().len() == total as usize
    }));
    processor.shutdown();

    let events = log.lock().unwrap();
    for key_id in 0..20 {
        let key = format!("key-{}", key_id);
        let observed: Vec<i64> = events
            .iter()
            .filter(|event| event.key.as_deref() == Some(key.as_str()))
            .map(|event| event.offset)
            .collect();
        let mut expected = observed.clone();
        expected.sort_unstable();
        assert_eq!(observed, expected, "key {} processed out of order", key);

        let units: std::collections::HashSet<usize> = events
            .iter()
            .filter(|event| event.key.as_deref() == Some(key.as_str()))
            .map(|event| event.subpartition)
            .collect();
        assert_eq!(units.len(), 1, "key {} visited multiple units", key);
    }
}

#[test]
fn test_keyless_tasks_spread_across_units() {
    init_logger();
    let (_store, scope) = scope_with(ProcessorConfig {
        partition_concurrency: 4,
        ..Default::default()
    });
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut processor = PartitionProcessor::new(scope, recording_stages(&log)).unwrap();

    for offset in 0..100 {
        processor.add_task(keyless_task(offset)).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().unwrap().len() == 100
    }));
    processor.shutdown();

    let events = log.lock().unwrap();
    let units: std::collections::HashSet<usize> =
        events.iter().map(|event| event.subpartition).collect();
    assert_eq!(units.len(), 4, "keyless tasks did not use every unit");
}
