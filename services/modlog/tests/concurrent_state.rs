//! ConcurrentStateStore under concurrent writers and readers

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use modlog::poll::ConcurrentStateStore;

fn hammer(threads: usize, per_thread: usize, max_points: usize) -> Arc<ConcurrentStateStore> {
    let store = Arc::new(ConcurrentStateStore::new(max_points));
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let name = format!("reg{}", t);
                for i in 0..per_thread {
                    store.update(&name, i as f64);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    store
}

#[test]
fn test_each_register_gets_exactly_m_entries() {
    let store = hammer(6, 400, 1000);
    for t in 0..6 {
        let values: Vec<f64> = store.get(&format!("reg{}", t)).iter().map(|s| s.value).collect();
        assert_eq!(values.len(), 400);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_most_recent_kept_when_over_cap() {
    let store = hammer(4, 300, 50);
    for t in 0..4 {
        let values: Vec<f64> = store.get(&format!("reg{}", t)).iter().map(|s| s.value).collect();
        let expected: Vec<f64> = (250..300).map(|i| i as f64).collect();
        assert_eq!(values, expected);
    }
}

#[test]
fn test_readers_never_see_partial_lists() {
    let store = Arc::new(ConcurrentStateStore::new(10));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            for i in 0..5000 {
                store.update("pv", i as f64);
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let values: Vec<f64> = store.get("pv").iter().map(|s| s.value).collect();
                    assert!(values.len() <= 10);
                    assert!(values.windows(2).all(|w| w[1] == w[0] + 1.0));
                    if let Some(snapshot) = store.snapshot().get("pv") {
                        assert!(snapshot.len() <= 10);
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.latest("pv").unwrap().value, 4999.0);
}

#[test]
fn test_set_max_points_while_writing() {
    let store = Arc::new(ConcurrentStateStore::new(100));
    let writer = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            for i in 0..2000 {
                store.update("a", i as f64);
            }
        })
    };
    store.set_max_points(5).unwrap();
    writer.join().unwrap();

    assert_eq!(store.len("a"), 5);
    assert_eq!(store.get("a")[4].value, 1999.0);
}
