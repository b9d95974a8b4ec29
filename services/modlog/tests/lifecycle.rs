//! LIFO teardown with failing and panicking cleanups

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;

use parking_lot::Mutex;

use modlog::runtime::LifecycleManager;
use modlog::transport::{shared, MockTransport, ModbusTransport};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn track(manager: &mut LifecycleManager, log: &Log, name: &'static str) {
    let log = Arc::clone(log);
    manager.register(name, name, move |res| {
        log.lock().push(res);
        Ok(())
    });
}

#[test]
fn test_b_cleaned_before_a() {
    let log: Log = Arc::default();
    let mut manager = LifecycleManager::new();
    track(&mut manager, &log, "A");
    track(&mut manager, &log, "B");

    let report = manager.cleanup();
    assert!(report.is_clean());
    assert_eq!(*log.lock(), vec!["B", "A"]);
}

#[test]
fn test_failing_cleanup_does_not_stop_others() {
    let log: Log = Arc::default();
    let mut manager = LifecycleManager::new();
    track(&mut manager, &log, "A");
    manager.register("B", (), |()| Err(anyhow::anyhow!("device busy")));

    let report = manager.cleanup();
    assert_eq!(*log.lock(), vec!["A"]);
    assert_eq!(report.succeeded, vec!["A"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].resource, "B");
    assert!(report.failed[0].message.contains("device busy"));
}

#[test]
fn test_panicking_cleanup_does_not_stop_others() {
    let log: Log = Arc::default();
    let mut manager = LifecycleManager::new();
    track(&mut manager, &log, "A");
    manager.defer("B", || panic!("cleanup exploded"));
    track(&mut manager, &log, "C");

    let report = manager.cleanup();
    assert_eq!(*log.lock(), vec!["C", "A"]);
    assert_eq!(report.succeeded, vec!["C", "A"]);
    assert_eq!(report.failed[0].resource, "B");
    assert!(report.failed[0].message.contains("cleanup exploded"));
}

#[test]
fn test_scoped_cleans_on_exit() {
    let device = MockTransport::new();
    let transport = shared(device.clone());

    let (value, report) = LifecycleManager::scoped(|manager| {
        manager.register("transport", Arc::clone(&transport), |t| {
            t.lock().close();
            Ok(())
        });
        transport.lock().is_connected()
    });

    assert!(value);
    assert!(report.is_clean());
    assert!(!device.is_connected());
}
