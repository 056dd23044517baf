//! Tests for utility functions

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use prometheus_script_engine::collections::Monitor;
use prometheus_script_engine::util::clock;
use prometheus_script_engine::util::interrupt::{self, InterruptHandle, WaitOutcome};

#[test]
fn test_clock_is_monotonic() {
    let a = clock::monotonic_nanos();
    let b = clock::monotonic_nanos();
    assert!(b >= a);
    assert!(clock::nanos_after(Duration::from_millis(5)) > b);
}

#[test]
fn test_interrupt_scope_binds_and_restores() {
    assert!(interrupt::current().is_none());
    let handle = InterruptHandle::new();
    {
        let _scope = handle.enter();
        assert!(interrupt::current().is_some_and(|h| h.same_as(&handle)));
        handle.interrupt();
        assert!(interrupt::is_interrupted());
        assert!(interrupt::interrupted());
        assert!(!interrupt::is_interrupted());
    }
    assert!(interrupt::current().is_none());
}

#[test]
fn test_interrupt_wakes_blocked_wait() {
    let monitor = Arc::new(Monitor::new());
    let handle = InterruptHandle::new();

    let waiter = {
        let monitor = Arc::clone(&monitor);
        let handle = handle.clone();
        thread::spawn(move || {
            let _scope = handle.enter();
            interrupt::wait_until(&monitor, || false)
        })
    };

    thread::sleep(Duration::from_millis(20));
    handle.interrupt();
    assert_eq!(waiter.join().unwrap(), WaitOutcome::Interrupted);
}

#[test]
fn test_wait_until_ready_without_handle() {
    let monitor = Arc::new(Monitor::new());
    assert_eq!(interrupt::wait_until(&monitor, || true), WaitOutcome::Ready);
}
