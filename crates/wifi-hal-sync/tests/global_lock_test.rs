//! Integration tests for the process-wide lock
//!
//! Covers reentrancy, mutual exclusion between threads, and release on
//! every exit path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use wifi_hal_sync::{
    LockDiagnosticsConfig, LockState, ProcessLock, acquire_global_lock, global_lock,
    with_global_lock,
};

const WAIT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(50);

fn isolated_lock(name: &'static str) -> Arc<ProcessLock> {
    let diagnostics = LockDiagnosticsConfig::default();
    Arc::new(ProcessLock::with_diagnostics(name, diagnostics))
}

/// Spawn a thread that acquires `lock` and reports once it got in.
fn spawn_contender(lock: Arc<ProcessLock>) -> (mpsc::Receiver<usize>, thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let guard = lock.acquire();
        tx.send(guard.depth()).unwrap();
    });
    (rx, handle)
}

// ============================================================================
// Reentrancy
// ============================================================================

#[test]
fn test_global_lock_reentrant_on_same_thread() {
    let g1 = acquire_global_lock();
    let g2 = acquire_global_lock();
    let g3 = acquire_global_lock();

    assert_eq!(g1.depth(), 1);
    assert_eq!(g2.depth(), 2);
    assert_eq!(g3.depth(), 3);
    assert_eq!(global_lock().current_thread_depth(), 3);

    drop(g3);
    drop(g2);
    assert_eq!(global_lock().current_thread_depth(), 1);
    drop(g1);
    assert_eq!(global_lock().current_thread_depth(), 0);
}

#[test]
fn test_nested_operation_does_not_block() {
    fn set_country_code(calls: &AtomicUsize) {
        let _lock = acquire_global_lock();
        calls.fetch_add(1, Ordering::SeqCst);
    }

    fn configure_chip(calls: &AtomicUsize) {
        let _lock = acquire_global_lock();
        calls.fetch_add(1, Ordering::SeqCst);
        set_country_code(calls);
    }

    let calls = AtomicUsize::new(0);
    configure_chip(&calls);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_lock_free_only_after_both_scopes_exit() {
    let lock = isolated_lock("nested-scopes");

    let outer = lock.acquire();
    {
        let inner = lock.acquire();
        assert_eq!(inner.depth(), 2);
    }
    assert_eq!(lock.current_thread_depth(), 1);

    let (acquired_rx, handle) = spawn_contender(Arc::clone(&lock));
    thread::sleep(SETTLE);
    assert_eq!(acquired_rx.try_recv(), Err(TryRecvError::Empty));

    drop(outer);
    assert_eq!(acquired_rx.recv_timeout(WAIT), Ok(1));
    handle.join().unwrap();
    assert_eq!(lock.state(), LockState::Free);
}

proptest! {
    #[test]
    fn prop_matching_releases_return_to_free(depth in 1usize..64) {
        let lock = ProcessLock::with_diagnostics("prop-depth", LockDiagnosticsConfig::default());
        let mut guards = Vec::with_capacity(depth);

        for expected in 1..=depth {
            let guard = lock.acquire();
            prop_assert_eq!(guard.depth(), expected);
            guards.push(guard);
        }
        prop_assert_eq!(lock.current_thread_depth(), depth);

        while let Some(guard) = guards.pop() {
            let released = guard.depth();
            drop(guard);
            prop_assert_eq!(lock.current_thread_depth(), released - 1);
        }
        prop_assert_eq!(lock.state(), LockState::Free);

        let stats = lock.stats();
        prop_assert_eq!(stats.acquisitions, depth as u64);
        prop_assert_eq!(stats.reentrant_acquisitions, depth as u64 - 1);
    }

    #[test]
    fn prop_call_tree_depth_tracks_nesting(shape in prop::collection::vec(0usize..4, 1..16)) {
        // Each entry is how many nested calls one top-level operation makes
        let lock = ProcessLock::with_diagnostics("prop-tree", LockDiagnosticsConfig::default());

        for nested in shape {
            let (outer_depth, inner_depths) = lock.with(|| {
                let inner_depths: Vec<usize> = (0..nested)
                    .map(|_| lock.with(|| lock.current_thread_depth()))
                    .collect();
                (lock.current_thread_depth(), inner_depths)
            });
            prop_assert_eq!(outer_depth, 1);
            prop_assert_eq!(inner_depths, vec![2; nested]);
            prop_assert!(lock.state().is_free());
        }
    }
}

// ============================================================================
// Mutual exclusion
// ============================================================================

#[test]
fn test_threads_never_overlap_in_global_section() {
    const THREADS: usize = 8;
    const ITERATIONS: usize = 200;

    let inside = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let inside = Arc::clone(&inside);
            let violations = Arc::clone(&violations);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..ITERATIONS {
                    with_global_lock(|| {
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        // Re-entry from inside the section must not count as a second occupant
                        with_global_lock(|| {
                            if i % 7 == 0 {
                                thread::yield_now();
                            }
                        });
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_second_thread_blocks_until_full_release() {
    let lock = isolated_lock("long-section");
    let (started_tx, started_rx) = mpsc::channel();
    let (finish_tx, finish_rx) = mpsc::channel::<()>();

    let holder = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let _outer = lock.acquire();
            let _inner = lock.acquire();
            started_tx.send(()).unwrap();
            finish_rx.recv().unwrap();
        })
    };
    started_rx.recv_timeout(WAIT).unwrap();

    let (acquired_rx, contender) = spawn_contender(Arc::clone(&lock));
    thread::sleep(SETTLE);
    assert_eq!(acquired_rx.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(lock.state().depth(), 2);

    finish_tx.send(()).unwrap();
    assert_eq!(acquired_rx.recv_timeout(WAIT), Ok(1));

    holder.join().unwrap();
    contender.join().unwrap();
    assert!(lock.stats().contended_acquisitions >= 1);
}

// ============================================================================
// Release on every exit path
// ============================================================================

#[derive(Debug, PartialEq)]
struct HalError(&'static str);

fn failing_operation(lock: &ProcessLock) -> Result<(), HalError> {
    let _lock = lock.acquire();
    check_chip_ready(lock)?;
    unreachable!("chip check always fails in this test");
}

fn check_chip_ready(lock: &ProcessLock) -> Result<(), HalError> {
    let _lock = lock.acquire();
    Err(HalError("chip not ready"))
}

#[test]
fn test_error_return_releases_lock() {
    let lock = isolated_lock("early-return");

    assert_eq!(failing_operation(&lock), Err(HalError("chip not ready")));
    assert_eq!(lock.state(), LockState::Free);

    let (acquired_rx, handle) = spawn_contender(Arc::clone(&lock));
    assert_eq!(acquired_rx.recv_timeout(WAIT), Ok(1));
    handle.join().unwrap();
}

fn driver_callback_failed() {
    panic!("driver callback failed");
}

#[test]
fn test_panic_releases_lock() {
    let lock = isolated_lock("panic-exit");

    let panicking = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            lock.with(|| {
                let _nested = lock.acquire();
                driver_callback_failed();
            })
        })
    };
    assert!(panicking.join().is_err());
    assert_eq!(lock.state(), LockState::Free);

    let (acquired_rx, handle) = spawn_contender(Arc::clone(&lock));
    assert_eq!(acquired_rx.recv_timeout(WAIT), Ok(1));
    handle.join().unwrap();
}

#[test]
fn test_global_lock_usable_after_panic_in_section() {
    let result = thread::spawn(|| {
        with_global_lock(driver_callback_failed);
    })
    .join();
    assert!(result.is_err());

    let guard = acquire_global_lock();
    assert_eq!(guard.depth(), 1);
}
