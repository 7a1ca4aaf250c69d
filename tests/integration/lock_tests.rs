//! Lock protocol under real contention: threads racing on shared keys.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use inputd::config::LockPolicy;
use inputd::lock::{FileLocks, LocalLocks, LockBackend, ResourceLock};

fn contend(backend: Arc<dyn LockBackend>) {
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let policy = LockPolicy {
        max_attempts: 2_000,
        retry_interval_ms: 1,
    };

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let backend = Arc::clone(&backend);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                let mut lock = ResourceLock::new("multiplexer_0x70", backend, policy);
                for _ in 0..20 {
                    assert!(lock.acquire());
                    if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::sleep(Duration::from_micros(200));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    lock.release();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn local_locks_never_overlap() {
    contend(Arc::new(LocalLocks::new()));
}

#[cfg(unix)]
#[test]
fn file_locks_never_overlap() {
    let dir = tempfile::tempdir().expect("tempdir");
    contend(Arc::new(FileLocks::new(dir.path())));
}

#[cfg(unix)]
#[test]
fn different_key_is_not_blocked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend: Arc<dyn LockBackend> = Arc::new(FileLocks::new(dir.path()));
    let policy = LockPolicy {
        max_attempts: 1,
        retry_interval_ms: 1_000,
    };
    let mut mux = ResourceLock::new("multiplexer_0x70", Arc::clone(&backend), policy);
    let mut adc = ResourceLock::new("adc_bus1_0x48", Arc::clone(&backend), policy);
    assert!(mux.acquire());

    let started = Instant::now();
    assert!(adc.acquire());
    assert!(started.elapsed() < Duration::from_millis(500));

    let mut rival = ResourceLock::new("multiplexer_0x70", backend, policy);
    assert!(!rival.acquire());
}

#[test]
fn timeout_is_bounded_by_the_retry_budget() {
    let locks = LocalLocks::new();
    let _held = locks.try_lock("adc_bus1_0x48").unwrap();
    let policy = LockPolicy {
        max_attempts: 10,
        retry_interval_ms: 10,
    };
    let mut lock = ResourceLock::new("adc_bus1_0x48", Arc::new(locks), policy);
    let started = Instant::now();
    assert!(!lock.acquire());
    let elapsed = started.elapsed();
    assert!(elapsed >= policy.worst_case_wait());
    assert!(elapsed < policy.worst_case_wait() + Duration::from_secs(1));
}
