#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use brrtdispatch::worker_pool::{WorkerPool, WorkerPoolConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

mod tracing_util;
use tracing_util::TestTracing;

#[test]
fn test_parallelism_is_bounded_by_worker_count() {
    let _tracing = TestTracing::init();
    let pool = WorkerPool::new(WorkerPoolConfig::new(3)).unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..12 {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        assert!(pool.submit(move || {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            active.fetch_sub(1, Ordering::SeqCst);
        }));
    }

    let report = pool.shutdown(Duration::from_secs(10));
    assert!(report.is_clean());
    assert_eq!(report.joined, 3);
    assert!(peak.load(Ordering::SeqCst) <= 3);

    let metrics = pool.metrics();
    assert_eq!(metrics.submitted, 12);
    assert_eq!(metrics.completed, 12);
    assert_eq!(metrics.queue_depth, 0);
    assert_eq!(metrics.busy, 0);
}

#[test]
fn test_queued_jobs_run_in_submission_order() {
    let pool = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..10 {
        let order = Arc::clone(&order);
        pool.submit(move || order.lock().push(i));
    }
    assert!(pool.shutdown(Duration::from_secs(5)).is_clean());
    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_shutdown_drains_queue_within_grace() {
    let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..6 {
        let done = Arc::clone(&done);
        pool.submit(move || {
            thread::sleep(Duration::from_millis(10));
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    let report = pool.shutdown(Duration::from_secs(5));
    assert!(report.is_clean());
    assert_eq!(done.load(Ordering::SeqCst), 6);
    assert!(pool.is_shutting_down());
}

#[test]
fn test_grace_expiry_abandons_running_and_drops_queued() {
    let pool = WorkerPool::new(WorkerPoolConfig::new(1)).unwrap();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    pool.submit(move || {
        started_tx.send(()).unwrap();
        release_rx.recv_timeout(Duration::from_secs(5)).ok();
    });
    let ran = Arc::new(AtomicUsize::new(0));
    let queued = Arc::clone(&ran);
    pool.submit(move || {
        queued.fetch_add(1, Ordering::SeqCst);
    });
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let report = pool.shutdown(Duration::from_millis(50));
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.dropped_jobs, 1);
    assert!(!report.is_clean());

    release_tx.send(()).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_panicking_jobs_do_not_shrink_the_pool() {
    let pool = WorkerPool::new(WorkerPoolConfig::new(2)).unwrap();
    for i in 0..4 {
        pool.submit(move || panic!("job {i} failed"));
    }
    let (tx, rx) = mpsc::channel();
    for _ in 0..4 {
        let tx = tx.clone();
        pool.submit(move || tx.send(thread::current().name().map(str::to_string)).unwrap());
    }
    for _ in 0..4 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    let report = pool.shutdown(Duration::from_secs(5));
    assert_eq!(report.joined, 2);
    assert_eq!(pool.metrics().panicked, 4);
}

#[test]
fn test_custom_thread_name_and_stack_size() {
    let pool = WorkerPool::new(WorkerPoolConfig {
        num_workers: 1,
        thread_name: "conn".to_string(),
        stack_size: Some(256 * 1024),
    })
    .unwrap();
    let (tx, rx) = mpsc::channel();
    pool.submit(move || tx.send(thread::current().name().map(str::to_string)).unwrap());
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(name, "conn-0");
    pool.shutdown(Duration::from_secs(5));
}

#[test]
fn test_zero_workers_is_clamped_to_one() {
    let pool = WorkerPool::new(WorkerPoolConfig::new(0)).unwrap();
    assert_eq!(pool.num_workers(), 1);
    let (tx, rx) = mpsc::channel();
    pool.submit(move || tx.send(()).unwrap());
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    pool.shutdown(Duration::from_secs(5));
}
