//! # Worker Pool Module
//!
//! Fixed-size pool of OS threads that process accepted connections.
//!
//! ## Features
//!
//! - **Bounded parallelism**: exactly `num_workers` threads, spawned at startup
//! - **Queueing backpressure**: submissions beyond capacity wait in a FIFO queue;
//!   no extra threads are ever spawned
//! - **Panic containment**: every job runs under `catch_unwind`, so a panicking
//!   job never takes its worker thread down
//! - **Metrics**: submitted, started, completed and panicked counts, queue
//!   depth and busy workers
//! - **Graceful shutdown**: queued and in-flight jobs get a bounded grace
//!   period, after which remaining workers are abandoned

use crate::error::ServerError;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Interval at which shutdown checks whether workers have exited
const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

/// Configuration for a worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Thread name prefix; workers are named `<prefix>-<id>`
    pub thread_name: String,
    /// Stack size for worker threads (platform default when `None`)
    pub stack_size: Option<usize>,
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 8,
            thread_name: "brrtd-worker".to_string(),
            stack_size: None,
        }
    }
}

/// Live counters for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    submitted: AtomicU64,
    rejected: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    queue_depth: AtomicUsize,
    busy: AtomicUsize,
}

impl WorkerPoolMetrics {
    fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    fn record_start(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
        self.started.fetch_add(1, Ordering::Relaxed);
        self.busy.fetch_add(1, Ordering::Relaxed);
    }

    fn record_finish(&self, panicked: bool) {
        if panicked {
            self.panicked.fetch_add(1, Ordering::Relaxed);
        }
        self.busy.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`WorkerPoolMetrics`] at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolMetricsSnapshot {
    /// Jobs accepted by `submit`
    pub submitted: u64,
    /// Jobs refused because the pool was shutting down
    pub rejected: u64,
    /// Jobs picked up by a worker
    pub started: u64,
    /// Jobs that ran to completion (including those that panicked)
    pub completed: u64,
    /// Jobs that panicked
    pub panicked: u64,
    /// Jobs waiting for a worker
    pub queue_depth: usize,
    /// Workers currently running a job
    pub busy: usize,
}

/// Outcome of [`WorkerPool::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited within the grace period
    pub joined: usize,
    /// Workers still running a job when the grace period expired
    pub abandoned: usize,
    /// Queued jobs discarded without running
    pub dropped_jobs: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.abandoned == 0 && self.dropped_jobs == 0
    }
}

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    shutting_down: AtomicBool,
    metrics: WorkerPoolMetrics,
}

/// Fixed pool of worker threads fed from a shared FIFO queue
pub struct WorkerPool {
    config: WorkerPoolConfig,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `config.num_workers` threads
    ///
    /// # Errors
    ///
    /// [`ServerError::Spawn`] if a thread cannot be created; threads that were
    /// already started are told to exit.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, ServerError> {
        let num_workers = config.num_workers.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            metrics: WorkerPoolMetrics::default(),
        });

        info!(
            num_workers,
            thread_name = %config.thread_name,
            stack_size = ?config.stack_size,
            "Creating worker pool"
        );

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let mut builder =
                std::thread::Builder::new().name(format!("{}-{worker_id}", config.thread_name));
            if let Some(size) = config.stack_size {
                builder = builder.stack_size(size);
            }
            let worker_shared = Arc::clone(&shared);
            match builder.spawn(move || worker_loop(worker_id, &worker_shared)) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to spawn worker thread");
                    shared.shutting_down.store(true, Ordering::SeqCst);
                    shared.condvar.notify_all();
                    return Err(ServerError::Spawn(e));
                }
            }
        }

        Ok(Self {
            config: WorkerPoolConfig {
                num_workers,
                ..config
            },
            shared,
            workers: Mutex::new(workers),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Queue `job` for the next free worker
    ///
    /// Returns `false` (dropping the job) once shutdown has begun.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            self.shared.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        {
            let mut queue = self.shared.queue.lock();
            queue.push_back(Box::new(job));
            self.shared.metrics.record_submit();
        }
        self.shared.condvar.notify_one();
        true
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and wait up to `grace` for the workers to drain
    ///
    /// Workers keep taking queued jobs until the queue is empty, then exit.
    /// When `grace` expires, jobs still queued are dropped and workers still
    /// running are detached.
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.condvar.notify_all();

        let deadline = Instant::now() + grace;
        let mut handles = std::mem::take(&mut *self.workers.lock());
        let mut joined = 0;
        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                handles.into_iter().partition(JoinHandle::is_finished);
            for handle in finished {
                if handle.join().is_err() {
                    warn!("Worker thread exited with a panic");
                }
                joined += 1;
            }
            handles = running;
            if handles.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(SHUTDOWN_POLL);
        }

        let dropped_jobs = {
            let mut queue = self.shared.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped_jobs > 0 {
            self.shared
                .metrics
                .queue_depth
                .fetch_sub(dropped_jobs, Ordering::Relaxed);
        }

        let report = ShutdownReport {
            joined,
            abandoned: handles.len(),
            dropped_jobs,
        };
        if report.is_clean() {
            info!(joined, "Worker pool shut down");
        } else {
            warn!(
                joined,
                abandoned = report.abandoned,
                dropped_jobs,
                grace_ms = grace.as_millis() as u64,
                "Worker pool grace period expired"
            );
        }
        report
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.condvar.notify_all();
    }
}

fn worker_loop(worker_id: usize, shared: &Shared) {
    debug!(worker_id, "Worker thread started");
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if shared.shutting_down.load(Ordering::SeqCst) {
                    break None;
                }
                shared.condvar.wait(&mut queue);
            }
        };
        let Some(job) = job else {
            break;
        };

        shared.metrics.record_start();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
        if let Err(panic) = &result {
            error!(
                worker_id,
                panic_message = %panic_message(&**panic),
                "Job panicked - worker recovered"
            );
        }
        shared.metrics.record_finish(result.is_err());
    }
    debug!(worker_id, "Worker thread exiting");
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
