// ABOUTME: Fixed-size thread pool backend fed from a lock-free work queue
// ABOUTME: Workers survive panicking units, logging them instead of dying

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

use super::{Backend, BackendError, Work};
use crate::config::PoolConfig;
use crate::engine::TaskPanic;

/// Runs work on a fixed set of named worker threads.
///
/// Units are taken from a shared queue in the order they were pushed, but
/// with more than one worker nothing is promised about completion order.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    thread_name: String,
    workers: usize,
    queue: SegQueue<Work>,
    /// Written under `mutex` so workers never miss it between check and wait.
    shutdown: AtomicBool,
    busy: AtomicUsize,
    mutex: Mutex<()>,
    condvar: Condvar,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(workers: usize, thread_name: impl Into<String>) -> Result<Self, BackendError> {
        let workers = workers.max(1);
        let inner = Arc::new(PoolInner {
            thread_name: thread_name.into(),
            workers,
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            busy: AtomicUsize::new(0),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            handles: Mutex::new(Vec::with_capacity(workers)),
        });

        for index in 0..workers {
            let worker = Arc::clone(&inner);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", inner.thread_name, index))
                .spawn(move || worker.run_worker());

            match spawned {
                Ok(handle) => inner.handles.lock().push(handle),
                Err(err) => {
                    inner.begin_shutdown();
                    return Err(BackendError::Spawn(err));
                }
            }
        }

        debug!(workers, thread_name = %inner.thread_name, "Thread pool started");
        Ok(Self { inner })
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, BackendError> {
        Self::new(config.workers, config.thread_name.clone())
    }

    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Units waiting for a worker.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Workers currently running a unit.
    pub fn busy(&self) -> usize {
        self.inner.busy.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Waits for every worker to exit. Call after a shutdown; calling it from
    /// one of the pool's own workers skips that worker.
    pub fn join(&self) {
        let current = thread::current().id();
        let handles: Vec<_> = self.inner.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(thread_name = %self.inner.thread_name, "Worker thread exited by panic");
            }
        }
    }
}

impl PoolInner {
    fn run_worker(&self) {
        loop {
            if let Some(work) = self.queue.pop() {
                self.run_unit(work);
                continue;
            }

            let mut guard = self.mutex.lock();
            if !self.queue.is_empty() {
                continue;
            }
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            self.condvar.wait(&mut guard);
        }
        debug!(thread = ?thread::current().name(), "Worker exiting");
    }

    fn run_unit(&self, work: Work) {
        self.busy.fetch_add(1, Ordering::Relaxed);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(work)) {
            let panic = TaskPanic::from_payload(payload.as_ref());
            error!(
                thread = ?thread::current().name(),
                message = %panic.message,
                "Work unit panicked"
            );
        }
        self.busy.fetch_sub(1, Ordering::Relaxed);
    }

    fn begin_shutdown(&self) {
        let _guard = self.mutex.lock();
        self.shutdown.store(true, Ordering::Release);
        self.condvar.notify_all();
    }
}

impl Backend for ThreadPool {
    fn execute(&self, work: Work) -> Result<(), BackendError> {
        let _guard = self.inner.mutex.lock();
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(BackendError::ShutDown);
        }
        self.inner.queue.push(work);
        self.inner.condvar.notify_one();
        Ok(())
    }

    fn shutdown(&self) {
        self.inner.begin_shutdown();
    }

    fn shutdown_now(&self) -> usize {
        let discarded: Vec<Work> = {
            let _guard = self.inner.mutex.lock();
            self.inner.shutdown.store(true, Ordering::Release);
            self.inner.condvar.notify_all();
            std::iter::from_fn(|| self.inner.queue.pop()).collect()
        };
        debug!(discarded = discarded.len(), "Thread pool stopped");
        discarded.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.begin_shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("thread_name", &self.inner.thread_name)
            .field("workers", &self.inner.workers)
            .field("queued", &self.queued())
            .field("busy", &self.busy())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
