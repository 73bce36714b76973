// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides gates, blocking tasks and a hand-cranked backend for deterministic scheduling

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use taskexe::backend::Work;
use taskexe::{
    from_fn, interruptible_fn, Backend, BackendError, Outcome, Task, TaskExecutorService,
    ThreadPool,
};

/// One-shot latch that blocked task bodies wait on.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

/// Non-interruptible task that runs until `gate` opens.
pub fn gated_task(gate: &Arc<Gate>) -> Arc<dyn Task> {
    let gate = gate.clone();
    Arc::new(from_fn(move |_| {
        gate.wait();
        Ok(())
    }))
}

/// Interruptible task that spins until asked to stop.
pub fn cooperative_task() -> Arc<dyn Task> {
    Arc::new(interruptible_fn(|scope| {
        while !scope.is_interrupt_requested() {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(Outcome::Interrupted)
    }))
}

/// Task that bumps `counter` each time it runs.
pub fn counting_task(counter: &Arc<AtomicUsize>) -> Arc<dyn Task> {
    let counter = counter.clone();
    Arc::new(from_fn(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
}

pub fn pool_service(workers: usize) -> (Arc<ThreadPool>, Arc<TaskExecutorService>) {
    let pool = Arc::new(ThreadPool::new(workers, "test-worker").expect("thread pool"));
    let backend: Arc<dyn Backend> = pool.clone();
    (pool, TaskExecutorService::new(backend))
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Backend that keeps work until the test runs it explicitly.
#[derive(Default)]
pub struct ManualBackend {
    queue: Mutex<VecDeque<Work>>,
    refusing: Mutex<bool>,
}

impl ManualBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs the unit at `index` in submission order on the calling thread.
    pub fn run_at(&self, index: usize) -> bool {
        let work = self.queue.lock().remove(index);
        match work {
            Some(work) => {
                work();
                true
            }
            None => false,
        }
    }

    pub fn run_next(&self) -> bool {
        self.run_at(0)
    }

    pub fn run_all(&self) {
        while self.run_next() {}
    }

    pub fn refuse(&self) {
        *self.refusing.lock() = true;
    }
}

impl Backend for ManualBackend {
    fn execute(&self, work: Work) -> Result<(), BackendError> {
        if *self.refusing.lock() {
            return Err(BackendError::ShutDown);
        }
        self.queue.lock().push_back(work);
        Ok(())
    }

    fn shutdown(&self) {
        self.refuse();
    }

    fn shutdown_now(&self) -> usize {
        self.refuse();
        self.queue.lock().drain(..).count()
    }
}
