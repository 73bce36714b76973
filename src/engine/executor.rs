// ABOUTME: Task submission contract and its two registry-less implementations
// ABOUTME: Runs tasks on the calling thread or forwards them to an execution backend

use std::panic::resume_unwind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::context::Context;
use super::control::{Ran, TaskControl, TaskId};
use super::error::{Result, TaskError};
use super::stage::TaskStage;
use super::task::Task;
use crate::backend::{Backend, Work};

/// Accepts tasks for execution.
pub trait TaskExecutor: Send + Sync {
    /// Submits `task`, returning the handle that tracks it.
    ///
    /// Fails with [`TaskError::DeniedExecution`] when the executor declines.
    fn execute(&self, task: Arc<dyn Task>, context: Context) -> Result<TaskControl>;
}

/// Runs every task to the end on the calling thread.
///
/// Returned controls are already terminal and ignore cancel requests. A
/// panicking body is recorded as a failure and then resumed on the caller.
pub struct SynchronousTaskExecutor {
    this: Weak<Self>,
    next_id: AtomicU64,
}

impl SynchronousTaskExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            next_id: AtomicU64::new(1),
        })
    }
}

impl TaskExecutor for SynchronousTaskExecutor {
    fn execute(&self, task: Arc<dyn Task>, context: Context) -> Result<TaskControl> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let executor: Weak<dyn TaskExecutor> = self.this.clone();
        let control = TaskControl::new(id, task, context, executor, None, false);

        if let Ran::Panicked(payload) = control.run(|| {}) {
            resume_unwind(payload);
        }
        Ok(control)
    }
}

impl std::fmt::Debug for SynchronousTaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronousTaskExecutor")
            .field("submitted", &(self.next_id.load(Ordering::Relaxed) - 1))
            .finish()
    }
}

/// Hands every task straight to a backend without tracking it afterwards.
pub struct BackendTaskExecutor {
    this: Weak<Self>,
    backend: Arc<dyn Backend>,
    next_id: AtomicU64,
}

impl BackendTaskExecutor {
    pub fn new(backend: Arc<dyn Backend>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            backend,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

impl TaskExecutor for BackendTaskExecutor {
    fn execute(&self, task: Arc<dyn Task>, context: Context) -> Result<TaskControl> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let executor: Weak<dyn TaskExecutor> = self.this.clone();
        let control = TaskControl::new(id, task, context, executor, None, true);

        let work_control = control.clone();
        let work: Work = Box::new(move || {
            if let Ran::Panicked(payload) = work_control.run(|| {}) {
                resume_unwind(payload);
            }
        });

        if let Err(err) = self.backend.execute(work) {
            warn!(task_id = %id, error = %err, "Backend refused task");
            control.try_update_stage(TaskStage::Pending, TaskStage::Cancelled);
            return Err(TaskError::DeniedExecution {
                reason: "backend refused task".to_string(),
                source: Some(err),
            });
        }

        debug!(task_id = %id, "Task handed to backend");
        Ok(control)
    }
}

impl std::fmt::Debug for BackendTaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendTaskExecutor")
            .field("submitted", &(self.next_id.load(Ordering::Relaxed) - 1))
            .finish()
    }
}
