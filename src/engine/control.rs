// ABOUTME: Per-task control handle owning the stage state machine and failure cause
// ABOUTME: Provides blocking stage waits, best-effort cancellation and the guarded body runner

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::context::Context;
use super::error::{Result, TaskError, TaskPanic};
use super::executor::TaskExecutor;
use super::monitor::{deadline_after, Monitor};
use super::stage::TaskStage;
use super::task::{InterruptFlag, Outcome, Task, TaskScope};

/// Identifier of a submission, increasing in submission order per executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Receives cancel requests made through controls it created.
pub(crate) trait ControlObserver: Send + Sync {
    fn cancel_requested(&self, control: &TaskControl);
}

struct StageCell {
    stage: TaskStage,
    failure_cause: Option<Arc<anyhow::Error>>,
}

struct ControlInner {
    id: TaskId,
    task: Arc<dyn Task>,
    context: Context,
    executor: Weak<dyn TaskExecutor>,
    observer: Option<Weak<dyn ControlObserver>>,
    cancellable: bool,
    interrupt: InterruptFlag,
    monitor: Arc<Monitor<StageCell>>,
}

/// Handle to one submitted task.
///
/// Clones refer to the same task. Equality is identity.
#[derive(Clone)]
pub struct TaskControl {
    inner: Arc<ControlInner>,
}

/// What happened when a wrapper tried to run a control's body.
pub(crate) enum Ran {
    /// The control left `Pending` before the body could start.
    NotStarted,
    Finished(TaskStage),
    /// The body panicked; the control is already `Failed`.
    Panicked(Box<dyn Any + Send>),
}

impl TaskControl {
    pub(crate) fn new(
        id: TaskId,
        task: Arc<dyn Task>,
        context: Context,
        executor: Weak<dyn TaskExecutor>,
        observer: Option<Weak<dyn ControlObserver>>,
        cancellable: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ControlInner {
                id,
                task,
                context,
                executor,
                observer,
                cancellable,
                interrupt: InterruptFlag::default(),
                monitor: Monitor::new(StageCell {
                    stage: TaskStage::Pending,
                    failure_cause: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.inner.task
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// The executor this task was submitted to, if it is still alive.
    pub fn executor(&self) -> Option<Arc<dyn TaskExecutor>> {
        self.inner.executor.upgrade()
    }

    pub fn stage(&self) -> TaskStage {
        self.inner.monitor.lock().stage
    }

    /// Error the body failed with; present exactly when the stage is `Failed`.
    pub fn failure_cause(&self) -> Option<Arc<anyhow::Error>> {
        self.inner.monitor.lock().failure_cause.clone()
    }

    /// Blocks until the stage is strictly after `start` and returns it.
    pub fn await_next_stage(&self, start: TaskStage) -> Result<TaskStage> {
        self.wait_for_stage_after(start, None)
    }

    /// Like [`await_next_stage`](Self::await_next_stage), but returns the
    /// current stage, advanced or not, once `timeout` has elapsed. A zero
    /// timeout polls.
    pub fn await_next_stage_timeout(&self, start: TaskStage, timeout: Duration) -> Result<TaskStage> {
        self.wait_for_stage_after(start, deadline_after(timeout))
    }

    fn wait_for_stage_after(&self, start: TaskStage, deadline: Option<Instant>) -> Result<TaskStage> {
        if !start.has_after() {
            return Err(TaskError::UselessWaiting { stage: start });
        }
        let monitor = &self.inner.monitor;
        let mut cell = monitor.lock();
        monitor.wait_while(&mut cell, deadline, |cell| !cell.stage.is_after(start))?;
        Ok(cell.stage)
    }

    /// Requests cancellation without waiting for it.
    ///
    /// A pending task is cancelled and its body will never run. A running
    /// task is only asked to stop if it is interruptible; whether it does is
    /// up to the body.
    pub fn cancel_task(&self) {
        if !self.inner.cancellable {
            return;
        }

        if self.try_update_stage(TaskStage::Pending, TaskStage::Cancelled) {
            debug!(task_id = %self.inner.id, "Task cancelled before start");
        } else if self.inner.task.is_interruptible() {
            debug!(task_id = %self.inner.id, "Interrupt requested for running task");
            self.inner.interrupt.request();
        }

        if let Some(observer) = self.inner.observer.as_ref().and_then(Weak::upgrade) {
            observer.cancel_requested(self);
        }
    }

    pub(crate) fn update_stage(&self, new_stage: TaskStage) {
        let monitor = &self.inner.monitor;
        let mut cell = monitor.lock();
        debug_assert!(!cell.stage.is_terminal(), "stage left terminal {}", cell.stage);
        cell.stage = new_stage;
        monitor.notify_all();
    }

    /// Compare-and-set on the stage.
    pub(crate) fn try_update_stage(&self, expected: TaskStage, new_stage: TaskStage) -> bool {
        let monitor = &self.inner.monitor;
        let mut cell = monitor.lock();
        if cell.stage != expected {
            return false;
        }
        cell.stage = new_stage;
        monitor.notify_all();
        true
    }

    fn fail(&self, cause: anyhow::Error) {
        let monitor = &self.inner.monitor;
        let mut cell = monitor.lock();
        cell.failure_cause = Some(Arc::new(cause));
        cell.stage = TaskStage::Failed;
        monitor.notify_all();
    }

    /// Moves the control to `Running`, runs the body and records how it ended.
    ///
    /// `on_started` runs after the `Running` transition and before the body.
    pub(crate) fn run(&self, on_started: impl FnOnce()) -> Ran {
        let inner = &self.inner;
        if !self.try_update_stage(TaskStage::Pending, TaskStage::Running) {
            debug!(task_id = %inner.id, "Skipping task that left pending before start");
            return Ran::NotStarted;
        }
        on_started();

        let scope = TaskScope::new(&inner.context, &inner.interrupt);
        let result = catch_unwind(AssertUnwindSafe(|| inner.task.execute(&scope)));

        let stage = match result {
            Ok(Ok(Outcome::Complete)) => TaskStage::Complete,
            Ok(Ok(Outcome::Interrupted)) => {
                if inner.task.is_interruptible() && inner.interrupt.is_requested() {
                    TaskStage::Cancelled
                } else {
                    warn!(
                        task_id = %inner.id,
                        "Task reported an interrupt that was never requested, treating as complete"
                    );
                    TaskStage::Complete
                }
            }
            Ok(Err(err)) => {
                debug!(task_id = %inner.id, error = %err, "Task failed");
                self.fail(err);
                return Ran::Finished(TaskStage::Failed);
            }
            Err(payload) => {
                self.fail(anyhow::Error::new(TaskPanic::from_payload(payload.as_ref())));
                return Ran::Panicked(payload);
            }
        };

        self.update_stage(stage);
        debug!(task_id = %inner.id, %stage, "Task finished");
        Ran::Finished(stage)
    }
}

impl PartialEq for TaskControl {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TaskControl {}

impl std::fmt::Debug for TaskControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskControl")
            .field("id", &self.inner.id)
            .field("stage", &self.stage())
            .finish()
    }
}
