// ABOUTME: Executor service tracking outstanding tasks through shutdown and termination
// ABOUTME: Publishes a state point token so observers can wait for any change without polling

use std::iter::FusedIterator;
use std::panic::resume_unwind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::context::Context;
use super::control::{ControlObserver, Ran, TaskControl, TaskId};
use super::error::{Result, TaskError};
use super::executor::TaskExecutor;
use super::monitor::{deadline_after, Monitor};
use super::stage::TaskStage;
use super::task::Task;
use crate::backend::{Backend, ThreadPool, Work};
use crate::config::{Config, ServiceConfig};
use crate::registry::{self, RegistryKind, RegistryView, TaskRegistry};

/// Version of a service's observable state.
///
/// Every action on the service (a submission, a task starting, a cancel
/// request, a task leaving the registry, a shutdown call) installs a new
/// value. Tokens are only meaningful for the service that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatePoint(u64);

struct ServiceState {
    registry: Box<dyn TaskRegistry>,
    state_point: u64,
    next_id: u64,
}

/// A [`TaskExecutor`] that keeps track of every task it accepted until the
/// task is done, and that can be shut down.
pub struct TaskExecutorService {
    this: Weak<Self>,
    backend: Arc<dyn Backend>,
    shutdown_backend: bool,
    monitor: Arc<Monitor<ServiceState>>,
    terminating: AtomicBool,
    terminated: AtomicBool,
    task_count: AtomicUsize,
}

impl TaskExecutorService {
    /// Service over `backend` with an ordered registry that leaves the
    /// backend running on shutdown.
    pub fn new(backend: Arc<dyn Backend>) -> Arc<Self> {
        Self::with_registry(backend, RegistryKind::Ordered.build(), false)
    }

    pub fn with_registry(
        backend: Arc<dyn Backend>,
        registry: Box<dyn TaskRegistry>,
        shutdown_backend: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            backend,
            shutdown_backend,
            monitor: Monitor::new(ServiceState {
                registry,
                state_point: 0,
                next_id: 1,
            }),
            terminating: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            task_count: AtomicUsize::new(0),
        })
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: &ServiceConfig) -> Arc<Self> {
        Self::with_registry(backend, config.registry.build(), config.shutdown_backend)
    }

    /// Service running on a new thread pool sized by `config.pool`.
    pub fn from_config(config: &Config) -> anyhow::Result<Arc<Self>> {
        let pool = ThreadPool::from_config(&config.pool)?;
        debug!(
            workers = pool.workers(),
            registry = %config.service.registry,
            "Creating executor service from configuration"
        );
        Ok(Self::with_config(Arc::new(pool), &config.service))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Registers `task` and hands it to the backend.
    ///
    /// Fails with [`TaskError::DeniedExecution`] once the service is
    /// terminating, or when the backend refuses the work. A refused task is
    /// left cancelled and is no longer tracked.
    #[instrument(level = "debug", skip_all)]
    pub fn execute(&self, task: Arc<dyn Task>, context: Context) -> Result<TaskControl> {
        let control = {
            let mut state = self.monitor.lock();
            if self.terminating.load(Ordering::Acquire) {
                return Err(TaskError::denied("service is shut down"));
            }

            let id = TaskId(state.next_id);
            state.next_id += 1;
            let executor: Weak<dyn TaskExecutor> = self.this.clone();
            let observer: Weak<dyn ControlObserver> = self.this.clone();
            let control = TaskControl::new(id, task, context, executor, Some(observer), true);

            state.registry.insert(control.clone());
            self.task_count.store(state.registry.len(), Ordering::Release);
            self.advance(&mut state);
            control
        };
        debug!(task_id = %control.id(), "Task submitted");

        if let Err(err) = self.backend.execute(self.wrap(control.clone())) {
            warn!(task_id = %control.id(), error = %err, "Backend refused task");
            control.try_update_stage(TaskStage::Pending, TaskStage::Cancelled);
            self.finish(control.id());
            return Err(TaskError::DeniedExecution {
                reason: "backend refused task".to_string(),
                source: Some(err),
            });
        }

        Ok(control)
    }

    /// Number of tasks still tracked.
    pub fn task_count(&self) -> usize {
        self.task_count.load(Ordering::Acquire)
    }

    /// Iterates over the tracked tasks.
    ///
    /// With an ordered registry the walk is live and in submission order:
    /// tasks that finish before the walk reaches them are skipped and tasks
    /// submitted meanwhile are included. An unordered registry yields a
    /// snapshot taken now, in no particular order.
    pub fn tasks(self: &Arc<Self>) -> Tasks {
        let view = self.monitor.lock().registry.view();
        let inner = match view {
            RegistryView::Live => TasksInner::Live {
                service: Arc::clone(self),
                cursor: None,
                done: false,
            },
            RegistryView::Snapshot(entries) => TasksInner::Snapshot(entries.into_iter()),
        };
        Tasks { inner }
    }

    /// Stops accepting tasks. Tasks already accepted still run.
    #[instrument(level = "debug", skip(self))]
    pub fn shutdown(&self) {
        {
            let mut state = self.monitor.lock();
            if !self.terminating.swap(true, Ordering::AcqRel) {
                info!(tasks = state.registry.len(), "Executor service shutting down");
            }
            self.check_termination(&state);
            self.advance(&mut state);
        }

        if self.shutdown_backend {
            self.backend.shutdown();
        }
    }

    /// Stops accepting tasks and cancels every task that has not started.
    ///
    /// Running tasks are left alone; cancel them individually to ask
    /// interruptible ones to stop.
    #[instrument(level = "debug", skip(self))]
    pub fn shutdown_now(&self) {
        {
            let mut state = self.monitor.lock();
            self.terminating.store(true, Ordering::Release);
            let cancelled = registry::cancel_pending(state.registry.as_ref());
            info!(
                tasks = state.registry.len(),
                cancelled, "Executor service shutting down now"
            );
            self.check_termination(&state);
            self.advance(&mut state);
        }

        if self.shutdown_backend {
            let discarded = self.backend.shutdown_now();
            if discarded > 0 {
                // Discarded units never come back to clean up their entries.
                let mut state = self.monitor.lock();
                let purged = registry::purge_finished(state.registry.as_mut());
                debug!(discarded, purged, "Purged tasks dropped by the backend");
                self.task_count.store(state.registry.len(), Ordering::Release);
                self.check_termination(&state);
                self.advance(&mut state);
            }
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    /// True once the service is shut down and every tracked task is done.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn await_termination(&self) -> Result<()> {
        self.wait_for_termination(None).map(|_| ())
    }

    /// Waits at most `timeout` for termination and reports whether it came.
    pub fn await_termination_timeout(&self, timeout: Duration) -> Result<bool> {
        self.wait_for_termination(deadline_after(timeout))
    }

    fn wait_for_termination(&self, deadline: Option<Instant>) -> Result<bool> {
        let mut state = self.monitor.lock();
        self.monitor
            .wait_while(&mut state, deadline, |_| !self.is_terminated())?;
        Ok(self.is_terminated())
    }

    /// Blocks until the state point differs from `last`, returning the new
    /// one. `None` returns the current state point at once.
    pub fn await_action(&self, last: Option<StatePoint>) -> Result<StatePoint> {
        self.wait_for_action(last, None)
    }

    /// Like [`await_action`](Self::await_action), returning the current state
    /// point, changed or not, once `timeout` has elapsed.
    pub fn await_action_timeout(
        &self,
        last: Option<StatePoint>,
        timeout: Duration,
    ) -> Result<StatePoint> {
        self.wait_for_action(last, deadline_after(timeout))
    }

    fn wait_for_action(
        &self,
        last: Option<StatePoint>,
        deadline: Option<Instant>,
    ) -> Result<StatePoint> {
        let mut state = self.monitor.lock();
        if let Some(StatePoint(seen)) = last {
            self.monitor
                .wait_while(&mut state, deadline, |state| state.state_point == seen)?;
        }
        Ok(StatePoint(state.state_point))
    }

    pub fn state_point(&self) -> StatePoint {
        StatePoint(self.monitor.lock().state_point)
    }

    fn wrap(&self, control: TaskControl) -> Work {
        let service = self.this.clone();
        Box::new(move || {
            let ran = control.run(|| {
                if let Some(service) = service.upgrade() {
                    service.touch();
                }
            });

            if let Some(service) = service.upgrade() {
                service.finish(control.id());
            }
            match ran {
                Ran::Finished(stage) => {
                    debug!(task_id = %control.id(), %stage, "Task left the registry");
                }
                Ran::NotStarted => {
                    debug!(task_id = %control.id(), "Task left the registry without running");
                }
                Ran::Panicked(payload) => resume_unwind(payload),
            }
        })
    }

    fn touch(&self) {
        let mut state = self.monitor.lock();
        self.advance(&mut state);
    }

    /// Drops a control from the registry once its wrapper is done with it.
    fn finish(&self, id: TaskId) {
        let mut state = self.monitor.lock();
        state.registry.remove(id);
        self.task_count.store(state.registry.len(), Ordering::Release);
        self.check_termination(&state);
        self.advance(&mut state);
    }

    fn check_termination(&self, state: &ServiceState) {
        if self.is_terminating()
            && !self.is_terminated()
            && registry::all_finished(state.registry.as_ref())
        {
            self.terminated.store(true, Ordering::Release);
            info!("Executor service terminated");
        }
    }

    fn advance(&self, state: &mut ServiceState) {
        state.state_point = state.state_point.wrapping_add(1);
        self.monitor.notify_all();
    }
}

impl TaskExecutor for TaskExecutorService {
    fn execute(&self, task: Arc<dyn Task>, context: Context) -> Result<TaskControl> {
        TaskExecutorService::execute(self, task, context)
    }
}

impl ControlObserver for TaskExecutorService {
    fn cancel_requested(&self, control: &TaskControl) {
        debug!(task_id = %control.id(), "Cancel requested");
        let mut state = self.monitor.lock();
        self.check_termination(&state);
        self.advance(&mut state);
    }
}

impl std::fmt::Debug for TaskExecutorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutorService")
            .field("task_count", &self.task_count())
            .field("terminating", &self.is_terminating())
            .field("terminated", &self.is_terminated())
            .field("shutdown_backend", &self.shutdown_backend)
            .finish()
    }
}

/// Iterator returned by [`TaskExecutorService::tasks`].
pub struct Tasks {
    inner: TasksInner,
}

enum TasksInner {
    Live {
        service: Arc<TaskExecutorService>,
        cursor: Option<TaskId>,
        done: bool,
    },
    Snapshot(std::vec::IntoIter<TaskControl>),
}

impl Iterator for Tasks {
    type Item = TaskControl;

    fn next(&mut self) -> Option<TaskControl> {
        match &mut self.inner {
            TasksInner::Live {
                service,
                cursor,
                done,
            } => {
                if *done {
                    return None;
                }
                let next = service.monitor.lock().registry.next_after(*cursor);
                match next {
                    Some(control) => {
                        *cursor = Some(control.id());
                        Some(control)
                    }
                    None => {
                        *done = true;
                        None
                    }
                }
            }
            TasksInner::Snapshot(entries) => entries.next(),
        }
    }
}

impl FusedIterator for Tasks {}
