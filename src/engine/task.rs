// ABOUTME: Task trait implemented by units of work and the scope handed to them
// ABOUTME: Cooperative interruption is an explicit flag observed at the body's own checkpoints

use std::sync::atomic::{AtomicBool, Ordering};

use super::context::Context;

/// How a task body finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// The body observed an interrupt request and stopped early.
    Interrupted,
}

/// A unit of work.
///
/// A body that returns `Err` ends in the failed stage with the error as its
/// failure cause. Interruptible tasks may be asked to stop while running;
/// they check [`TaskScope::is_interrupt_requested`] at safe points and report
/// honouring the request by returning [`Outcome::Interrupted`].
pub trait Task: Send + Sync + 'static {
    fn execute(&self, scope: &TaskScope<'_>) -> anyhow::Result<Outcome>;

    fn is_interruptible(&self) -> bool {
        false
    }
}

/// What a running task body can see of its own execution.
pub struct TaskScope<'a> {
    context: &'a Context,
    interrupt: &'a InterruptFlag,
}

impl<'a> TaskScope<'a> {
    pub(crate) fn new(context: &'a Context, interrupt: &'a InterruptFlag) -> Self {
        Self { context, interrupt }
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    pub fn is_interrupt_requested(&self) -> bool {
        self.interrupt.is_requested()
    }
}

#[derive(Debug, Default)]
pub(crate) struct InterruptFlag {
    requested: AtomicBool,
}

impl InterruptFlag {
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Task built from a closure that always runs to completion.
pub struct FnTask<F> {
    f: F,
}

pub fn from_fn<F>(f: F) -> FnTask<F>
where
    F: Fn(&TaskScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    FnTask { f }
}

impl<F> Task for FnTask<F>
where
    F: Fn(&TaskScope<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn execute(&self, scope: &TaskScope<'_>) -> anyhow::Result<Outcome> {
        (self.f)(scope).map(|()| Outcome::Complete)
    }
}

/// Task built from a closure that cooperates with interrupt requests.
pub struct InterruptibleFnTask<F> {
    f: F,
}

pub fn interruptible_fn<F>(f: F) -> InterruptibleFnTask<F>
where
    F: Fn(&TaskScope<'_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
{
    InterruptibleFnTask { f }
}

impl<F> Task for InterruptibleFnTask<F>
where
    F: Fn(&TaskScope<'_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
{
    fn execute(&self, scope: &TaskScope<'_>) -> anyhow::Result<Outcome> {
        (self.f)(scope)
    }

    fn is_interruptible(&self) -> bool {
        true
    }
}
