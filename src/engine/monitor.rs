// ABOUTME: Mutex and condition pair with deadline-bounded, interruption-aware waits
// ABOUTME: Also hosts the per-thread interrupt request used to break blocking waits

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::{Result, TaskError};

/// Something a blocked thread can be woken from.
trait Wake: Send + Sync {
    fn wake(&self);
}

struct InterruptState {
    requested: AtomicBool,
    parked: Mutex<Option<Arc<dyn Wake>>>,
}

thread_local! {
    static CURRENT: ThreadInterrupt = ThreadInterrupt::new();
}

/// Interrupt request for one thread.
///
/// A thread obtains its own handle with [`ThreadInterrupt::current`] and
/// hands clones to whoever may need to break its blocking waits. An
/// interrupt makes the thread's current or next blocking wait in this crate
/// return [`TaskError::Interrupted`], consuming the request.
///
/// Do not interrupt a thread while holding a control or service lock from
/// inside a task body; the wake-up takes the lock the target is parked on.
#[derive(Clone)]
pub struct ThreadInterrupt {
    state: Arc<InterruptState>,
}

impl ThreadInterrupt {
    fn new() -> Self {
        Self {
            state: Arc::new(InterruptState {
                requested: AtomicBool::new(false),
                parked: Mutex::new(None),
            }),
        }
    }

    /// Handle for the calling thread.
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    pub fn interrupt(&self) {
        self.state.requested.store(true, Ordering::SeqCst);
        let parked = self.state.parked.lock().clone();
        if let Some(target) = parked {
            target.wake();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    /// Clears a pending request, returning whether there was one.
    pub fn clear(&self) -> bool {
        self.state.requested.swap(false, Ordering::SeqCst)
    }

    fn park(&self, target: Arc<dyn Wake>) -> Parked<'_> {
        *self.state.parked.lock() = Some(target);
        Parked { interrupt: self }
    }
}

impl std::fmt::Debug for ThreadInterrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadInterrupt")
            .field("requested", &self.is_interrupted())
            .finish()
    }
}

struct Parked<'a> {
    interrupt: &'a ThreadInterrupt,
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        self.interrupt.state.parked.lock().take();
    }
}

/// Shared state guarded by one lock, with a condition to wait on.
pub(crate) struct Monitor<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T: Send + 'static> Monitor<T> {
    pub(crate) fn new(state: T) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }

    pub(crate) fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Blocks while `blocked` holds for the guarded state.
    ///
    /// Returns with the lock held once `blocked` is false or the deadline has
    /// passed; the caller re-reads the state to tell which. Fails with
    /// `Interrupted` if the calling thread is interrupted while it would
    /// otherwise block.
    pub(crate) fn wait_while<F>(
        self: &Arc<Self>,
        guard: &mut MutexGuard<'_, T>,
        deadline: Option<Instant>,
        mut blocked: F,
    ) -> Result<()>
    where
        F: FnMut(&T) -> bool,
    {
        if !blocked(guard) {
            return Ok(());
        }

        let interrupt = ThreadInterrupt::current();
        let _parked = interrupt.park(self.clone());

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(());
            }
            if interrupt.clear() {
                return Err(TaskError::Interrupted);
            }
            match deadline {
                Some(d) => {
                    self.cond.wait_until(guard, d);
                }
                None => self.cond.wait(guard),
            }
            if !blocked(guard) {
                return Ok(());
            }
        }
    }
}

impl<T: Send + 'static> Wake for Monitor<T> {
    fn wake(&self) {
        let _guard = self.state.lock();
        self.cond.notify_all();
    }
}

/// Deadline for a wait of `timeout` starting now; `None` means unbounded.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}
