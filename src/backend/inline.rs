// ABOUTME: Backend that runs every unit of work immediately on the submitting thread
// ABOUTME: Useful for deterministic tests and for callers that want caller-runs semantics

use std::sync::atomic::{AtomicBool, Ordering};

use super::{Backend, BackendError, Work};

#[derive(Debug, Default)]
pub struct InlineBackend {
    shut_down: AtomicBool,
}

impl InlineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Backend for InlineBackend {
    fn execute(&self, work: Work) -> Result<(), BackendError> {
        if self.is_shutdown() {
            return Err(BackendError::ShutDown);
        }
        work();
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }
}
