// ABOUTME: Execution backend contract for running deferred units of work
// ABOUTME: Exports the inline backend and the fixed-size thread pool backend

pub mod inline;
pub mod pool;

pub use inline::InlineBackend;
pub use pool::ThreadPool;

use thiserror::Error;

/// A deferred unit of work with no result and no built-in cancellation.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend has been shut down")]
    ShutDown,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Something able to run a unit of work eventually.
///
/// Callers may not assume which thread runs the work, whether threads are
/// pooled, or that units run in submission order.
pub trait Backend: Send + Sync {
    fn execute(&self, work: Work) -> Result<(), BackendError>;

    /// Stops accepting work; work already accepted still runs.
    fn shutdown(&self) {}

    /// Stops accepting work and discards queued units that have not started.
    ///
    /// Returns how many units were discarded.
    fn shutdown_now(&self) -> usize {
        self.shutdown();
        0
    }
}
