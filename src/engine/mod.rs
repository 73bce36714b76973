// ABOUTME: Task control engine: stages, controls, executors and the tracking service
// ABOUTME: Coordinates submission, cancellation, shutdown and termination across tasks

pub mod context;
pub mod control;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod service;
pub mod stage;
pub mod task;

pub use context::Context;
pub use control::{TaskControl, TaskId};
pub use error::{Result, TaskError, TaskPanic};
pub use executor::{BackendTaskExecutor, SynchronousTaskExecutor, TaskExecutor};
pub use monitor::ThreadInterrupt;
pub use service::{StatePoint, TaskExecutorService, Tasks};
pub use stage::TaskStage;
pub use task::{from_fn, interruptible_fn, FnTask, InterruptibleFnTask, Outcome, Task, TaskScope};
