// ABOUTME: Main library module for the taskexe task execution engine
// ABOUTME: Exports the engine, registries, backends and configuration as the public API

pub mod backend;
pub mod config;
pub mod engine;
pub mod registry;

// Re-export commonly used types
pub use backend::{Backend, BackendError, InlineBackend, ThreadPool};
pub use config::{init_logging, Config};
pub use engine::{
    from_fn, interruptible_fn, BackendTaskExecutor, Context, Outcome, StatePoint,
    SynchronousTaskExecutor, Task, TaskControl, TaskError, TaskExecutor, TaskExecutorService,
    TaskId, TaskPanic, TaskScope, TaskStage, ThreadInterrupt,
};
pub use registry::{OrderedRegistry, RegistryKind, TaskRegistry, UnorderedRegistry};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
