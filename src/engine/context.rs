// ABOUTME: Opaque, caller-owned context handle passed unchanged to task bodies
// ABOUTME: The engine never locks or inspects what the handle points at

use std::any::Any;
use std::sync::Arc;

/// Parameter/result carrier handed to a task at execution time.
///
/// Cloning is cheap and every clone refers to the same value. Whatever
/// synchronization the value needs is its own business.
#[derive(Clone)]
pub struct Context {
    value: Arc<dyn Any + Send + Sync>,
}

impl Context {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self { value }
    }

    /// A context carrying nothing.
    pub fn empty() -> Self {
        Self::new(())
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// True when both handles refer to the same value.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("ptr", &Arc::as_ptr(&self.value))
            .finish()
    }
}
