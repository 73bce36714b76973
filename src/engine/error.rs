// ABOUTME: Error types for task submission, stage waiting and backend hand-off
// ABOUTME: Task body failures are not errors of this kind; they become observable task state

use thiserror::Error;

use super::stage::TaskStage;
use crate::backend::BackendError;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task execution denied: {reason}")]
    DeniedExecution {
        reason: String,
        #[source]
        source: Option<BackendError>,
    },

    #[error("Useless waiting: stage {stage} has no next stage")]
    UselessWaiting { stage: TaskStage },

    #[error("Wait interrupted")]
    Interrupted,
}

impl TaskError {
    pub(crate) fn denied(reason: impl Into<String>) -> Self {
        TaskError::DeniedExecution {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, TaskError::DeniedExecution { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, TaskError::Interrupted)
    }

    /// The backend error behind a refused submission, if any.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            TaskError::DeniedExecution { source, .. } => source.as_ref(),
            _ => None,
        }
    }
}

/// Failure cause recorded when a task body panics.
///
/// The panic itself is resumed after the control has been marked failed, so
/// this value is what observers see while the hosting thread unwinds.
#[derive(Error, Debug, Clone)]
#[error("Task panicked: {message}")]
pub struct TaskPanic {
    pub message: String,
}

impl TaskPanic {
    pub(crate) fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
