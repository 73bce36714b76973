// ABOUTME: Task stage enumeration and its level-based ordering
// ABOUTME: Pending and running precede the three mutually exclusive terminal stages

use serde::{Deserialize, Serialize};

/// Lifecycle position of a submitted task.
///
/// Stages are ordered by level. `Cancelled`, `Complete` and `Failed` share
/// the terminal level and never change once reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStage {
    Pending,
    Running,
    Cancelled,
    Complete,
    Failed,
}

impl TaskStage {
    pub const MIN_LEVEL: u8 = 0;
    pub const MAX_LEVEL: u8 = 2;

    pub const fn level(self) -> u8 {
        match self {
            TaskStage::Pending => 0,
            TaskStage::Running => 1,
            TaskStage::Cancelled | TaskStage::Complete | TaskStage::Failed => 2,
        }
    }

    pub fn is_before(self, other: TaskStage) -> bool {
        self.level() < other.level()
    }

    pub fn is_after(self, other: TaskStage) -> bool {
        self.level() > other.level()
    }

    pub fn has_before(self) -> bool {
        self.level() > Self::MIN_LEVEL
    }

    pub fn has_after(self) -> bool {
        self.level() < Self::MAX_LEVEL
    }

    pub fn is_terminal(self) -> bool {
        !self.has_after()
    }
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStage::Pending => write!(f, "pending"),
            TaskStage::Running => write!(f, "running"),
            TaskStage::Cancelled => write!(f, "cancelled"),
            TaskStage::Complete => write!(f, "complete"),
            TaskStage::Failed => write!(f, "failed"),
        }
    }
}
