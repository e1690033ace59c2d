//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Status of a task through its lifecycle.
///
/// The only legal transitions are:
///
/// ```text
/// Queued ──────────► Processing ──► Completed ──► Consumed
///   │                    │  │
///   │                    │  └─────► Failed
///   └────► Cancelled ◄───┘
/// ```
///
/// Everything else must be rejected by the store layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for its executor to claim it.
    Queued,
    /// Claimed by exactly one executor, checkpoints in progress.
    Processing,
    /// Work finished; result recorded.
    Completed,
    /// Result delivered to and acknowledged by a caller.
    Consumed,
    /// Work failed; error recorded.
    Failed,
    /// Cancelled by the caller before reaching a terminal state.
    Cancelled,
}

impl TaskStatus {
    /// Terminal states receive no further executor-driven transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Consumed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Active states are the ones a poller keeps polling for.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Processing)
    }

    /// Whether `self -> to` is a legal lifecycle transition.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Queued, Cancelled)
                | (Processing, Cancelled)
                | (Completed, Consumed)
        )
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Consumed => "consumed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Status of a single executed step inside a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}
