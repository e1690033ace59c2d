//! Domain error model.

use thiserror::Error;

use crate::status::TaskStatus;

/// Result type used across the domain layer.
pub type TaskResult<T> = Result<T, TaskError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures of the task model itself
/// (validation, illegal lifecycle transitions). Storage, execution and
/// polling concerns carry their own error types in the respective crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A submission or patch failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A status transition not permitted by the lifecycle graph.
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition { from: TaskStatus, to: TaskStatus },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The referenced task does not exist (or has been swept).
    #[error("task not found")]
    NotFound,
}

impl TaskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn illegal_transition(from: TaskStatus, to: TaskStatus) -> Self {
        Self::IllegalTransition { from, to }
    }
}
