//! `longrun-core` — task orchestration domain primitives.
//!
//! This crate contains **pure domain** types (no runtime or transport
//! concerns): the task record, its status state machine, progress/checkpoint
//! structures, and the domain error model.

pub mod error;
pub mod id;
pub mod status;
pub mod task;

pub use error::{TaskError, TaskResult};
pub use id::{OwnerId, TaskId};
pub use status::{StepStatus, TaskStatus};
pub use task::{
    CleanupPolicy, Progress, StepRecord, Task, TaskConfig, TaskFailure, TaskKind, TaskMetadata,
    Timestamps,
};
