//! The task record: the unit of orchestrated work.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{TaskError, TaskResult};
use crate::id::{OwnerId, TaskId};
use crate::status::{StepStatus, TaskStatus};

/// Task kind for routing to the appropriate workload.
///
/// The orchestrator never interprets a kind beyond `type_name()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Long-running analysis over an opaque input payload.
    Analysis { kind: String },
    /// Export/report generation.
    Export { format: String },
    /// Generic/custom task.
    Custom { kind: String },
}

impl TaskKind {
    pub fn analysis(kind: impl Into<String>) -> Self {
        Self::Analysis { kind: kind.into() }
    }

    pub fn export(format: impl Into<String>) -> Self {
        Self::Export {
            format: format.into(),
        }
    }

    pub fn custom(kind: impl Into<String>) -> Self {
        Self::Custom { kind: kind.into() }
    }

    /// The routing key, e.g. `"analysis.similarity"`.
    pub fn type_name(&self) -> &str {
        match self {
            TaskKind::Analysis { kind } => kind,
            TaskKind::Export { format } => format,
            TaskKind::Custom { kind } => kind,
        }
    }
}

/// A single executed (or executing) step inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Checkpointed progress, written by the executor after each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// 0..=100, non-decreasing while the task is `Processing`.
    pub percentage: u8,
    pub current_step: String,
    /// Rough remaining wall-clock estimate, if the workload provides one.
    pub estimated_remaining: Option<Duration>,
    /// Ordered record of executed steps.
    pub steps: Vec<StepRecord>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            percentage: 0,
            current_step: String::new(),
            estimated_remaining: None,
            steps: Vec::new(),
        }
    }
}

/// Terminal error recorded on a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    pub code: Option<String>,
    /// Network/timeout class failures are retryable; validation and
    /// business-logic failures are not.
    pub retryable: bool,
}

impl TaskFailure {
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: true,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Caller-supplied metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub priority: u8,
    pub max_retries: u32,
    pub current_retry: u32,
    pub owner: Option<OwnerId>,
}

impl Default for TaskMetadata {
    fn default() -> Self {
        Self {
            priority: 0,
            max_retries: 2,
            current_retry: 0,
            owner: None,
        }
    }
}

/// Retention behaviour after a task's result has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Drop the large payloads as soon as the result is consumed.
    Immediate,
    /// Leave the record for the time-based orphan sweep.
    Delayed,
    /// Only an explicit delete removes the record.
    Manual,
}

/// Per-task execution/polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Hard wall-clock ceiling for a single executor run.
    pub timeout: Duration,
    /// Suggested base interval for client polling.
    pub base_poll_interval: Duration,
    pub persist_result: bool,
    pub cleanup: CleanupPolicy,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15 * 60),
            base_poll_interval: Duration::from_secs(2),
            persist_result: true,
            cleanup: CleanupPolicy::Delayed,
        }
    }
}

/// Record timestamps. Monotonically non-decreasing; `last_updated_at` is
/// touched on every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

impl Timestamps {
    fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            started_at: None,
            completed_at: None,
            last_updated_at: now,
        }
    }
}

/// The unit of orchestrated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: Progress,
    /// Opaque payload, immutable after creation.
    pub input: JsonValue,
    /// Present iff `status ∈ {Completed, Consumed}` (until payload cleanup).
    pub result: Option<JsonValue>,
    /// Present iff `status = Failed`.
    pub error: Option<TaskFailure>,
    pub metadata: TaskMetadata,
    pub timestamps: Timestamps,
    pub config: TaskConfig,
}

impl Task {
    /// Create a new task in `Queued`.
    pub fn new(kind: TaskKind, input: JsonValue) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            status: TaskStatus::Queued,
            progress: Progress::default(),
            input,
            result: None,
            error: None,
            metadata: TaskMetadata::default(),
            timestamps: Timestamps::now(),
            config: TaskConfig::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    fn touch(&mut self) {
        self.timestamps.last_updated_at = Utc::now();
    }

    /// Apply a status transition, enforcing the lifecycle graph.
    pub fn transition_to(&mut self, to: TaskStatus) -> TaskResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(TaskError::illegal_transition(self.status, to));
        }
        let now = Utc::now();
        match to {
            TaskStatus::Processing => self.timestamps.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.timestamps.completed_at = Some(now)
            }
            _ => {}
        }
        self.status = to;
        self.timestamps.last_updated_at = now;
        Ok(())
    }

    /// Write a progress checkpoint. Percentage is clamped so it never
    /// decreases while the task is processing.
    pub fn checkpoint(&mut self, current_step: impl Into<String>, percentage: u8) {
        self.progress.current_step = current_step.into();
        self.progress.percentage = self.progress.percentage.max(percentage.min(100));
        self.touch();
    }

    /// Append a step record to the ordered step history.
    pub fn record_step(&mut self, record: StepRecord) {
        self.progress.steps.push(record);
        self.touch();
    }

    /// Record the result and move to `Completed`.
    pub fn complete(&mut self, result: JsonValue) -> TaskResult<()> {
        self.transition_to(TaskStatus::Completed)?;
        self.result = Some(result);
        self.progress.percentage = 100;
        self.progress.estimated_remaining = None;
        Ok(())
    }

    /// Record a terminal error and move to `Failed`.
    pub fn fail(&mut self, failure: TaskFailure) -> TaskResult<()> {
        self.transition_to(TaskStatus::Failed)?;
        self.error = Some(failure);
        Ok(())
    }

    /// Bump the retry counter after a retryable step failure.
    pub fn bump_retry(&mut self) {
        self.metadata.current_retry += 1;
        self.touch();
    }

    /// Drop the large payloads, keeping the lightweight record. Used by the
    /// sweeper once a result has been consumed under `CleanupPolicy::Immediate`.
    pub fn drop_payloads(&mut self) {
        self.input = JsonValue::Null;
        self.result = None;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifecycle_success_path() {
        let mut task = Task::new(TaskKind::custom("test"), json!({"n": 1}));
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(task.timestamps.started_at.is_none());

        task.transition_to(TaskStatus::Processing).unwrap();
        assert!(task.timestamps.started_at.is_some());

        task.complete(json!({"ok": true})).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress.percentage, 100);
        assert!(task.result.is_some());
        assert!(task.error.is_none());
        assert!(task.timestamps.completed_at.is_some());

        task.transition_to(TaskStatus::Consumed).unwrap();
        assert_eq!(task.status, TaskStatus::Consumed);
    }

    #[test]
    fn double_claim_rejected() {
        let mut task = Task::new(TaskKind::custom("test"), json!({}));
        task.transition_to(TaskStatus::Processing).unwrap();
        let err = task.transition_to(TaskStatus::Processing).unwrap_err();
        assert!(matches!(err, TaskError::IllegalTransition { .. }));
    }

    #[test]
    fn fail_records_error_only() {
        let mut task = Task::new(TaskKind::custom("test"), json!({}));
        task.transition_to(TaskStatus::Processing).unwrap();
        task.fail(TaskFailure::terminal("boom")).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.result.is_none());
        assert_eq!(task.error.as_ref().unwrap().message, "boom");
        assert!(!task.error.as_ref().unwrap().retryable);
    }

    #[test]
    fn percentage_never_decreases() {
        let mut task = Task::new(TaskKind::custom("test"), json!({}));
        task.transition_to(TaskStatus::Processing).unwrap();
        task.checkpoint("step-1", 40);
        task.checkpoint("step-2", 20);
        assert_eq!(task.progress.percentage, 40);
        task.checkpoint("step-3", 75);
        assert_eq!(task.progress.percentage, 75);
    }

    #[test]
    fn checkpoint_touches_last_updated() {
        let mut task = Task::new(TaskKind::custom("test"), json!({}));
        let before = task.timestamps.last_updated_at;
        task.checkpoint("step-1", 10);
        assert!(task.timestamps.last_updated_at >= before);
    }

    #[test]
    fn cancel_from_queued_and_processing() {
        let mut queued = Task::new(TaskKind::custom("test"), json!({}));
        queued.transition_to(TaskStatus::Cancelled).unwrap();
        assert_eq!(queued.status, TaskStatus::Cancelled);

        let mut processing = Task::new(TaskKind::custom("test"), json!({}));
        processing.transition_to(TaskStatus::Processing).unwrap();
        processing.transition_to(TaskStatus::Cancelled).unwrap();
        assert_eq!(processing.status, TaskStatus::Cancelled);

        // Cancelled is terminal.
        assert!(queued.transition_to(TaskStatus::Processing).is_err());
    }

    #[test]
    fn type_name_routes() {
        assert_eq!(TaskKind::analysis("analysis.similarity").type_name(), "analysis.similarity");
        assert_eq!(TaskKind::custom("demo.sleep").type_name(), "demo.sleep");
    }
}
