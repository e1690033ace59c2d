//! Request/response DTOs for the task endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use longrun_core::{
    CleanupPolicy, OwnerId, Progress, Task, TaskConfig, TaskFailure, TaskId, TaskKind,
    TaskMetadata, TaskStatus, Timestamps,
};

/// POST /tasks body.
#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    /// Routing key, e.g. `"analysis.similarity"` or `"demo.simulate"`.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Opaque payload handed to the workload unchanged.
    #[serde(default)]
    pub input: JsonValue,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub owner: Option<OwnerId>,
    /// Wall-clock ceiling override, seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub cleanup: Option<CleanupPolicy>,
}

impl SubmitTaskRequest {
    /// Build a `Queued` task record from the request.
    pub fn into_task(self) -> Task {
        let kind = match self.task_type.split('.').next() {
            Some("analysis") => TaskKind::analysis(self.task_type),
            Some("export") => TaskKind::export(self.task_type),
            _ => TaskKind::custom(self.task_type),
        };

        let metadata = TaskMetadata {
            priority: self.priority.unwrap_or_default(),
            max_retries: self.max_retries.unwrap_or(TaskMetadata::default().max_retries),
            owner: self.owner,
            ..TaskMetadata::default()
        };

        let mut config = TaskConfig::default();
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(cleanup) = self.cleanup {
            config.cleanup = cleanup;
        }

        Task::new(kind, self.input)
            .with_metadata(metadata)
            .with_config(config)
    }
}

/// 202 Accepted body for a submission.
#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Where to poll for status.
    pub polling_url: String,
    pub suggested_poll_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration_secs: Option<u64>,
}

impl SubmitTaskResponse {
    pub fn accepted(task: &Task, estimate: Option<Duration>) -> Self {
        Self {
            id: task.id,
            status: task.status,
            polling_url: format!("/tasks/{}", task.id),
            suggested_poll_interval_secs: task.config.base_poll_interval.as_secs(),
            estimated_duration_secs: estimate.map(|d| d.as_secs()),
        }
    }
}

/// GET /tasks/{id} body. Polling clients deserialize exactly this shape.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress: Progress,
    pub result: Option<JsonValue>,
    pub error: Option<TaskFailure>,
    pub timestamps: Timestamps,
    /// `status ∈ {queued, processing}`: whether the client should keep polling.
    pub continue_poll: bool,
}

impl From<Task> for StatusResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            continue_poll: task.status.is_active(),
            progress: task.progress,
            result: task.result,
            error: task.error,
            timestamps: task.timestamps,
        }
    }
}

/// DELETE /tasks query string.
#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    /// `all`, `orphaned` (default) or `pattern` (`matching` is accepted
    /// as an alias).
    pub mode: Option<String>,
    /// Orphan age cutoff for `mode=orphaned`, seconds.
    pub max_age_secs: Option<u64>,
    /// Kind pattern for `mode=all` / `mode=pattern` (exact or `prefix.*`).
    pub pattern: Option<String>,
    pub dry_run: Option<bool>,
}
