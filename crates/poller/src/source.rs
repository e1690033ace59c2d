//! Where poll queries go: an injected status source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use longrun_core::{Progress, Task, TaskFailure, TaskId, TaskStatus, Timestamps};

/// Snapshot of a task as seen by a polling client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress: Progress,
    pub result: Option<JsonValue>,
    pub error: Option<TaskFailure>,
    pub last_updated_at: DateTime<Utc>,
    /// `status ∈ {queued, processing}` as computed by the server.
    pub continue_poll: bool,
}

impl From<Task> for TaskSnapshot {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            continue_poll: task.status.is_active(),
            progress: task.progress,
            result: task.result,
            error: task.error,
            last_updated_at: task.timestamps.last_updated_at,
        }
    }
}

/// Failure of a single status query.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// The server says the id does not exist (or has been swept). Not
    /// retried: distinct from a task in a terminal state.
    #[error("task not found")]
    NotFound,
    /// Network-level failure; retried after the configured `retry_delay`.
    #[error("transient query failure: {0}")]
    Transient(String),
}

/// The poller's view of the status endpoint.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, id: TaskId) -> Result<TaskSnapshot, QueryError>;
}

/// Wire shape of `GET /tasks/{id}`.
#[derive(Debug, Deserialize)]
struct StatusBody {
    id: TaskId,
    status: TaskStatus,
    progress: Progress,
    result: Option<JsonValue>,
    error: Option<TaskFailure>,
    timestamps: Timestamps,
    continue_poll: bool,
}

/// HTTP status source against a longrun API base URL.
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self, id: TaskId) -> Result<TaskSnapshot, QueryError> {
        let url = format!("{}/tasks/{}", self.base_url.trim_end_matches('/'), id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QueryError::Transient(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(QueryError::NotFound);
        }
        let response = response
            .error_for_status()
            .map_err(|e| QueryError::Transient(e.to_string()))?;
        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| QueryError::Transient(e.to_string()))?;

        Ok(TaskSnapshot {
            id: body.id,
            status: body.status,
            progress: body.progress,
            result: body.result,
            error: body.error,
            last_updated_at: body.timestamps.last_updated_at,
            continue_poll: body.continue_poll,
        })
    }
}
