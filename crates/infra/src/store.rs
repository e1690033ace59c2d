//! Task storage: atomic per-id patches over a keyed store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;

use longrun_core::{StepRecord, Task, TaskError, TaskFailure, TaskId, TaskStatus};

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Unknown or already-swept id. Never answered with a default task, so
    /// callers can distinguish "never existed" from "zero progress".
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),
    /// The patch violated the lifecycle graph (includes a second
    /// `Queued -> Processing` claim for an id already owned by an executor).
    #[error(transparent)]
    Domain(#[from] TaskError),
    #[error("storage error: {0}")]
    Storage(String),
}

/// A partial update applied atomically to one task record.
///
/// Every executor checkpoint is a single patch, so a record is never left
/// half-written even if the executor dies immediately after the call.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    status: Option<TaskStatus>,
    checkpoint: Option<(String, u8)>,
    estimated_remaining: Option<Option<Duration>>,
    step: Option<StepRecord>,
    result: Option<JsonValue>,
    failure: Option<TaskFailure>,
    bump_retry: bool,
    drop_payloads: bool,
}

impl TaskPatch {
    /// A bare status transition.
    pub fn transition(to: TaskStatus) -> Self {
        Self {
            status: Some(to),
            ..Default::default()
        }
    }

    /// A progress checkpoint (current step + percentage).
    pub fn checkpoint(current_step: impl Into<String>, percentage: u8) -> Self {
        Self {
            checkpoint: Some((current_step.into(), percentage)),
            ..Default::default()
        }
    }

    /// Record the result and transition `Processing -> Completed`.
    pub fn complete(result: JsonValue) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            result: Some(result),
            ..Default::default()
        }
    }

    /// Record the error and transition `Processing -> Failed`.
    pub fn fail(failure: TaskFailure) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            failure: Some(failure),
            ..Default::default()
        }
    }

    /// Transition `Completed -> Consumed`.
    pub fn consume() -> Self {
        Self::transition(TaskStatus::Consumed)
    }

    /// Bump the retry counter after a retryable step failure.
    pub fn retry_bump() -> Self {
        Self {
            bump_retry: true,
            ..Default::default()
        }
    }

    pub fn with_step(mut self, record: StepRecord) -> Self {
        self.step = Some(record);
        self
    }

    pub fn with_estimated_remaining(mut self, remaining: Option<Duration>) -> Self {
        self.estimated_remaining = Some(remaining);
        self
    }

    /// Drop the large payloads (input/result), keeping the record.
    pub fn with_dropped_payloads(mut self) -> Self {
        self.drop_payloads = true;
        self
    }

    /// Apply to a record. Status changes are validated against the
    /// lifecycle graph; any rejection leaves the record untouched.
    pub(crate) fn apply(&self, task: &mut Task) -> Result<(), TaskError> {
        match (self.status, &self.result, &self.failure) {
            (Some(TaskStatus::Completed), Some(result), _) => task.complete(result.clone())?,
            (Some(TaskStatus::Failed), _, Some(failure)) => task.fail(failure.clone())?,
            (Some(to), _, _) => task.transition_to(to)?,
            (None, _, _) => {}
        }
        if let Some((step, pct)) = &self.checkpoint {
            task.checkpoint(step.clone(), *pct);
        }
        if let Some(remaining) = self.estimated_remaining {
            task.progress.estimated_remaining = remaining;
            task.timestamps.last_updated_at = Utc::now();
        }
        if let Some(record) = &self.step {
            task.record_step(record.clone());
        }
        if self.bump_retry {
            task.bump_retry();
        }
        if self.drop_payloads {
            task.drop_payloads();
        }
        Ok(())
    }
}

/// Task store abstraction: source of truth for every other component.
///
/// All mutations are atomic per id — a read-modify-write never interleaves
/// two writers for the same task.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new record. Fails if the id already exists.
    async fn create(&self, task: Task) -> Result<TaskId, StoreError>;

    /// Fetch a snapshot by id.
    async fn get(&self, id: TaskId) -> Result<Task, StoreError>;

    /// Atomically apply a patch and return the updated record.
    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError>;

    /// Delete a record. Returns whether it existed.
    async fn delete(&self, id: TaskId) -> Result<bool, StoreError>;

    /// Tasks whose `last_updated_at` falls within the given window,
    /// newest first.
    async fn list_recent(&self, window: Duration) -> Result<Vec<Task>, StoreError>;

    /// Every record in the store (sweeper input).
    async fn list_all(&self) -> Result<Vec<Task>, StoreError>;
}

/// In-memory task store.
///
/// One write lock per mutation gives per-id atomicity; the [`TaskStore`]
/// trait is the seam a durable backend would implement.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: Task) -> Result<TaskId, StoreError> {
        let mut tasks = self.tasks.write().unwrap();
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id));
        }
        let id = task.id;
        tasks.insert(id, task);
        Ok(id)
    }

    async fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        let tasks = self.tasks.read().unwrap();
        tasks.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().unwrap();
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        patch.apply(task)?;
        Ok(task.clone())
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().unwrap();
        Ok(tasks.remove(&id).is_some())
    }

    async fn list_recent(&self, window: Duration) -> Result<Vec<Task>, StoreError> {
        let delta = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(delta)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let tasks = self.tasks.read().unwrap();
        let mut result: Vec<_> = tasks
            .values()
            .filter(|t| t.timestamps.last_updated_at >= cutoff)
            .cloned()
            .collect();
        result.sort_by_key(|t| std::cmp::Reverse(t.timestamps.last_updated_at));
        Ok(result)
    }

    async fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().unwrap();
        let mut result: Vec<_> = tasks.values().cloned().collect();
        result.sort_by_key(|t| t.timestamps.created_at);
        Ok(result)
    }
}
