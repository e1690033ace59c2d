//! Cleanup / retention sweeper.
//!
//! Two reclamation paths: explicit consumption of a delivered result, and
//! time-based orphan sweeps for tasks whose callers have disappeared. Sweeps
//! are explicit operations invoked by a caller or a schedule; there is no
//! built-in timer loop.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use longrun_core::{CleanupPolicy, Task, TaskId};

use crate::store::{StoreError, TaskPatch, TaskStore};

/// Default age after which a non-consumed task is presumed abandoned.
pub const DEFAULT_ORPHAN_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Which records a sweep considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepMode {
    /// Every record, optionally restricted to a task-kind pattern.
    All { kind: Option<String> },
    /// Non-consumed records whose `last_updated_at` is older than the age.
    OrphanedOlderThan(Duration),
    /// Records whose kind matches the pattern (exact or `prefix.*`).
    Matching(String),
}

/// Result of a sweep. With `dry_run` the candidate set is reported and
/// nothing is deleted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepReport {
    pub deleted_count: usize,
    pub candidates: Vec<TaskId>,
}

fn matches_pattern(pattern: &str, type_name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => type_name.starts_with(prefix),
        None => pattern == type_name,
    }
}

/// Run one sweep over the store.
pub async fn sweep(
    store: &dyn TaskStore,
    mode: SweepMode,
    dry_run: bool,
) -> Result<SweepReport, StoreError> {
    let tasks = store.list_all().await?;
    let now = Utc::now();

    let candidates: Vec<TaskId> = tasks
        .iter()
        .filter(|task| match &mode {
            SweepMode::All { kind: None } => true,
            SweepMode::All { kind: Some(pattern) } => {
                matches_pattern(pattern, task.kind.type_name())
            }
            SweepMode::OrphanedOlderThan(age) => {
                let cutoff = now
                    - chrono::Duration::from_std(*age).unwrap_or(chrono::Duration::zero());
                task.status != longrun_core::TaskStatus::Consumed
                    && task.timestamps.last_updated_at < cutoff
            }
            SweepMode::Matching(pattern) => matches_pattern(pattern, task.kind.type_name()),
        })
        .map(|task| task.id)
        .collect();

    if dry_run {
        debug!(candidates = candidates.len(), ?mode, "dry-run sweep");
        return Ok(SweepReport {
            deleted_count: 0,
            candidates,
        });
    }

    let mut deleted = 0usize;
    for id in &candidates {
        if store.delete(*id).await? {
            deleted += 1;
        }
    }
    info!(deleted, ?mode, "sweep finished");
    Ok(SweepReport {
        deleted_count: deleted,
        candidates,
    })
}

/// Mark a delivered result as consumed (`Completed -> Consumed`). Under
/// `CleanupPolicy::Immediate` the large payloads are dropped right away;
/// the lightweight record remains until deleted or swept.
pub async fn consume(store: &dyn TaskStore, id: TaskId) -> Result<Task, StoreError> {
    let task = store.update(id, TaskPatch::consume()).await?;
    if task.config.cleanup == CleanupPolicy::Immediate {
        return store
            .update(id, TaskPatch::default().with_dropped_payloads())
            .await;
    }
    Ok(task)
}
