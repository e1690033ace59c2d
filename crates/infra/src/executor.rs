//! Background executor: claims a queued task and drives it to a terminal
//! state inside a bounded wall-clock window, checkpointing after every step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use longrun_core::{StepRecord, StepStatus, Task, TaskError, TaskFailure, TaskId, TaskStatus};

use crate::notifier::CompletionNotifier;
use crate::store::{StoreError, TaskPatch, TaskStore};
use crate::workload::{WorkError, Workload, WorkloadRegistry};

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base delay before re-running a step after a retryable failure
    /// (scaled linearly by the attempt number).
    pub retry_base_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Handle to a spawned executor. Dropping it does not stop the execution;
/// the dispatch is fire-and-forget by design.
#[derive(Debug)]
pub struct ExecutorHandle {
    join: tokio::task::JoinHandle<()>,
}

impl ExecutorHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the executor to exit (tests and graceful shutdown).
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Dispatch execution of one task. Returns immediately; the work runs on a
/// spawned tokio task. Exactly one executor ever owns a task id: the
/// `Queued -> Processing` claim through the store is the ownership handshake,
/// and a loser of that race exits silently.
pub fn spawn_executor(
    store: Arc<dyn TaskStore>,
    registry: Arc<WorkloadRegistry>,
    notifier: Arc<dyn CompletionNotifier>,
    config: ExecutorConfig,
    task_id: TaskId,
) -> ExecutorHandle {
    let join = tokio::spawn(async move {
        run(store, registry, notifier, config, task_id).await;
    });
    ExecutorHandle { join }
}

/// Outcome of the step loop, before it is written back to the store.
enum StepLoopOutcome {
    Completed(JsonValue),
    Failed(WorkError),
    Cancelled,
    /// The store went away mid-run (record swept); nothing left to write.
    Lost,
}

async fn run(
    store: Arc<dyn TaskStore>,
    registry: Arc<WorkloadRegistry>,
    notifier: Arc<dyn CompletionNotifier>,
    config: ExecutorConfig,
    task_id: TaskId,
) {
    let task = match store.get(task_id).await {
        Ok(task) => task,
        Err(StoreError::NotFound(_)) => {
            debug!(task_id = %task_id, "task gone before execution; skipping");
            return;
        }
        Err(e) => {
            error!(task_id = %task_id, error = %e, "failed to load task");
            return;
        }
    };

    // Ownership handshake: losing the claim means another executor holds the
    // id, or the caller cancelled while still queued.
    let task = match store
        .update(task_id, TaskPatch::transition(TaskStatus::Processing))
        .await
    {
        Ok(task) => task,
        Err(StoreError::Domain(TaskError::IllegalTransition { from, .. })) => {
            debug!(task_id = %task_id, status = %from, "claim rejected; not executing");
            return;
        }
        Err(e) => {
            error!(task_id = %task_id, error = %e, "failed to claim task");
            return;
        }
    };

    let Some(mut workload) = registry.instantiate(&task) else {
        let failure = TaskFailure::terminal(format!(
            "no workload registered for kind: {}",
            task.kind.type_name()
        ))
        .with_code("unsupported_task_type");
        warn!(task_id = %task_id, kind = task.kind.type_name(), "no workload for task");
        if let Err(e) = store.update(task_id, TaskPatch::fail(failure)).await {
            error!(task_id = %task_id, error = %e, "failed to record missing-workload error");
        }
        return;
    };

    info!(task_id = %task_id, kind = task.kind.type_name(), "executor started");

    // Hard platform ceiling. On expiry the task is left Processing at its
    // last checkpoint; the poller's attempt ceiling and the orphan sweep are
    // the backstops.
    let ceiling = task.config.timeout;
    let outcome = tokio::time::timeout(
        ceiling,
        run_steps(store.as_ref(), workload.as_mut(), &task, &config),
    )
    .await;

    match outcome {
        Err(_elapsed) => {
            warn!(
                task_id = %task_id,
                ceiling_secs = ceiling.as_secs(),
                "execution ceiling exceeded; leaving last checkpoint in place"
            );
        }
        Ok(StepLoopOutcome::Completed(result)) => {
            match store.update(task_id, TaskPatch::complete(result)).await {
                Ok(completed) => {
                    info!(task_id = %task_id, "task completed");
                    if let Err(e) = notifier.notify(&completed).await {
                        warn!(task_id = %task_id, error = %e, "completion notification failed");
                    }
                }
                Err(e) => {
                    // Most likely cancelled between the last checkpoint and
                    // the terminal write; the cancellation wins.
                    debug!(task_id = %task_id, error = %e, "could not record completion");
                }
            }
        }
        Ok(StepLoopOutcome::Failed(err)) => {
            warn!(task_id = %task_id, error = %err, retryable = err.retryable, "task failed");
            if let Err(e) = store
                .update(task_id, TaskPatch::fail(TaskFailure::from(&err)))
                .await
            {
                debug!(task_id = %task_id, error = %e, "could not record failure");
            }
        }
        Ok(StepLoopOutcome::Cancelled) => {
            info!(task_id = %task_id, "cancellation observed at step boundary");
        }
        Ok(StepLoopOutcome::Lost) => {
            debug!(task_id = %task_id, "task record disappeared mid-run");
        }
    }
}

async fn run_steps(
    store: &dyn TaskStore,
    workload: &mut dyn Workload,
    task: &Task,
    config: &ExecutorConfig,
) -> StepLoopOutcome {
    let steps = workload.steps();
    let total = steps.len().max(1);
    let estimate = workload.estimate();
    let max_retries = task.metadata.max_retries;

    let mut final_result = JsonValue::Null;
    let mut retries = 0u32;
    let mut index = 0usize;

    while index < steps.len() {
        // Step boundaries are the only suspension points where external
        // cancellation is observed.
        match store.get(task.id).await {
            Ok(current) if current.status == TaskStatus::Cancelled => {
                return StepLoopOutcome::Cancelled;
            }
            Ok(_) => {}
            Err(_) => return StepLoopOutcome::Lost,
        }

        let name = steps[index].clone();
        let pct_before = (index * 100 / total) as u8;
        if store
            .update(task.id, TaskPatch::checkpoint(name.clone(), pct_before))
            .await
            .is_err()
        {
            return StepLoopOutcome::Lost;
        }

        let started = Instant::now();
        match workload.run_step(index).await {
            Ok(output) => {
                if let Some(value) = output {
                    final_result = value;
                }
                let completed = index + 1;
                let pct = (completed * 100 / total) as u8;
                let remaining = estimate.map(|total_est| {
                    total_est.mul_f64((total - completed) as f64 / total as f64)
                });
                let record = StepRecord {
                    name: name.clone(),
                    status: StepStatus::Completed,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                let patch = TaskPatch::checkpoint(name.clone(), pct)
                    .with_step(record)
                    .with_estimated_remaining(remaining);
                if store.update(task.id, patch).await.is_err() {
                    return StepLoopOutcome::Lost;
                }
                debug!(task_id = %task.id, step = %name, percentage = pct, "checkpoint");
                index += 1;
            }
            Err(err) if err.retryable && retries < max_retries => {
                retries += 1;
                warn!(
                    task_id = %task.id,
                    step = %name,
                    attempt = retries,
                    error = %err,
                    "retryable step failure; re-running step"
                );
                if store.update(task.id, TaskPatch::retry_bump()).await.is_err() {
                    return StepLoopOutcome::Lost;
                }
                tokio::time::sleep(config.retry_base_delay * retries).await;
            }
            Err(err) => {
                let record = StepRecord {
                    name: name.clone(),
                    status: StepStatus::Failed,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                let _ = store
                    .update(
                        task.id,
                        TaskPatch::checkpoint(name, pct_before).with_step(record),
                    )
                    .await;
                return StepLoopOutcome::Failed(err);
            }
        }
    }

    StepLoopOutcome::Completed(final_result)
}
