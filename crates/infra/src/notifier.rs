//! Completion notification hook.
//!
//! Single-shot, at-least-once: the executor invokes the notifier once after
//! a task completes and logs any failure without retrying. The client poller
//! remains the reliable delivery path regardless of notifier outcome.

use async_trait::async_trait;
use serde_json::json;

use longrun_core::Task;

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// On-completion notifier capability.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, task: &Task) -> Result<(), NotifyError>;
}

/// Default notifier: records the completion in the log stream.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl CompletionNotifier for LoggingNotifier {
    async fn notify(&self, task: &Task) -> Result<(), NotifyError> {
        tracing::info!(task_id = %task.id, status = %task.status, "task reached terminal state");
        Ok(())
    }
}

/// Posts the terminal snapshot to a configured webhook URL. One attempt;
/// delivery failures surface as `NotifyError` for the executor to log.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl CompletionNotifier for WebhookNotifier {
    async fn notify(&self, task: &Task) -> Result<(), NotifyError> {
        let body = json!({
            "id": task.id,
            "status": task.status,
            "result": task.result,
            "error": task.error,
            "completed_at": task.timestamps.completed_at,
        });
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(())
    }
}
