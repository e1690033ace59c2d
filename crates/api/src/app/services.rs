//! Orchestration wiring: store, workload registry, notifier, executor config.

use std::sync::Arc;
use std::time::Duration;

use longrun_core::{Task, TaskId};
use longrun_infra::{
    spawn_executor, CompletionNotifier, ExecutorConfig, ExecutorHandle, InMemoryTaskStore,
    LoggingNotifier, SimulatedWorkload, TaskStore, WebhookNotifier, Workload, WorkloadRegistry,
};

/// Shared application services, injected into handlers via `Extension`.
pub struct AppServices {
    pub store: Arc<dyn TaskStore>,
    pub registry: Arc<WorkloadRegistry>,
    pub notifier: Arc<dyn CompletionNotifier>,
    pub executor: ExecutorConfig,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<WorkloadRegistry>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
            executor: ExecutorConfig::default(),
        }
    }

    /// Fire-and-forget dispatch of the executor for a freshly created task.
    pub fn dispatch(&self, task_id: TaskId) -> ExecutorHandle {
        spawn_executor(
            self.store.clone(),
            self.registry.clone(),
            self.notifier.clone(),
            self.executor.clone(),
            task_id,
        )
    }

    /// Duration estimate surfaced in the submission response.
    pub fn estimate_for(&self, task: &Task) -> Option<Duration> {
        self.registry.instantiate(task).and_then(|w| w.estimate())
    }
}

/// Default wiring: in-memory store, demo workloads, notifier from env.
pub fn build_services() -> AppServices {
    let mut registry = WorkloadRegistry::new();
    // Scripted demo workloads; real deployments register their own kinds.
    registry.register("demo.*", |task: &Task| {
        Box::new(SimulatedWorkload::from_input(&task.input)) as Box<dyn Workload>
    });

    let notifier: Arc<dyn CompletionNotifier> = match std::env::var("LONGRUN_COMPLETION_WEBHOOK") {
        Ok(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url)),
        _ => Arc::new(LoggingNotifier),
    };

    AppServices::new(InMemoryTaskStore::arc(), Arc::new(registry), notifier)
}
