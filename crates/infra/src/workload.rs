//! The collaborator contract: an opaque "do the work" function per task kind,
//! resumable at step granularity so executor checkpoints are meaningful.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use longrun_core::{Task, TaskFailure};

/// Error returned by a workload step.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct WorkError {
    pub message: String,
    pub code: Option<String>,
    /// Network/timeout class failures are retryable; validation and
    /// business-logic failures are not.
    pub retryable: bool,
}

impl WorkError {
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

impl From<&WorkError> for TaskFailure {
    fn from(err: &WorkError) -> Self {
        Self {
            message: err.message.clone(),
            code: err.code.clone(),
            retryable: err.retryable,
        }
    }
}

/// A unit of long-running work, executed as an ordered sequence of named
/// steps. The executor checkpoints after each step, so implementations must
/// keep any cross-step state inside `self`.
#[async_trait]
pub trait Workload: Send {
    /// Ordered step names. Progress percentage is `completed / total * 100`.
    fn steps(&self) -> Vec<String>;

    /// Execute one step. The value returned by the final step becomes the
    /// task result.
    async fn run_step(&mut self, index: usize) -> Result<Option<JsonValue>, WorkError>;

    /// Rough total-duration estimate, surfaced at submission time.
    fn estimate(&self) -> Option<Duration> {
        None
    }
}

/// Builds a fresh workload instance for one task execution.
pub type WorkloadFactory = Box<dyn Fn(&Task) -> Box<dyn Workload> + Send + Sync>;

/// Routes task kinds to workload factories.
///
/// Patterns resolve in order: exact match, then `prefix.*` category match,
/// then the `*` wildcard.
#[derive(Default)]
pub struct WorkloadRegistry {
    factories: HashMap<String, WorkloadFactory>,
}

impl WorkloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, pattern: impl Into<String>, factory: F)
    where
        F: Fn(&Task) -> Box<dyn Workload> + Send + Sync + 'static,
    {
        self.factories.insert(pattern.into(), Box::new(factory));
    }

    /// The registered patterns, sorted (the submission endpoint reports
    /// these on an unsupported-type error).
    pub fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn supports(&self, type_name: &str) -> bool {
        self.resolve(type_name).is_some()
    }

    /// Build a workload for the task, or `None` if its kind is unrecognized.
    pub fn instantiate(&self, task: &Task) -> Option<Box<dyn Workload>> {
        self.resolve(task.kind.type_name()).map(|f| f(task))
    }

    fn resolve(&self, type_name: &str) -> Option<&WorkloadFactory> {
        if let Some(f) = self.factories.get(type_name) {
            return Some(f);
        }
        for (pattern, factory) in &self.factories {
            if let Some(prefix) = pattern.strip_suffix(".*") {
                if type_name.starts_with(prefix) {
                    return Some(factory);
                }
            }
        }
        self.factories.get("*")
    }
}

/// Shape of the input payload accepted by [`SimulatedWorkload`].
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSpec {
    #[serde(default = "SimulationSpec::default_steps")]
    pub steps: usize,
    #[serde(default = "SimulationSpec::default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Zero-based index of a step that fails.
    #[serde(default)]
    pub fail_at_step: Option<usize>,
    #[serde(default)]
    pub fail_retryable: bool,
    /// How many times the failing step fails before succeeding.
    /// `None` means it fails on every attempt.
    #[serde(default)]
    pub fail_times: Option<u32>,
    #[serde(default)]
    pub result: Option<JsonValue>,
}

impl SimulationSpec {
    fn default_steps() -> usize {
        4
    }

    fn default_step_delay_ms() -> u64 {
        50
    }
}

impl Default for SimulationSpec {
    fn default() -> Self {
        Self {
            steps: Self::default_steps(),
            step_delay_ms: Self::default_step_delay_ms(),
            fail_at_step: None,
            fail_retryable: false,
            fail_times: None,
            result: None,
        }
    }
}

/// A scripted workload driven entirely by the task's input payload. Used by
/// the demo task kinds and by executor/poller tests.
pub struct SimulatedWorkload {
    spec: SimulationSpec,
    failures_injected: u32,
}

impl SimulatedWorkload {
    pub fn from_input(input: &JsonValue) -> Self {
        let spec = serde_json::from_value(input.clone()).unwrap_or_default();
        Self {
            spec,
            failures_injected: 0,
        }
    }
}

#[async_trait]
impl Workload for SimulatedWorkload {
    fn steps(&self) -> Vec<String> {
        (1..=self.spec.steps.max(1))
            .map(|i| format!("step-{i}"))
            .collect()
    }

    async fn run_step(&mut self, index: usize) -> Result<Option<JsonValue>, WorkError> {
        tokio::time::sleep(Duration::from_millis(self.spec.step_delay_ms)).await;

        if self.spec.fail_at_step == Some(index) {
            let keep_failing = match self.spec.fail_times {
                None => true,
                Some(times) => self.failures_injected < times,
            };
            if keep_failing {
                self.failures_injected += 1;
                let err = format!("injected failure at step {index}");
                return Err(if self.spec.fail_retryable {
                    WorkError::transient(err)
                } else {
                    WorkError::terminal(err).with_code("simulated")
                });
            }
        }

        if index + 1 == self.spec.steps.max(1) {
            let result = self.spec.result.clone().unwrap_or_else(|| {
                serde_json::json!({ "steps_completed": self.spec.steps.max(1) })
            });
            Ok(Some(result))
        } else {
            Ok(None)
        }
    }

    fn estimate(&self) -> Option<Duration> {
        Some(Duration::from_millis(
            self.spec.step_delay_ms * self.spec.steps.max(1) as u64,
        ))
    }
}
