//! `longrun-infra` — orchestration runtime: store, executor, sweeper.
//!
//! ## Design
//!
//! - The task store is the single source of truth; all mutations go through
//!   atomic per-id patches validated against the lifecycle state machine
//! - Executors are fire-and-forget tokio tasks, one per task id, bounded by
//!   a wall-clock ceiling and checkpointing after every step
//! - Cancellation is cooperative: executors observe it at step boundaries
//! - The sweeper reclaims consumed and orphaned records on demand
//!
//! ## Components
//!
//! - [`store::TaskStore`]: persistence seam (+ in-memory implementation)
//! - [`workload::Workload`]: the opaque "do the work" collaborator contract
//! - [`executor`]: claims a queued task and drives it to a terminal state
//! - [`notifier::CompletionNotifier`]: at-least-once completion hook
//! - [`sweeper`]: consumption marking and retention sweeps

pub mod executor;
pub mod notifier;
pub mod store;
pub mod sweeper;
pub mod workload;

pub use executor::{spawn_executor, ExecutorConfig, ExecutorHandle};
pub use notifier::{CompletionNotifier, LoggingNotifier, WebhookNotifier};
pub use store::{InMemoryTaskStore, StoreError, TaskPatch, TaskStore};
pub use sweeper::{consume, sweep, SweepMode, SweepReport};
pub use workload::{SimulatedWorkload, WorkError, Workload, WorkloadRegistry};
