//! The smart polling controller.
//!
//! One cooperative loop per task: an immediate first query, tiered
//! exponential backoff between steady-state polls, a fixed retry delay for
//! transient query errors, an attempt ceiling, and an injected visibility
//! signal that scales the interval while backgrounded and triggers an
//! immediate out-of-band poll on return to the foreground.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, warn};

use longrun_core::{TaskId, TaskStatus};

use crate::backoff::steady_interval;
use crate::source::{QueryError, StatusSource, TaskSnapshot};

/// Polling controller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval before the first backoff tier kicks in.
    pub base_interval: Duration,
    pub backoff_multiplier: f64,
    /// How many polls share an interval before it grows.
    pub attempts_per_tier: u32,
    pub max_interval: Duration,
    /// Client-side ceiling, independent of the executor's wall-clock ceiling.
    pub max_attempts: u32,
    /// Interval scale while the environment is backgrounded.
    pub hidden_multiplier: f64,
    /// Fixed wait after a transient query error (distinct from the steady
    /// interval).
    pub retry_delay: Duration,
    /// Halt immediately on a transient query error instead of retrying.
    pub stop_on_error: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            attempts_per_tier: 5,
            max_interval: Duration::from_secs(30),
            max_attempts: 150,
            hidden_multiplier: 2.0,
            retry_delay: Duration::from_secs(5),
            stop_on_error: false,
        }
    }
}

/// Observable controller state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PollerState {
    pub attempt_count: u32,
    pub is_polling: bool,
    pub last_polled_at: Option<DateTime<Utc>>,
    /// When the next steady-state query is due; `None` once polling stops.
    pub next_poll_at: Option<DateTime<Utc>>,
    pub current_interval: Option<Duration>,
}

impl Default for PollerState {
    fn default() -> Self {
        Self {
            attempt_count: 0,
            is_polling: true,
            last_polled_at: None,
            next_poll_at: None,
            current_interval: None,
        }
    }
}

/// Terminal snapshot delivered exactly once to the caller.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// Task completed (or was already consumed by another reader).
    Completed(TaskSnapshot),
    Failed(TaskSnapshot),
    Cancelled(TaskSnapshot),
}

/// Client-side polling failure. `Exhausted` is purely a client signal: the
/// server-side task may still be running, and the same id can be polled
/// again later.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("polling exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("task not found")]
    NotFound,
    #[error("polling halted: {0}")]
    Halted(QueryError),
    #[error("polling stopped by caller")]
    Stopped,
}

enum Command {
    Cancel,
    ForcePoll,
}

/// Handle to a running polling loop.
pub struct PollerHandle {
    state: Arc<RwLock<PollerState>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    join: tokio::task::JoinHandle<Result<PollOutcome, PollError>>,
}

impl PollerHandle {
    pub async fn state(&self) -> PollerState {
        self.state.read().await.clone()
    }

    /// Stop polling. Clears any pending wait; never touches the server-side
    /// task status (cancelling the task itself is a store operation).
    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(Command::Cancel);
    }

    /// Manual refresh: clears the pending wait, queries immediately and
    /// reschedules from that point.
    pub fn force_poll(&self) {
        let _ = self.cmd_tx.send(Command::ForcePoll);
    }

    /// Await the final outcome.
    pub async fn join(self) -> Result<PollOutcome, PollError> {
        self.join.await.unwrap_or(Err(PollError::Stopped))
    }
}

pub struct Poller;

impl Poller {
    /// Start polling a task. The first query is issued immediately, with no
    /// initial delay. `visibility` is the externally-supplied
    /// foreground(`true`)/background(`false`) signal.
    pub fn start(
        source: Arc<dyn StatusSource>,
        id: TaskId,
        config: PollerConfig,
        visibility: watch::Receiver<bool>,
    ) -> PollerHandle {
        let state = Arc::new(RwLock::new(PollerState::default()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let loop_state = state.clone();

        let join = tokio::spawn(async move {
            let result = run(source, id, config, visibility, cmd_rx, loop_state.clone()).await;
            let mut state = loop_state.write().await;
            state.is_polling = false;
            state.next_poll_at = None;
            result
        });

        PollerHandle {
            state,
            cmd_tx,
            join,
        }
    }
}

async fn run(
    source: Arc<dyn StatusSource>,
    id: TaskId,
    config: PollerConfig,
    mut visibility: watch::Receiver<bool>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    state: Arc<RwLock<PollerState>>,
) -> Result<PollOutcome, PollError> {
    // Guards exactly-once delivery even if a stale query re-observes the
    // same terminal snapshot.
    let delivered = AtomicBool::new(false);
    let mut attempts: u32 = 0;
    let mut vis_alive = true;
    let mut cmd_alive = true;

    loop {
        // Single-flight: this is the only query in flight for the task; a
        // tick cannot overlap it because scheduling resumes only after the
        // response is handled.
        state.write().await.last_polled_at = Some(Utc::now());
        let query = source.fetch(id).await;
        attempts += 1;
        state.write().await.attempt_count = attempts;

        let wait = match query {
            Ok(snapshot) if !snapshot.continue_poll && snapshot.status.is_terminal() => {
                if delivered.swap(true, Ordering::SeqCst) {
                    return Err(PollError::Stopped);
                }
                debug!(task_id = %id, status = %snapshot.status, attempts, "terminal snapshot");
                return Ok(match snapshot.status {
                    TaskStatus::Failed => PollOutcome::Failed(snapshot),
                    TaskStatus::Cancelled => PollOutcome::Cancelled(snapshot),
                    _ => PollOutcome::Completed(snapshot),
                });
            }
            Ok(snapshot) => {
                // Same lastUpdatedAt as the previous poll is fine: the
                // continuation predicate is idempotent and was re-evaluated.
                debug!(
                    task_id = %id,
                    status = %snapshot.status,
                    percentage = snapshot.progress.percentage,
                    attempts,
                    "still in progress"
                );
                if attempts >= config.max_attempts {
                    return Err(PollError::Exhausted { attempts });
                }
                let interval = steady_interval(
                    config.base_interval,
                    config.backoff_multiplier,
                    config.attempts_per_tier,
                    config.max_interval,
                    attempts,
                );
                let hidden = vis_alive && !*visibility.borrow();
                if hidden {
                    interval.mul_f64(config.hidden_multiplier)
                } else {
                    interval
                }
            }
            Err(QueryError::NotFound) => return Err(PollError::NotFound),
            Err(err @ QueryError::Transient(_)) => {
                if config.stop_on_error {
                    return Err(PollError::Halted(err));
                }
                warn!(task_id = %id, error = %err, "transient query error; will retry");
                if attempts >= config.max_attempts {
                    return Err(PollError::Exhausted { attempts });
                }
                config.retry_delay
            }
        };

        {
            let mut state = state.write().await;
            state.current_interval = Some(wait);
            state.next_poll_at = chrono::Duration::from_std(wait)
                .ok()
                .map(|delta| Utc::now() + delta);
        }

        // Interruptible wait: a foreground transition or force-poll cuts it
        // short; cancel ends the loop.
        let sleep = tokio::time::sleep(wait);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                changed = visibility.changed(), if vis_alive => {
                    match changed {
                        Ok(()) if *visibility.borrow() => {
                            debug!(task_id = %id, "foreground transition; immediate poll");
                            break;
                        }
                        Ok(()) => {} // went hidden; current wait stands
                        Err(_) => vis_alive = false,
                    }
                }
                cmd = cmd_rx.recv(), if cmd_alive => {
                    match cmd {
                        Some(Command::Cancel) => return Err(PollError::Stopped),
                        Some(Command::ForcePoll) => break,
                        None => cmd_alive = false,
                    }
                }
            }
        }
    }
}
