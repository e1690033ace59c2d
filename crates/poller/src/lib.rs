//! `longrun-poller` — the client-side smart polling controller.
//!
//! A cooperative, single-flight polling loop per task: adaptive backoff,
//! an injected foreground/background visibility signal, cancel/force-poll
//! controls, and exactly-once delivery of the terminal snapshot.
//!
//! The transport is abstracted behind [`StatusSource`]; an HTTP
//! implementation against the status endpoint is provided.

pub mod backoff;
pub mod poller;
pub mod source;

pub use backoff::steady_interval;
pub use poller::{PollError, PollOutcome, Poller, PollerConfig, PollerHandle, PollerState};
pub use source::{HttpStatusSource, QueryError, StatusSource, TaskSnapshot};
