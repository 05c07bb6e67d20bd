//! Concurrent reconciling transfer pipeline.
//!
//! Three stages joined by two channels of capacity one:
//!
//! # Architecture
//!
//! ```text
//! +--------------+     +--------------+     +--------------+
//! |   Manifest   | --> |   Workers    | --> |  Aggregator  |
//! |   (feeder)   |     | (reconcile)  |     |  (tallies)   |
//! +--------------+     +--------------+     +--------------+
//!                        x N, shared
//!                        work channel
//! ```
//!
//! Only the [`Reconciler`] decides skip versus transfer, only the
//! [`Aggregator`] touches the tallies, and only the [`Orchestrator`] observes
//! the pool lifecycle.

pub mod aggregator;
pub mod channel;
pub mod orchestrator;
pub mod reconciler;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{summary_line, Aggregator, RunReport};
pub use channel::{
    command_channel, outcome_channel, CommandReceiver, CommandSender, OutcomeReceiver,
    OutcomeSender, OutcomeStatus, RunStats, TagBundle, TransferCommand, TransferOutcome,
    RESULT_CHANNEL_SIZE, WORK_CHANNEL_SIZE,
};
pub use orchestrator::{Orchestrator, RunPhase};
pub use reconciler::{decide, probe_is_retryable, Reconciler, ReconcilerConfig, SourceDecision};
pub use retry::{
    Retried, RetryPolicy, RetryState, Sleeper, TokioSleeper, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY,
};
