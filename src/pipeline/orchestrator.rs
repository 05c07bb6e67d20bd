//! Pipeline orchestration.
//!
//! Owns the worker pool and both channels for the lifetime of one run:
//!
//! ```text
//! Filling   feeder pushing commands, workers and aggregator running
//! Draining  manifest exhausted, work channel closed, workers finishing
//! Closed    workers joined, outcome channel closed, aggregator done
//! ```
//!
//! The manifest reader is synchronous, so the feeder runs on the blocking
//! pool and hands commands over with `send_blocking`. Dropping its sender is
//! what closes the work channel.

use crate::error::{ManifestError, Result};
use crate::pipeline::aggregator::{Aggregator, RunReport};
use crate::pipeline::channel::{
    command_channel, outcome_channel, CommandReceiver, CommandSender, OutcomeSender,
    TransferCommand,
};
use crate::pipeline::reconciler::Reconciler;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Filling,
    Draining,
    Closed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Filling => "filling",
            RunPhase::Draining => "draining",
            RunPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Drives commands through a fixed pool of reconciling workers.
pub struct Orchestrator {
    reconciler: Arc<Reconciler>,
    workers: usize,
    phase: watch::Sender<RunPhase>,
}

impl Orchestrator {
    /// `workers` is clamped to at least one.
    pub fn new(reconciler: Reconciler, workers: usize) -> Self {
        let (phase, _) = watch::channel(RunPhase::Closed);
        Self {
            reconciler: Arc::new(reconciler),
            workers: workers.max(1),
            phase,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Watch phase transitions of the current or next run.
    pub fn phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: RunPhase) {
        tracing::debug!(%phase, "pipeline phase");
        self.phase.send_replace(phase);
    }

    /// Run every command to an outcome.
    ///
    /// Item failures are tallied in the report. The only errors returned are
    /// a manifest that cannot be read and a pipeline task that panicked. On a
    /// manifest error, commands already handed out still finish and are
    /// reported before the error is returned.
    pub async fn run<I>(&self, commands: I, aggregator: Aggregator) -> Result<RunReport>
    where
        I: IntoIterator<Item = std::result::Result<TransferCommand, ManifestError>>,
        I::IntoIter: Send + 'static,
    {
        let (work_tx, work_rx) = command_channel();
        let (outcome_tx, outcome_rx) = outcome_channel();

        self.enter(RunPhase::Filling);
        let aggregator = tokio::spawn(aggregator.run(outcome_rx));

        let workers: Vec<_> = (0..self.workers)
            .map(|id| {
                tokio::spawn(work(
                    id,
                    self.reconciler.clone(),
                    work_rx.clone(),
                    outcome_tx.clone(),
                ))
            })
            .collect();
        // Workers hold the only receivers and senders from here on
        drop(work_rx);
        drop(outcome_tx);

        let commands = commands.into_iter();
        let fed = tokio::task::spawn_blocking(move || feed(commands, work_tx)).await?;

        self.enter(RunPhase::Draining);
        let mut handled = 0;
        for worker in workers {
            handled += worker.await?;
        }

        let report = aggregator.await?;
        self.enter(RunPhase::Closed);

        let fed = fed?;
        tracing::info!(
            workers = self.workers,
            commands = fed,
            outcomes = report.stats.total(),
            "pipeline finished"
        );
        debug_assert_eq!(fed, handled);
        Ok(report)
    }
}

/// Push commands into the work channel until the manifest ends or fails.
fn feed<I>(commands: I, tx: CommandSender) -> std::result::Result<u64, ManifestError>
where
    I: Iterator<Item = std::result::Result<TransferCommand, ManifestError>>,
{
    let mut fed = 0;
    for command in commands {
        let command = command.inspect_err(|e| {
            tracing::error!(error = %e, fed, "manifest read failed, draining in-flight items");
        })?;
        if tx.send_blocking(Arc::new(command)).is_err() {
            // Every worker is gone; nothing left to feed.
            break;
        }
        fed += 1;
    }
    Ok(fed)
}

/// One worker: take a command when idle, reconcile it, report the outcome.
async fn work(
    id: usize,
    reconciler: Arc<Reconciler>,
    rx: CommandReceiver,
    tx: OutcomeSender,
) -> u64 {
    let mut handled = 0;
    while let Ok(command) = rx.recv().await {
        let outcome = reconciler.reconcile(command).await;
        handled += 1;
        if tx.send(outcome).await.is_err() {
            tracing::warn!(worker = id, "aggregator stopped, worker exiting");
            break;
        }
    }
    tracing::debug!(worker = id, handled, "worker finished");
    handled
}
