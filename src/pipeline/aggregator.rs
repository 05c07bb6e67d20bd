//! Result aggregation.
//!
//! The aggregator is the only consumer of the outcome channel and the only
//! owner of the run tallies, so nothing here needs a lock. It observes the
//! run; it never influences it.

use crate::pipeline::channel::{OutcomeReceiver, OutcomeStatus, RunStats, TransferOutcome};
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Consumes outcomes and reports progress on stderr.
pub struct Aggregator {
    progress: ProgressBar,
    stats: RunStats,
    /// Every outcome seen, when the caller asked for them
    retained: Option<Vec<TransferOutcome>>,
}

/// What the aggregator hands back once the outcome channel closes.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stats: RunStats,
    /// Empty unless [`Aggregator::retain_outcomes`] was set
    pub outcomes: Vec<TransferOutcome>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    /// Aggregator with a live spinner on stderr.
    pub fn new() -> Self {
        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress.enable_steady_tick(Duration::from_millis(120));
        Self::with_progress(progress)
    }

    /// Aggregator that draws nothing (tests, non-interactive runs).
    pub fn hidden() -> Self {
        Self::with_progress(ProgressBar::hidden())
    }

    fn with_progress(progress: ProgressBar) -> Self {
        let aggregator = Self {
            progress,
            stats: RunStats::new(),
            retained: None,
        };
        aggregator.progress.set_message(aggregator.stats.to_string());
        aggregator
    }

    /// Keep every outcome for the final report.
    pub fn retain_outcomes(mut self) -> Self {
        self.retained = Some(Vec::new());
        self
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Record one outcome, printing failure and warning detail immediately.
    pub fn record(&mut self, outcome: &TransferOutcome) {
        self.stats.record(outcome);

        match (&outcome.status, &outcome.warning) {
            (OutcomeStatus::Failed { error }, _) => {
                tracing::debug!(command = %outcome.command, %error, "item failed");
                self.report_line("FAILED".red().bold(), outcome, error);
            }
            (_, Some(warning)) => {
                tracing::debug!(command = %outcome.command, %warning, "item warned");
                self.report_line("WARNING".yellow().bold(), outcome, warning);
            }
            _ => {}
        }

        self.progress.set_message(self.stats.to_string());
        self.progress.tick();
    }

    /// Print a detail line above the spinner. Goes to stderr even when the
    /// spinner itself is not drawn.
    fn report_line(&self, tag: ColoredString, outcome: &TransferOutcome, detail: &str) {
        self.progress.suspend(|| {
            eprintln!(
                "{} {}: {}\n    {}",
                tag,
                outcome.command.label(),
                detail,
                outcome.command
            );
        });
    }

    /// Drain the outcome channel until every worker has finished.
    pub async fn run(mut self, mut rx: OutcomeReceiver) -> RunReport {
        while let Some(outcome) = rx.recv().await {
            self.record(&outcome);
            if let Some(retained) = self.retained.as_mut() {
                retained.push(outcome);
            }
        }
        self.finish()
    }

    /// Stop the spinner and hand back the tallies.
    pub fn finish(self) -> RunReport {
        self.progress.finish_and_clear();
        RunReport {
            stats: self.stats,
            outcomes: self.retained.unwrap_or_default(),
        }
    }
}

/// Final report line, colored by the worst status seen.
pub fn summary_line(stats: &RunStats) -> String {
    let line = format!(
        "Done: {} ({} items, {} bytes transferred)",
        stats,
        stats.total(),
        stats.bytes_transferred
    );
    if stats.failed > 0 {
        line.red().to_string()
    } else if stats.warned > 0 {
        line.yellow().to_string()
    } else {
        line.green().to_string()
    }
}
