//! Channel and message types for the transfer pipeline.
//!
//! Manifest -> Workers -> Aggregator, joined by two channels of capacity one
//! so a worker only takes a command when it is idle.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the manifest -> worker channel
pub const WORK_CHANNEL_SIZE: usize = 1;

/// Capacity of the worker -> aggregator channel
pub const RESULT_CHANNEL_SIZE: usize = 1;

// =============================================================================
// TransferCommand: Manifest -> Worker
// =============================================================================

/// Descriptive metadata carried alongside a media item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagBundle {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub credit: String,
    pub copyright: String,
}

/// One item to reconcile. Immutable once produced by the manifest reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    /// Full URL of the source object
    pub source_url: String,

    /// Destination bucket
    pub destination_bucket: String,

    /// Destination object key
    pub destination_key: String,

    /// Tags to attach on upload
    pub tags: Option<TagBundle>,
}

impl TransferCommand {
    /// Short identifier for log and report lines.
    pub fn label(&self) -> &str {
        match &self.tags {
            Some(bundle) if !bundle.id.is_empty() => &bundle.id,
            _ => &self.destination_key,
        }
    }
}

impl fmt::Display for TransferCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> s3://{}/{}",
            self.source_url, self.destination_bucket, self.destination_key
        )
    }
}

// =============================================================================
// TransferOutcome: Worker -> Aggregator
// =============================================================================

/// Terminal status of one command. Exactly one holds per outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// New object created
    Succeeded,
    /// Existing object replaced
    Changed,
    /// Destination already current, or skipped for a non-fatal reason
    Skipped,
    /// Unrecoverable error for this item
    Failed { error: String },
}

impl OutcomeStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, OutcomeStatus::Failed { .. })
    }
}

/// Result of processing one command.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// The command this outcome answers
    pub command: Arc<TransferCommand>,

    pub status: OutcomeStatus,

    /// Non-fatal anomaly worth surfacing
    pub warning: Option<String>,

    /// Bytes uploaded to the destination (0 unless Succeeded or Changed)
    pub bytes_transferred: u64,
}

impl TransferOutcome {
    pub fn succeeded(command: Arc<TransferCommand>, bytes: u64) -> Self {
        Self {
            command,
            status: OutcomeStatus::Succeeded,
            warning: None,
            bytes_transferred: bytes,
        }
    }

    pub fn changed(command: Arc<TransferCommand>, bytes: u64) -> Self {
        Self {
            command,
            status: OutcomeStatus::Changed,
            warning: None,
            bytes_transferred: bytes,
        }
    }

    /// Destination already current.
    pub fn current(command: Arc<TransferCommand>) -> Self {
        Self {
            command,
            status: OutcomeStatus::Skipped,
            warning: None,
            bytes_transferred: 0,
        }
    }

    pub fn skipped_with_warning(command: Arc<TransferCommand>, warning: impl Into<String>) -> Self {
        Self {
            command,
            status: OutcomeStatus::Skipped,
            warning: Some(warning.into()),
            bytes_transferred: 0,
        }
    }

    pub fn failed(command: Arc<TransferCommand>, error: impl fmt::Display) -> Self {
        Self {
            command,
            status: OutcomeStatus::Failed {
                error: error.to_string(),
            },
            warning: None,
            bytes_transferred: 0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

// =============================================================================
// Channel types
// =============================================================================

/// Producer half of the work channel
pub type CommandSender = async_channel::Sender<Arc<TransferCommand>>;

/// Shared consumer half of the work channel; every worker holds a clone
pub type CommandReceiver = async_channel::Receiver<Arc<TransferCommand>>;

pub type OutcomeSender = mpsc::Sender<TransferOutcome>;

pub type OutcomeReceiver = mpsc::Receiver<TransferOutcome>;

/// Multi-consumer channel feeding commands to the worker pool
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    async_channel::bounded(WORK_CHANNEL_SIZE)
}

/// Single-consumer channel carrying outcomes to the aggregator
pub fn outcome_channel() -> (OutcomeSender, OutcomeReceiver) {
    mpsc::channel(RESULT_CHANNEL_SIZE)
}

// =============================================================================
// Run statistics
// =============================================================================

/// Per-status tallies for a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// New objects created
    pub new: u64,

    /// Existing objects replaced
    pub changed: u64,

    /// Items left alone
    pub skipped: u64,

    /// Items that failed
    pub failed: u64,

    /// Outcomes that carried a warning (a subset of `skipped`)
    pub warned: u64,

    /// Bytes uploaded
    pub bytes_transferred: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome.status {
            OutcomeStatus::Succeeded => self.new += 1,
            OutcomeStatus::Changed => self.changed += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed { .. } => self.failed += 1,
        }
        if outcome.warning.is_some() {
            self.warned += 1;
        }
        self.bytes_transferred += outcome.bytes_transferred;
    }

    /// Number of outcomes recorded
    pub fn total(&self) -> u64 {
        self.new + self.changed + self.skipped + self.failed
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed, {} warned, {} new, {} changed, {} skipped",
            self.failed, self.warned, self.new, self.changed, self.skipped
        )
    }
}
