//! Per-item reconciliation.
//!
//! Decides whether a destination object is current, missing, or stale, and
//! transfers the source when it is not current. Every call produces exactly
//! one [`TransferOutcome`]; errors never escape.
//!
//! # Decision
//!
//! ```text
//! destination absent        -> fetch + upload            -> Succeeded
//! destination present (DL)  -> HEAD source (SL)
//!     transport error                                    -> Failed
//!     status >= 500, or SL <= 0 at any status  (retried)
//!     status != 200                                      -> Skipped + warning
//!     SL == DL                                           -> Skipped
//!     SL <  DL                                           -> Skipped + warning
//!     SL >  DL              -> fetch + upload            -> Changed
//! ```

use crate::error::{ItemError, TransportError};
use crate::pipeline::channel::{TransferCommand, TransferOutcome};
use crate::pipeline::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::staging::StagingFile;
use crate::store::{ObjectLength, ObjectStoreAdapter, ObjectTags};
use crate::transport::{ProbeResponse, Transport};
use std::path::PathBuf;
use std::sync::Arc;

/// Reconciler configuration
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Directory that holds anonymous staging files
    pub staging_dir: PathBuf,
    /// Retries for the source HEAD probe
    pub probe_retry: RetryPolicy,
    /// Retries for the source body download
    pub fetch_retry: RetryPolicy,
    /// Tag key namespace; `None` disables tagging
    pub tag_prefix: Option<String>,
}

impl ReconcilerConfig {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            probe_retry: RetryPolicy::default(),
            fetch_retry: RetryPolicy::default(),
            tag_prefix: Some(crate::store::DEFAULT_TAG_PREFIX.to_string()),
        }
    }
}

/// What to do with an item whose destination already exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDecision {
    /// Lengths match; nothing to do
    Current,
    /// Source grew; replace the stored copy
    Transfer { source_length: u64 },
    /// Leave the stored copy alone, but report why
    Skip { warning: String },
    /// The probe itself failed
    Fail { error: String },
}

/// Whether a probe result is worth asking again.
pub fn probe_is_retryable(probe: &Result<ProbeResponse, TransportError>) -> bool {
    match probe {
        Ok(response) => response.is_server_error() || response.positive_length().is_none(),
        Err(_) => false,
    }
}

/// Map the final probe result and the stored length to a decision.
pub fn decide(
    url: &str,
    probe: &Result<ProbeResponse, TransportError>,
    destination_length: u64,
) -> SourceDecision {
    let response = match probe {
        Ok(response) => response,
        Err(e) => {
            return SourceDecision::Fail {
                error: e.to_string(),
            }
        }
    };

    if !response.is_ok() {
        return SourceDecision::Skip {
            warning: format!(
                "source URL {url:?} returned HEAD status {:03}",
                response.status
            ),
        };
    }

    let Some(source_length) = response.positive_length() else {
        return SourceDecision::Skip {
            warning: format!(
                "source URL {url:?} returned HEAD size {}",
                response.declared_length.unwrap_or(0)
            ),
        };
    };

    match source_length.cmp(&destination_length) {
        std::cmp::Ordering::Equal => SourceDecision::Current,
        std::cmp::Ordering::Less => SourceDecision::Skip {
            warning: format!(
                "source {url:?} shrank below the stored copy ({source_length} < {destination_length} bytes)"
            ),
        },
        std::cmp::Ordering::Greater => SourceDecision::Transfer { source_length },
    }
}

/// Reconciles one command at a time; cheap to share between workers.
#[derive(Clone)]
pub struct Reconciler {
    transport: Arc<dyn Transport>,
    store: Arc<dyn ObjectStoreAdapter>,
    sleeper: Arc<dyn Sleeper>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn ObjectStoreAdapter>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            transport,
            store,
            sleeper: Arc::new(TokioSleeper),
            config,
        }
    }

    /// Replace the delay source (tests use one that does not sleep).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Process one command to its terminal outcome.
    pub async fn reconcile(&self, cmd: Arc<TransferCommand>) -> TransferOutcome {
        let existing = match self
            .store
            .length_of(&cmd.destination_bucket, &cmd.destination_key)
            .await
        {
            Ok(length) => length,
            Err(e) => {
                tracing::warn!(key = %cmd.destination_key, error = %e, "destination probe failed");
                return TransferOutcome::failed(cmd, e);
            }
        };

        let replacing = match existing {
            ObjectLength::Absent => {
                tracing::debug!(key = %cmd.destination_key, "destination absent");
                false
            }
            ObjectLength::Present(destination_length) => {
                match self.check_source(&cmd, destination_length).await {
                    SourceDecision::Current => {
                        tracing::debug!(key = %cmd.destination_key, "destination current");
                        return TransferOutcome::current(cmd);
                    }
                    SourceDecision::Skip { warning } => {
                        tracing::debug!(key = %cmd.destination_key, %warning, "skipping");
                        return TransferOutcome::skipped_with_warning(cmd, warning);
                    }
                    SourceDecision::Fail { error } => {
                        return TransferOutcome::failed(cmd, error);
                    }
                    SourceDecision::Transfer { source_length } => {
                        tracing::debug!(
                            key = %cmd.destination_key,
                            source_length,
                            destination_length,
                            "source changed"
                        );
                        true
                    }
                }
            }
        };

        match self.transfer(&cmd).await {
            Ok(bytes) if replacing => TransferOutcome::changed(cmd, bytes),
            Ok(bytes) => TransferOutcome::succeeded(cmd, bytes),
            Err(e) => {
                tracing::warn!(key = %cmd.destination_key, error = %e, "transfer failed");
                TransferOutcome::failed(cmd, e)
            }
        }
    }

    /// HEAD the source, with retries, and compare against the stored length.
    async fn check_source(&self, cmd: &TransferCommand, destination_length: u64) -> SourceDecision {
        let url = cmd.source_url.as_str();
        let retried = self
            .config
            .probe_retry
            .run(
                self.sleeper.as_ref(),
                |attempt| {
                    if attempt > 1 {
                        tracing::warn!(url, attempt, "retrying HEAD");
                    }
                    self.transport.probe(url)
                },
                probe_is_retryable,
            )
            .await;

        if retried.exhausted {
            tracing::warn!(url, attempts = retried.attempts, "HEAD retries exhausted");
        } else if retried.attempts > 1 {
            tracing::debug!(url, attempts = retried.attempts, "HEAD settled after retries");
        }
        decide(url, &retried.value, destination_length)
    }

    /// Stage the source body locally, then publish it with its tags.
    async fn transfer(&self, cmd: &TransferCommand) -> Result<u64, ItemError> {
        let mut staging = StagingFile::create_in(&self.config.staging_dir)
            .await
            .map_err(ItemError::Staging)?;

        let mut retry = self.config.fetch_retry.start();
        let bytes = loop {
            match self.transport.fetch(&cmd.source_url, &mut staging).await {
                Ok(bytes) => break bytes,
                Err(e) => {
                    tracing::warn!(
                        url = %cmd.source_url,
                        attempt = retry.attempt(),
                        error = %e,
                        "download failed"
                    );
                    if !retry.next(self.sleeper.as_ref()).await {
                        return Err(ItemError::Download(e));
                    }
                }
            }
        };

        let tags = self
            .config
            .tag_prefix
            .as_deref()
            .and_then(|prefix| ObjectTags::for_command(prefix, cmd));

        self.store
            .upload(
                &cmd.destination_bucket,
                &cmd.destination_key,
                &mut staging,
                tags.as_ref(),
            )
            .await
            .map_err(ItemError::Upload)?;

        Ok(bytes)
    }
}
