//! media-mirror: reconcile an HTTP-hosted media catalog into object storage.
//!
//! Items are read lazily from a manifest, reconciled by a fixed pool of
//! workers, and tallied by a single aggregator. Only missing objects and
//! objects whose source grew are transferred; equality is judged by byte
//! length alone.

pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod staging;
pub mod store;
pub mod transport;

pub use config::Config;
pub use error::{MirrorError, Result};
pub use manifest::{CommandTemplate, ManifestReader, MediaItem};
pub use pipeline::{
    Aggregator, Orchestrator, OutcomeStatus, Reconciler, RunReport, RunStats, TransferCommand,
    TransferOutcome,
};
