//! Destination side of a transfer: the object store.

pub mod backend;
pub mod tags;

use crate::error::StoreError;
use crate::staging::StagingFile;
use async_trait::async_trait;

pub use backend::{ObjectStoreBackend, S3Settings};
pub use tags::{ObjectTags, DEFAULT_TAG_PREFIX};

/// Size of a stored object, or its absence.
///
/// A missing object is the common case on a first run, so it is a value and
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLength {
    Present(u64),
    Absent,
}

/// Object store operations used by the reconciler.
///
/// Destination probes and uploads are single authoritative attempts; callers
/// never retry them.
#[async_trait]
pub trait ObjectStoreAdapter: Send + Sync {
    /// Report the stored length of `bucket/key`.
    async fn length_of(&self, bucket: &str, key: &str) -> Result<ObjectLength, StoreError>;

    /// Upload the staged body to `bucket/key`, attaching `tags` with the write.
    /// The adapter rewinds `source` before reading it.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        source: &mut StagingFile,
        tags: Option<&ObjectTags>,
    ) -> Result<(), StoreError>;
}
