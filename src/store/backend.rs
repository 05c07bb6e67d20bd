//! `object_store`-backed adapter (S3 in production, in-memory in tests).

use super::{ObjectLength, ObjectStoreAdapter, ObjectTags};
use crate::error::{MirrorError, StoreError};
use crate::staging::StagingFile;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMultipartOpts, PutOptions, PutPayload, TagSet, WriteMultipart};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Bodies at or above this size are uploaded in parts
pub const MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024; // 8MB

/// Size of each multipart part
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Parts allowed in flight per upload
const MAX_CONCURRENT_PARTS: usize = 4;

/// Read buffer when streaming the staging file into a multipart upload
const COPY_BUFFER_SIZE: usize = 256 * 1024; // 256KB

/// Connection settings for an S3 destination
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// S3-compatible endpoint; `None` uses AWS
    pub endpoint: Option<String>,
}

/// Object store adapter holding one client per destination bucket.
#[derive(Clone)]
pub struct ObjectStoreBackend {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
    multipart_threshold: u64,
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("buckets", &self.stores.keys().collect::<Vec<_>>())
            .field("multipart_threshold", &self.multipart_threshold)
            .finish()
    }
}

impl Default for ObjectStoreBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStoreBackend {
    pub fn new() -> Self {
        Self {
            stores: HashMap::new(),
            multipart_threshold: MULTIPART_THRESHOLD,
        }
    }

    /// Build an S3 client for one bucket. Credentials come from the usual AWS
    /// environment variables.
    pub fn s3(settings: &S3Settings) -> Result<Self, MirrorError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder.build().map_err(|e| MirrorError::StoreSetup {
            bucket: settings.bucket.clone(),
            message: e.to_string(),
        })?;

        Ok(Self::new().with_store(settings.bucket.clone(), Arc::new(store)))
    }

    pub fn with_store(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), store);
        self
    }

    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    fn store(&self, bucket: &str) -> Result<&Arc<dyn ObjectStore>, StoreError> {
        self.stores
            .get(bucket)
            .ok_or_else(|| StoreError::UnknownBucket {
                bucket: bucket.to_string(),
            })
    }
}

fn object_path(key: &str) -> Result<ObjectPath, StoreError> {
    ObjectPath::parse(key).map_err(|e| StoreError::InvalidKey {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn tag_set(tags: Option<&ObjectTags>) -> TagSet {
    let mut set = TagSet::default();
    if let Some(tags) = tags {
        for (key, value) in tags.iter() {
            set.push(key, value);
        }
    }
    set
}

fn upload_error(key: &str, err: object_store::Error) -> StoreError {
    StoreError::Upload {
        key: key.to_string(),
        message: err.to_string(),
    }
}

fn staging_error(key: &str, source: std::io::Error) -> StoreError {
    StoreError::Staging {
        key: key.to_string(),
        source,
    }
}

impl ObjectStoreBackend {
    async fn upload_single(
        &self,
        store: &Arc<dyn ObjectStore>,
        path: &ObjectPath,
        key: &str,
        source: &mut StagingFile,
        tags: TagSet,
    ) -> Result<(), StoreError> {
        let body = Bytes::from(source.read_to_end().await.map_err(|e| staging_error(key, e))?);
        tracing::debug!(key, bytes = body.len(), "single-part upload");
        let opts = PutOptions {
            tags,
            ..Default::default()
        };
        store
            .put_opts(path, PutPayload::from(body), opts)
            .await
            .map_err(|e| upload_error(key, e))?;
        Ok(())
    }

    async fn upload_multipart(
        &self,
        store: &Arc<dyn ObjectStore>,
        path: &ObjectPath,
        key: &str,
        source: &mut StagingFile,
        tags: TagSet,
    ) -> Result<(), StoreError> {
        let opts = PutMultipartOpts {
            tags,
            ..Default::default()
        };
        let upload = store
            .put_multipart_opts(path, opts)
            .await
            .map_err(|e| upload_error(key, e))?;
        let writer = WriteMultipart::new_with_chunk_size(upload, PART_SIZE);
        stream_parts(writer, key, source).await
    }
}

/// Copy the staging file into `writer` and complete the upload. Any failure
/// before completion aborts the upload so no orphaned parts are left behind.
async fn stream_parts(
    mut writer: WriteMultipart,
    key: &str,
    source: &mut StagingFile,
) -> Result<(), StoreError> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let n = match source.read_chunk(&mut buf).await {
            Ok(n) => n,
            Err(e) => return Err(abort_upload(writer, key, staging_error(key, e)).await),
        };
        if n == 0 {
            break;
        }
        if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
            return Err(abort_upload(writer, key, upload_error(key, e)).await);
        }
        writer.write(&buf[..n]);
    }

    // finish() gives up the writer, so settle in-flight parts first
    if let Err(e) = writer.wait_for_capacity(0).await {
        return Err(abort_upload(writer, key, upload_error(key, e)).await);
    }
    writer.finish().await.map_err(|e| upload_error(key, e))?;
    Ok(())
}

async fn abort_upload(writer: WriteMultipart, key: &str, err: StoreError) -> StoreError {
    tracing::debug!(key, error = %err, "aborting multipart upload");
    if let Err(abort_err) = writer.abort().await {
        tracing::warn!(key, error = %abort_err, "failed to abort multipart upload");
    }
    err
}

#[async_trait]
impl ObjectStoreAdapter for ObjectStoreBackend {
    async fn length_of(&self, bucket: &str, key: &str) -> Result<ObjectLength, StoreError> {
        let store = self.store(bucket)?;
        let path = object_path(key)?;

        match store.head(&path).await {
            Ok(meta) => Ok(ObjectLength::Present(meta.size)),
            Err(object_store::Error::NotFound { .. }) => Ok(ObjectLength::Absent),
            Err(e) => Err(StoreError::Head {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        source: &mut StagingFile,
        tags: Option<&ObjectTags>,
    ) -> Result<(), StoreError> {
        let store = self.store(bucket)?;
        let path = object_path(key)?;

        source.rewind().await.map_err(|e| staging_error(key, e))?;
        let len = source.len().await.map_err(|e| staging_error(key, e))?;
        let tags = tag_set(tags);

        if len < self.multipart_threshold {
            self.upload_single(store, &path, key, source, tags).await
        } else {
            tracing::debug!(key, bytes = len, "multipart upload");
            self.upload_multipart(store, &path, key, source, tags).await
        }
    }
}
