//! Scripted collaborators for pipeline tests.

use crate::error::{StoreError, TransportError};
use crate::pipeline::channel::{TagBundle, TransferCommand};
use crate::pipeline::retry::Sleeper;
use crate::staging::StagingFile;
use crate::store::{ObjectLength, ObjectStoreAdapter, ObjectTags};
use crate::transport::{ProbeResponse, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ORIGIN: &str = "https://www.example.net";
pub const BUCKET: &str = "bucket";

pub fn command(path: &str) -> Arc<TransferCommand> {
    Arc::new(TransferCommand {
        source_url: format!("{ORIGIN}/{path}"),
        destination_bucket: BUCKET.to_string(),
        destination_key: format!("media/{path}"),
        tags: Some(TagBundle {
            id: path.to_string(),
            title: format!("Title of {path}"),
            ..Default::default()
        }),
    })
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// One scripted probe reply
#[derive(Debug, Clone, Copy)]
pub enum FakeProbe {
    Reply(ProbeResponse),
    Unreachable,
}

#[derive(Debug, Clone, Default)]
struct FakeSource {
    /// Replies in order; the last one repeats
    probes: VecDeque<FakeProbe>,
    body: Vec<u8>,
    /// Fetches that fail before one succeeds
    fetch_failures: u32,
}

/// Origin that serves scripted bodies and probe replies.
#[derive(Debug, Default)]
pub struct FakeTransport {
    sources: Mutex<HashMap<String, FakeSource>>,
    pub probe_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `path`, probing as 200 with its length.
    pub fn with_body(self, path: &str, body: Vec<u8>) -> Self {
        let reply = FakeProbe::Reply(ProbeResponse::new(200, Some(body.len() as u64)));
        self.sources.lock().unwrap().insert(
            format!("{ORIGIN}/{path}"),
            FakeSource {
                probes: VecDeque::from([reply]),
                body,
                fetch_failures: 0,
            },
        );
        self
    }

    pub fn with_probes(self, path: &str, probes: Vec<FakeProbe>) -> Self {
        self.sources
            .lock()
            .unwrap()
            .entry(format!("{ORIGIN}/{path}"))
            .or_default()
            .probes = probes.into();
        self
    }

    pub fn with_fetch_failures(self, path: &str, failures: u32) -> Self {
        self.sources
            .lock()
            .unwrap()
            .entry(format!("{ORIGIN}/{path}"))
            .or_default()
            .fetch_failures = failures;
        self
    }

    pub fn probes(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn probe(&self, url: &str) -> Result<ProbeResponse, TransportError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let mut sources = self.sources.lock().unwrap();
        let reply = match sources.get_mut(url) {
            Some(source) if source.probes.len() > 1 => source.probes.pop_front(),
            Some(source) => source.probes.front().copied(),
            None => None,
        };
        match reply {
            Some(FakeProbe::Reply(response)) => Ok(response),
            Some(FakeProbe::Unreachable) => Err(TransportError::Request {
                method: "HEAD",
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
            None => Ok(ProbeResponse::new(404, None)),
        }
    }

    async fn fetch(&self, url: &str, sink: &mut StagingFile) -> Result<u64, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let body = {
            let mut sources = self.sources.lock().unwrap();
            let Some(source) = sources.get_mut(url) else {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            };
            if source.fetch_failures > 0 {
                source.fetch_failures -= 1;
                return Err(TransportError::ShortRead {
                    url: url.to_string(),
                    copied: 1,
                    declared: source.body.len() as u64,
                });
            }
            source.body.clone()
        };

        let io_error = |source| TransportError::Io {
            url: url.to_string(),
            source,
        };
        sink.reset().await.map_err(io_error)?;
        if body.is_empty() {
            return Err(TransportError::Empty {
                url: url.to_string(),
            });
        }
        sink.write_chunk(&body).await.map_err(io_error)?;
        sink.flush().await.map_err(io_error)?;
        Ok(body.len() as u64)
    }
}

/// One upload seen by [`FakeStore`]
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub key: String,
    pub body: Vec<u8>,
    pub tags: Option<ObjectTags>,
}

/// Object store keeping lengths in memory and recording every upload.
#[derive(Debug, Default)]
pub struct FakeStore {
    pub objects: Mutex<HashMap<String, u64>>,
    pub uploads: Mutex<Vec<RecordedUpload>>,
    pub fail_head: bool,
    pub fail_upload: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, path: &str, length: u64) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("media/{path}"), length);
        self
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn uploads_for(&self, path: &str) -> Vec<RecordedUpload> {
        let key = format!("media/{path}");
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.key == key)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStoreAdapter for FakeStore {
    async fn length_of(&self, _bucket: &str, key: &str) -> Result<ObjectLength, StoreError> {
        if self.fail_head {
            return Err(StoreError::Head {
                key: key.to_string(),
                message: "access denied".to_string(),
            });
        }
        Ok(match self.objects.lock().unwrap().get(key) {
            Some(len) => ObjectLength::Present(*len),
            None => ObjectLength::Absent,
        })
    }

    async fn upload(
        &self,
        _bucket: &str,
        key: &str,
        source: &mut StagingFile,
        tags: Option<&ObjectTags>,
    ) -> Result<(), StoreError> {
        if self.fail_upload {
            return Err(StoreError::Upload {
                key: key.to_string(),
                message: "slow down".to_string(),
            });
        }
        let staging_error = |source| StoreError::Staging {
            key: key.to_string(),
            source,
        };
        source.rewind().await.map_err(staging_error)?;
        let body = source.read_to_end().await.map_err(staging_error)?;

        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), body.len() as u64);
        self.uploads.lock().unwrap().push(RecordedUpload {
            key: key.to_string(),
            body,
            tags: tags.cloned(),
        });
        Ok(())
    }
}
