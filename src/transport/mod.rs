//! Source side of a transfer: the HTTP origin.
//!
//! The reconciler only sees the [`Transport`] trait, so tests can substitute a
//! scripted origin without a network.

pub mod http;

use crate::error::TransportError;
use crate::staging::StagingFile;
use async_trait::async_trait;

pub use http::{HttpTransport, HttpTransportConfig};

/// Result of a metadata-only request against a source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code
    pub status: u16,
    /// Length from the `Content-Length` header, if the server sent one
    pub declared_length: Option<u64>,
}

impl ProbeResponse {
    pub fn new(status: u16, declared_length: Option<u64>) -> Self {
        Self {
            status,
            declared_length,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Declared length as a positive value; zero-length sources are never valid.
    pub fn positive_length(&self) -> Option<u64> {
        self.declared_length.filter(|len| *len > 0)
    }
}

/// HTTP origin operations used by the reconciler.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Probe a URL's status and declared length without downloading the body.
    async fn probe(&self, url: &str) -> Result<ProbeResponse, TransportError>;

    /// Download the body of `url` into `sink`, replacing anything already there.
    /// Returns the number of bytes written.
    async fn fetch(&self, url: &str, sink: &mut StagingFile) -> Result<u64, TransportError>;
}
