//! reqwest-backed origin transport.

use super::{ProbeResponse, Transport};
use crate::error::{MirrorError, TransportError};
use crate::staging::StagingFile;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Connection settings for the origin client
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub connect_timeout: Duration,
    /// Whole-request timeout. `None` lets large bodies take as long as they need.
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
            user_agent: format!("media-mirror/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Stateless HTTP client shared by every worker.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpTransportConfig) -> Result<Self, MirrorError> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| MirrorError::TransportSetup(e.to_string()))?;
        Ok(Self { client })
    }
}

/// Parse `Content-Length` directly; reqwest's body size hint is meaningless for HEAD.
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn request_error(method: &'static str, url: &str, err: reqwest::Error) -> TransportError {
    TransportError::Request {
        method,
        url: url.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, url: &str) -> Result<ProbeResponse, TransportError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| request_error("HEAD", url, e))?;

        let probe = ProbeResponse::new(
            response.status().as_u16(),
            declared_length(response.headers()),
        );
        tracing::trace!(url, status = probe.status, length = ?probe.declared_length, "HEAD");
        Ok(probe)
    }

    async fn fetch(&self, url: &str, sink: &mut StagingFile) -> Result<u64, TransportError> {
        let io_error = |source| TransportError::Io {
            url: url.to_string(),
            source,
        };

        sink.reset().await.map_err(io_error)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error("GET", url, e))?;

        if response.status() != StatusCode::OK {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let declared = declared_length(response.headers());
        let mut body = response.bytes_stream();
        let mut copied = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(match declared {
                        // Connection ended before the declared length arrived
                        Some(declared) if copied < declared => {
                            tracing::debug!(url, copied, declared, error = %e, "body cut short");
                            TransportError::ShortRead {
                                url: url.to_string(),
                                copied,
                                declared,
                            }
                        }
                        _ => request_error("GET", url, e),
                    });
                }
            };
            sink.write_chunk(&chunk).await.map_err(io_error)?;
            copied += chunk.len() as u64;
        }
        sink.flush().await.map_err(io_error)?;

        if copied == 0 {
            return Err(TransportError::Empty {
                url: url.to_string(),
            });
        }
        if let Some(declared) = declared.filter(|len| *len > 0) {
            if copied != declared {
                return Err(TransportError::ShortRead {
                    url: url.to_string(),
                    copied,
                    declared,
                });
            }
        }

        tracing::trace!(url, bytes = copied, "GET");
        Ok(copied)
    }
}
