//! Run configuration.
//!
//! Built from defaults, then an optional TOML file, then overrides collected
//! from the environment and command line. Nothing here is global: the
//! resolved [`Config`] is handed to each component as plain values.
//!
//! ```toml
//! manifest = "export.xml"
//! origin = "https://media.example.net"
//! bucket = "media-archive"
//! key_prefix = "catalog/"
//! workers = 8
//! ```

use crate::error::ConfigError;
use crate::manifest::CommandTemplate;
use crate::pipeline::reconciler::ReconcilerConfig;
use crate::pipeline::retry::{RetryPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
use crate::store::{S3Settings, DEFAULT_TAG_PREFIX};
use crate::transport::HttpTransportConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ORIGIN: &str = "https://www.example.net";
pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_KEY_PREFIX: &str = "/";

/// Fully resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Manifest to read
    pub manifest: Option<PathBuf>,

    /// Origin root URL, without a trailing slash
    pub origin: String,

    /// Destination bucket
    pub bucket: String,

    /// Destination key prefix, ending in `/`
    pub key_prefix: String,

    /// Parallel transfers
    pub workers: usize,

    /// Where staging files are created
    pub staging_dir: PathBuf,

    /// AWS region
    pub region: String,

    /// S3-compatible endpoint, when not talking to AWS
    pub endpoint: Option<String>,

    /// Namespace for tag keys
    pub tag_prefix: String,

    /// Attach descriptive tags on upload
    pub tags: bool,

    /// Retries after the first attempt, for the source probe and download
    pub retry_attempts: u32,

    /// Seconds between attempts
    pub retry_delay_secs: u64,

    /// HTTP connect timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: None,
            origin: DEFAULT_ORIGIN.to_string(),
            bucket: String::new(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            workers: 1,
            staging_dir: std::env::temp_dir(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            tags: true,
            retry_attempts: DEFAULT_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
            connect_timeout_secs: HttpTransportConfig::default().connect_timeout.as_secs(),
        }
    }
}

/// Values from the environment or command line. `None` leaves the file or
/// default value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub manifest: Option<PathBuf>,
    pub origin: Option<String>,
    pub bucket: Option<String>,
    pub key_prefix: Option<String>,
    pub workers: Option<usize>,
    pub staging_dir: Option<PathBuf>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub tag_prefix: Option<String>,
    pub no_tags: bool,
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

impl Config {
    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then `file` if given, then `overrides`; validated.
    pub fn load(file: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if overrides.manifest.is_some() {
            self.manifest = overrides.manifest;
        }
        set(&mut self.origin, overrides.origin);
        set(&mut self.bucket, overrides.bucket);
        set(&mut self.key_prefix, overrides.key_prefix);
        set(&mut self.workers, overrides.workers);
        set(&mut self.staging_dir, overrides.staging_dir);
        set(&mut self.region, overrides.region);
        if overrides.endpoint.is_some() {
            self.endpoint = overrides.endpoint;
        }
        set(&mut self.tag_prefix, overrides.tag_prefix);
        if overrides.no_tags {
            self.tags = false;
        }
        set(&mut self.retry_attempts, overrides.retry_attempts);
        set(&mut self.retry_delay_secs, overrides.retry_delay_secs);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manifest.is_none() {
            return Err(ConfigError::MissingManifest);
        }
        if self.workers < 1 {
            return Err(ConfigError::Workers(self.workers));
        }
        if self.origin.ends_with('/') {
            return Err(ConfigError::OriginTrailingSlash(self.origin.clone()));
        }
        if !(self.origin.starts_with("http://") || self.origin.starts_with("https://")) {
            return Err(ConfigError::OriginScheme(self.origin.clone()));
        }
        if self.bucket.is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        if self.bucket.ends_with('/') {
            return Err(ConfigError::BucketTrailingSlash(self.bucket.clone()));
        }
        if !self.key_prefix.ends_with('/') {
            return Err(ConfigError::PrefixTrailingSlash(self.key_prefix.clone()));
        }
        if !self.staging_dir.is_dir() {
            return Err(ConfigError::StagingDir(self.staging_dir.clone()));
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> Result<&Path, ConfigError> {
        self.manifest.as_deref().ok_or(ConfigError::MissingManifest)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.retry_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let mut config = ReconcilerConfig::new(&self.staging_dir);
        config.probe_retry = self.retry_policy();
        config.fetch_retry = self.retry_policy();
        config.tag_prefix = self.tags.then(|| self.tag_prefix.clone());
        config
    }

    pub fn template(&self) -> CommandTemplate {
        CommandTemplate::new(&self.origin, &self.bucket, &self.key_prefix)
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..Default::default()
        }
    }
}
