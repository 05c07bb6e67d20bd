//! Command-line surface.

use crate::config::Overrides;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "media-mirror")]
#[command(about = "Mirror an HTTP-hosted media catalog into S3, transferring only missing or changed files")]
#[command(version)]
pub struct Cli {
    /// Manifest (cmPublishImport XML export) to ingest
    #[arg(short, long, env = "MEDIA_MIRROR_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Origin root URL, without a trailing slash
    #[arg(long, env = "MEDIA_MIRROR_ORIGIN")]
    pub origin: Option<String>,

    /// Destination S3 bucket
    #[arg(short, long, env = "MEDIA_MIRROR_BUCKET")]
    pub bucket: Option<String>,

    /// Destination key prefix, ending in a forward slash
    #[arg(long, env = "MEDIA_MIRROR_PREFIX")]
    pub prefix: Option<String>,

    /// Number of items to transfer in parallel
    #[arg(short, long, env = "MEDIA_MIRROR_WORKERS")]
    pub workers: Option<usize>,

    /// Directory for staging downloads until upload
    #[arg(long, env = "MEDIA_MIRROR_STAGING")]
    pub staging: Option<PathBuf>,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// S3-compatible endpoint URL
    #[arg(long, env = "MEDIA_MIRROR_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Namespace for object tag keys
    #[arg(long, env = "MEDIA_MIRROR_TAG_PREFIX")]
    pub tag_prefix: Option<String>,

    /// Upload without descriptive tags
    #[arg(long)]
    pub no_tags: bool,

    /// Retries after the first attempt for source probes and downloads
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seconds to wait between attempts
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// TOML config file; flags and environment override it
    #[arg(short, long, env = "MEDIA_MIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            manifest: self.manifest.clone(),
            origin: self.origin.clone(),
            bucket: self.bucket.clone(),
            key_prefix: self.prefix.clone(),
            workers: self.workers,
            staging_dir: self.staging.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            tag_prefix: self.tag_prefix.clone(),
            no_tags: self.no_tags,
            retry_attempts: self.retries,
            retry_delay_secs: self.retry_delay,
        }
    }

    /// Default log directive when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}
