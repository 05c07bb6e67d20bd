//! Error types for media-mirror.
//!
//! Only [`MirrorError`] ever reaches the caller of a run. Transport and store
//! errors are per-item: the reconciler folds them into a `TransferOutcome`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors raised by the HTTP origin adapter.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to execute {method} request for {url:?}: {message}")]
    Request {
        method: &'static str,
        url: String,
        message: String,
    },

    #[error("source URL {url:?} returned GET status {status:03}")]
    Status { url: String, status: u16 },

    #[error("copying contents of {url:?} copied zero bytes")]
    Empty { url: String },

    #[error("copying contents of {url:?} copied {copied} bytes but we should have had {declared}")]
    ShortRead {
        url: String,
        copied: u64,
        declared: u64,
    },

    #[error("failed while copying contents of {url:?}: {source}")]
    Io {
        url: String,
        #[source]
        source: io::Error,
    },
}

/// Errors raised by the object store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no object store registered for bucket {bucket:?}")]
    UnknownBucket { bucket: String },

    #[error("invalid object key {key:?}: {message}")]
    InvalidKey { key: String, message: String },

    #[error("cannot retrieve metadata for {key:?}: {message}")]
    Head { key: String, message: String },

    #[error("cannot upload into {key:?}: {message}")]
    Upload { key: String, message: String },

    #[error("cannot read staging file for {key:?}: {source}")]
    Staging {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Fatal failure while transferring one item. Reported in that item's
/// outcome; never aborts the run.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("failed to create temporary file: {0}")]
    Staging(#[source] io::Error),

    #[error("cannot download source file: {0}")]
    Download(#[source] TransportError),

    #[error("cannot upload to object store: {0}")]
    Upload(#[source] StoreError),
}

/// Errors raised while reading the manifest. Any of these aborts the run.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("cannot open manifest {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot find parent cmPublishImport tag")]
    MissingRoot,

    #[error("cannot parse xml at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("media item {id:?} has no path")]
    MissingPath { id: String },

    #[error("unexpected end of manifest inside <{element}>")]
    Truncated { element: String },
}

/// Invalid run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("the source URL ({0:?}) must not end in a forward slash")]
    OriginTrailingSlash(String),

    #[error("the source URL ({0:?}) must start with \"http://\" or \"https://\"")]
    OriginScheme(String),

    #[error("the destination bucket ({0:?}) must not end in a forward slash")]
    BucketTrailingSlash(String),

    #[error("no destination bucket specified")]
    MissingBucket,

    #[error("the destination path ({0:?}) must end in a forward slash")]
    PrefixTrailingSlash(String),

    #[error("thread count of {0} is invalid, specify at least 1")]
    Workers(usize),

    #[error("staging directory {0} does not exist or is not a directory")]
    StagingDir(PathBuf),

    #[error("no input manifest specified")]
    MissingManifest,

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Run-level failure surfaced to the caller.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("cannot build object store client for bucket {bucket:?}: {message}")]
    StoreSetup { bucket: String, message: String },

    #[error("cannot build HTTP client: {0}")]
    TransportSetup(String),

    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
