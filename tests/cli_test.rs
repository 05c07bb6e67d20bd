//! Integration tests for the media-mirror binary
//!
//! Configuration and manifest problems must stop the run before any network
//! work and exit non-zero with a readable message.

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

fn mirror_bin() -> String {
    env!("CARGO_BIN_EXE_media-mirror").to_string()
}

/// Run the binary with a clean environment for our own variables.
fn run(args: &[&str]) -> Output {
    let mut command = Command::new(mirror_bin());
    for var in [
        "MEDIA_MIRROR_MANIFEST",
        "MEDIA_MIRROR_ORIGIN",
        "MEDIA_MIRROR_BUCKET",
        "MEDIA_MIRROR_PREFIX",
        "MEDIA_MIRROR_WORKERS",
        "MEDIA_MIRROR_STAGING",
        "MEDIA_MIRROR_ENDPOINT",
        "MEDIA_MIRROR_TAG_PREFIX",
        "MEDIA_MIRROR_CONFIG",
        "RUST_LOG",
    ] {
        command.env_remove(var);
    }
    command.args(args).output().unwrap()
}

fn assert_fails_with(output: &Output, needle: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "expected failure, stderr: {stderr}");
    assert!(
        stderr.contains(needle),
        "stderr should mention {needle:?}, got: {stderr}"
    );
}

// =============================================================================
// Configuration errors
// =============================================================================

#[test]
fn test_missing_manifest_flag() {
    let output = run(&["--bucket", "archive"]);
    assert_fails_with(&output, "no input manifest specified");
}

#[test]
fn test_missing_bucket() {
    let output = run(&["--manifest", "export.xml"]);
    assert_fails_with(&output, "no destination bucket specified");
}

#[test]
fn test_origin_trailing_slash() {
    let output = run(&[
        "--manifest",
        "export.xml",
        "--bucket",
        "archive",
        "--origin",
        "https://media.example.net/",
    ]);
    assert_fails_with(&output, "must not end in a forward slash");
}

#[test]
fn test_origin_scheme() {
    let output = run(&[
        "--manifest",
        "export.xml",
        "--bucket",
        "archive",
        "--origin",
        "media.example.net",
    ]);
    assert_fails_with(&output, "must start with");
}

#[test]
fn test_prefix_needs_trailing_slash() {
    let output = run(&[
        "--manifest",
        "export.xml",
        "--bucket",
        "archive",
        "--prefix",
        "catalog",
    ]);
    assert_fails_with(&output, "must end in a forward slash");
}

#[test]
fn test_zero_workers() {
    let output = run(&[
        "--manifest",
        "export.xml",
        "--bucket",
        "archive",
        "--workers",
        "0",
    ]);
    assert_fails_with(&output, "thread count of 0 is invalid");
}

#[test]
fn test_missing_staging_dir() {
    let output = run(&[
        "--manifest",
        "export.xml",
        "--bucket",
        "archive",
        "--staging",
        "/nonexistent/staging",
    ]);
    assert_fails_with(&output, "staging directory");
}

#[test]
fn test_config_file_values_are_validated() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("mirror.toml");
    fs::write(
        &config,
        "manifest = \"export.xml\"\nbucket = \"archive/\"\n",
    )
    .unwrap();

    let output = run(&["--config", config.to_str().unwrap()]);
    assert_fails_with(&output, "destination bucket");
}

#[test]
fn test_flags_override_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("mirror.toml");
    fs::write(
        &config,
        "manifest = \"export.xml\"\nbucket = \"archive/\"\n",
    )
    .unwrap();

    // The flag fixes the bucket, so the run gets as far as the manifest
    let output = run(&[
        "--config",
        config.to_str().unwrap(),
        "--bucket",
        "archive",
        "--manifest",
        dir.path().join("absent.xml").to_str().unwrap(),
    ]);
    assert_fails_with(&output, "cannot open manifest");
}

#[test]
fn test_bad_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("mirror.toml");
    fs::write(&config, "workers = \"lots\"\n").unwrap();

    let output = run(&["--config", config.to_str().unwrap()]);
    assert_fails_with(&output, "cannot parse config file");
}

// =============================================================================
// Manifest errors
// =============================================================================

#[test]
fn test_unreadable_manifest() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("absent.xml");
    let output = run(&[
        "--manifest",
        manifest.to_str().unwrap(),
        "--bucket",
        "archive",
    ]);
    assert_fails_with(&output, "cannot open manifest");
}

#[test]
fn test_help() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--manifest"));
    assert!(stdout.contains("--workers"));
}
