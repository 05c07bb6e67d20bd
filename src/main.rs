//! media-mirror CLI

use anyhow::Context;
use clap::Parser;
use media_mirror::cli::Cli;
use media_mirror::pipeline::summary_line;
use media_mirror::store::ObjectStoreBackend;
use media_mirror::transport::HttpTransport;
use media_mirror::{Aggregator, Config, ManifestReader, Orchestrator, Reconciler};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref(), cli.overrides())
        .context("invalid configuration")?;
    let manifest = config.manifest_path()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        manifest = %manifest.display(),
        origin = %config.origin,
        bucket = %config.bucket,
        prefix = %config.key_prefix,
        workers = config.workers,
        "starting media-mirror"
    );

    let reader = ManifestReader::open(manifest, config.template())?;
    let transport = HttpTransport::new(&config.transport_config())?;
    let store = ObjectStoreBackend::s3(&config.s3_settings())?;

    let reconciler = Reconciler::new(
        Arc::new(transport),
        Arc::new(store),
        config.reconciler_config(),
    );
    let orchestrator = Orchestrator::new(reconciler, config.workers);

    let report = orchestrator
        .run(reader, Aggregator::new())
        .await
        .with_context(|| format!("run aborted reading {}", manifest.display()))?;

    // Item failures are informational; the run itself completed.
    eprintln!("{}", summary_line(&report.stats));
    Ok(())
}
