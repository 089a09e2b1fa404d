//! Therapist Demand: web app entry point.
//!
//! Loads configuration and model artifacts, wires the reference source and
//! serves the form until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use therapist_demand::adapters::sanitize::SanitizingMakeWriter;
use therapist_demand::adapters::{
    load_artifacts, ArtifactPolicy, CachedReferenceSource, SheetsReferenceSource,
    StaticReferenceSource,
};
use therapist_demand::application::{EstimationService, PredictHandler};
use therapist_demand::config::{Args, Config, LogMode, ReferenceConfig};
use therapist_demand::ports::ReferenceSource;
use therapist_demand::web::{self, AppState};
use therapist_demand::DemandError;

fn init_logging(args: &Args) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let (writer, guard) = match args.log_mode {
        LogMode::File => {
            if let Some(parent) = args.log_file.parent() {
                // Best-effort: opening the file reports the real error.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&args.log_file)
                .with_context(|| format!("Failed to open log file {:?}", args.log_file))?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stdout => tracing_appender::non_blocking(std::io::stdout()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}

fn build_reference_source(config: &Config) -> Result<Arc<dyn ReferenceSource>> {
    let source: Arc<dyn ReferenceSource> = match &config.reference {
        ReferenceConfig::File(path) => Arc::new(
            StaticReferenceSource::from_file(path)
                .with_context(|| format!("Failed to load reference data from {path:?}"))?,
        ),
        ReferenceConfig::Sheets {
            credentials,
            spreadsheet_id,
            ranges,
        } => Arc::new(
            SheetsReferenceSource::new(
                credentials.clone(),
                spreadsheet_id.clone(),
                ranges.clone(),
                config.fetch_timeout,
            )
            .context("Failed to build Sheets client")?,
        ),
    };
    Ok(source)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging(&args)?;

    tracing::info!("Starting Therapist Demand...");

    let config = Config::from_args(&args).context("Invalid configuration")?;

    let policy = ArtifactPolicy::from_pubkey_file(
        config.model.pubkey_file.as_deref(),
        config.model.require_signature,
    )
    .context("Failed to load model signing key")?;
    let artifacts = load_artifacts(&config.model.dir, &policy)
        .with_context(|| format!("Failed to load model artifacts from {:?}", config.model.dir))?;
    artifacts
        .encoders
        .validate_vocabulary()
        .map_err(|e| DemandError::Configuration(format!("Encoder vocabulary mismatch: {e}")))?;

    // Built before the runtime: the blocking HTTP client must not be created
    // or dropped on an async thread.
    let reference = Arc::new(CachedReferenceSource::new(
        build_reference_source(&config)?,
        config.cache_ttl,
    ));
    let service = EstimationService::new(
        Arc::new(artifacts.model),
        Arc::clone(&reference),
        Arc::new(artifacts.encoders),
    )?;
    tracing::info!(
        "Reference data from {} (verification={:?})",
        service.reference_origin(),
        artifacts.verification
    );

    let state = AppState {
        handler: PredictHandler::new(service),
        credentials: config.credentials.clone(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime
        .block_on(web::serve(config.addr, state))
        .context("Server error")?;
    runtime.shutdown_background();

    drop(reference);
    tracing::info!("Therapist Demand shutdown complete.");
    Ok(())
}
