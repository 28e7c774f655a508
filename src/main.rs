use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use bucket_syncer::watcher::handlers::{LogHandler, SyncHandler};
use bucket_syncer::{
    DispatchContext, DispatchEngine, ObjectStoreUploader, Settings, StorageBackend, build_store,
    log_event, logging,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bucket-syncer", version)]
#[command(about = "Watch a directory and mirror it into an object-storage bucket")]
struct Cli {
    /// Configuration file (defaults to ./syncer.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory to watch (overrides ROOT_FOLDER)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Destination bucket (overrides S3_BUCKET_NAME)
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Storage region (overrides AWS_REGION)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Polling interval in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the root and sync on every change (default)
    Watch {
        /// Also register the diagnostic handler that logs every event
        #[arg(long)]
        diagnostic: bool,
    },

    /// Sync the root once and exit
    Sync,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load_from(path),
            None => Settings::load(),
        }
        .context("failed to load configuration")?;

        if let Some(root) = &self.root {
            settings.root = Some(root.clone());
        }
        if let Some(bucket) = &self.bucket {
            settings.bucket = bucket.clone();
        }
        if let Some(region) = &self.region {
            settings.region = region.clone();
        }
        if let Some(interval_ms) = self.interval_ms {
            settings.watch.polling_interval_ms = interval_ms;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init_with_config(&settings.logging);

    let result = match cli.command.unwrap_or(Commands::Watch { diagnostic: false }) {
        Commands::Watch { diagnostic } => watch(settings, diagnostic).await,
        Commands::Sync => sync_once(settings).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn sync_handler(settings: &Settings) -> anyhow::Result<SyncHandler> {
    let root = settings.root_path()?;
    let store = build_store(&settings.bucket, &settings.region, &settings.storage)
        .context("failed to set up object storage")?;
    let uploader = ObjectStoreUploader::new(store)
        .with_concurrency(settings.storage.upload_concurrency)
        .with_content_types(settings.storage.backend != StorageBackend::Local);

    Ok(SyncHandler::new(root, settings.bucket.clone(), Arc::new(uploader)))
}

async fn watch(settings: Settings, diagnostic: bool) -> anyhow::Result<()> {
    let handler = sync_handler(&settings)?;
    let mut engine = DispatchEngine::new(handler.root())
        .with_context(|| format!("failed to watch {}", handler.root().display()))?;

    engine.register("s3syncer", handler)?;
    if diagnostic {
        engine.register("stub", LogHandler::new())?;
    }
    engine.start(settings.polling_interval())?;

    log_event!(
        "syncer",
        "started",
        "handlers [{}], press Ctrl+C to stop",
        engine.list_handlers().join(", ")
    );

    let loop_result = tokio::select! {
        _ = shutdown_signal() => None,
        result = engine.wait() => Some(result),
    };

    match loop_result {
        None => {
            log_event!("syncer", "shutting down");
            engine.stop().await;
            Ok(())
        }
        // A broken watch is not recoverable: exit without waiting on handlers
        Some(Err(e)) => Err(e).context("watch failed"),
        Some(Ok(())) => {
            engine.stop().await;
            Ok(())
        }
    }
}

async fn sync_once(settings: Settings) -> anyhow::Result<()> {
    let handler = sync_handler(&settings)?;
    let stats = handler.sync(&DispatchContext::new()).await?;
    log_event!("syncer", "done", "{} objects", stats.objects);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("[syncer] failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("[syncer] failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log_event!("syncer", "signal received");
}
