use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use conveyor::client::{
    FileSource, HttpControlPlane, HttpDataPlane, StatusTracker, TransferConfig, UploadOutcome,
    UploadStatus, Uploader,
};
use conveyor::coordinator::UploadCoordinator;
use conveyor::Config;

const DEFAULT_CONFIG_FILE: &str = "./dev-config.yml";

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the upload coordinator.
    Serve,
    /// Upload a file through a running coordinator.
    Upload {
        path: PathBuf,
        #[arg(long, default_value = "video/mp4")]
        content_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    // an explicitly named file must exist, the default one is optional
    let config = match cli.config_file {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Upload { path, content_type } => upload(config, path, content_type).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let backend = match config.objects {
        Some(backend) => backend,
        None => anyhow::bail!("serve requires an `objects` backend in the config file"),
    };
    let objects = backend.new_objects().await?;

    let coordinator = UploadCoordinator::new(
        objects,
        &config.server.key_prefix,
        Duration::from_secs(config.server.part_url_ttl_secs),
    );

    conveyor::http::serve(&config.server.listen_address, coordinator, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await?;
    Ok(())
}

async fn upload(config: Config, path: PathBuf, content_type: String) -> Result<()> {
    let source = FileSource::open(&path).await?;
    let filename = source.file_name().unwrap_or("upload").to_string();

    let uploader = Uploader::new(
        HttpControlPlane::new(&config.client)?,
        HttpDataPlane::new(&config.client)?,
        TransferConfig::from(&config.client),
    );

    let tracker = StatusTracker::new();
    let mut status = tracker.subscribe();
    let reporter = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match current {
                UploadStatus::Idle => {}
                UploadStatus::Uploading { progress } => tracing::info!(progress, "uploading"),
                UploadStatus::Success { url } => {
                    tracing::info!(url = url.as_deref().unwrap_or("-"), "upload succeeded")
                }
                UploadStatus::Error { reason } => tracing::error!(reason = %reason, "upload failed"),
            }
        }
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling upload");
            trigger.cancel();
        }
    });

    let result = uploader
        .run(&source, &filename, &content_type, &tracker, &cancel)
        .await;
    drop(tracker);
    reporter.await?;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(conveyor::Error::Unfinished { handle, source, .. }) => {
            tracing::warn!(
                filename = %handle.filename,
                upload_id = %handle.upload_id,
                "multipart upload left open"
            );
            return Err((*source).into());
        }
        Err(e) => return Err(e.into()),
    };
    match outcome {
        UploadOutcome::Completed { url, .. } => println!("{url}"),
        UploadOutcome::Empty => println!("{} is empty, nothing uploaded", path.display()),
    }
    Ok(())
}
