//! vidhost CLI: upload videos to Mux or Vimeo and manage the hosted assets.
//!
//! Credentials come from the environment (or `.env`): MUX_TOKEN_ID and
//! MUX_TOKEN_SECRET for Mux, VIMEO_ACCESS_TOKEN for Vimeo.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use vidhost_cli::{delete_message, format_progress, init_tracing, print_json, upload_metadata};
use vidhost_core::Config;
use vidhost_providers::ProviderRegistry;
use vidhost_transfer::{
    FileSessionStore, SessionStore, TransferProgress, UploadOrchestrator, UploadOutcome, VideoFile,
};

#[derive(Parser)]
#[command(name = "vidhost", about = "Upload and manage hosted videos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a video file and wait until it is playable
    Upload {
        /// Path to the video file
        file: PathBuf,
        /// Provider to upload to (defaults to DEFAULT_PROVIDER)
        #[arg(long)]
        provider: Option<String>,
        /// Title (defaults to the file name without extension)
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Origin allowed to write to the upload URL
        #[arg(long)]
        cors_origin: Option<String>,
    },
    /// Create an upload session for someone else to send the file to
    Link {
        /// Path to the video file (its size and fingerprint define the session)
        file: PathBuf,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        cors_origin: Option<String>,
    },
    /// Resume the pending upload with the same file
    Resume {
        file: PathBuf,
    },
    /// Fetch the processing status of an upload session or asset once
    Status {
        id: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Wait until an upload session or asset is playable
    Wait {
        id: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Show the playable renditions of a ready asset
    Playback {
        asset_id: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Delete an asset (succeeds if it is already gone)
    Delete {
        asset_id: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Get a single video
    Get {
        id: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// List the first page of videos
    List {
        #[arg(long)]
        provider: Option<String>,
    },
    /// List supported and configured providers
    Providers,
    /// Show the persisted upload session, if any
    Pending,
    /// Forget the persisted upload session
    Abandon,
}

/// First Ctrl-C pauses uploads at the next chunk boundary and ends status
/// waits; a second one exits immediately.
fn pause_on_ctrl_c(orchestrator: &UploadOrchestrator) {
    let pause = orchestrator.pause_handle();
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupted, pausing at the next chunk boundary (Ctrl-C again to abort)");
        pause.pause();
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Aborted; the persisted session stays resumable");
            std::process::exit(130);
        }
    });
}

async fn open_video(path: &std::path::Path) -> anyhow::Result<VideoFile> {
    VideoFile::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn report_outcome(outcome: UploadOutcome) -> anyhow::Result<()> {
    match outcome {
        UploadOutcome::Ready(result) => print_json(&result),
        UploadOutcome::Paused(session) => {
            tracing::info!(
                session_id = %session.session_id,
                offset = session.acknowledged_offset,
                total = session.total_size,
                "Upload paused; run `vidhost resume` with the same file to continue"
            );
            print_json(&session)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;

    let registry = ProviderRegistry::from_config(&config).context("Failed to build providers")?;
    let store: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::new(&config.upload.session_store_dir));
    let orchestrator =
        UploadOrchestrator::new(registry.clone(), store.clone(), config.upload.clone())
            .with_progress(Arc::new(|progress: TransferProgress| {
                eprintln!("{}", format_progress(&progress));
            }));

    let default_provider = config.default_provider.as_str().to_string();
    let provider_or_default =
        |name: Option<String>| name.unwrap_or_else(|| default_provider.clone());

    match cli.command {
        Commands::Upload {
            file,
            provider,
            title,
            description,
            cors_origin,
        } => {
            let file = open_video(&file).await?;
            let metadata = upload_metadata(
                file.name(),
                title,
                description,
                cors_origin.unwrap_or_else(|| config.default_cors_origin.clone()),
            );

            pause_on_ctrl_c(&orchestrator);
            let outcome = orchestrator
                .upload_and_wait(&file, &metadata, &provider_or_default(provider))
                .await?;
            report_outcome(outcome)?;
        }
        Commands::Link {
            file,
            provider,
            title,
            description,
            cors_origin,
        } => {
            let file = open_video(&file).await?;
            let metadata = upload_metadata(
                file.name(),
                title,
                description,
                cors_origin.unwrap_or_else(|| config.default_cors_origin.clone()),
            );

            let link = orchestrator
                .create_link(&file, &metadata, &provider_or_default(provider))
                .await?;
            print_json(&link)?;
        }
        Commands::Resume { file } => {
            let file = open_video(&file).await?;

            pause_on_ctrl_c(&orchestrator);
            let outcome = orchestrator.resume_and_wait(&file).await?;
            report_outcome(outcome)?;
        }
        Commands::Status { id, provider } => {
            let client = registry.resolve(&provider_or_default(provider)).await?;
            let status = client.fetch_status(&id).await?;
            print_json(&status)?;
        }
        Commands::Wait { id, provider } => {
            pause_on_ctrl_c(&orchestrator);
            let asset = orchestrator
                .wait_for(&provider_or_default(provider), &id)
                .await?;
            print_json(&asset)?;
        }
        Commands::Playback { asset_id, provider } => {
            let client = registry.resolve(&provider_or_default(provider)).await?;
            let descriptor = client.resolve_playback(&asset_id).await?;
            print_json(&serde_json::json!({
                "best": descriptor.best(),
                "files": descriptor.files,
            }))?;
        }
        Commands::Delete { asset_id, provider } => {
            let client = registry.resolve(&provider_or_default(provider)).await?;
            let outcome = client.delete(&asset_id).await?;
            print_json(&serde_json::json!({
                "success": outcome.is_success(),
                "outcome": outcome,
                "message": delete_message(&asset_id, outcome),
            }))?;
        }
        Commands::Get { id, provider } => {
            let client = registry.resolve(&provider_or_default(provider)).await?;
            let video = client.get_video(&id).await?;
            print_json(&video)?;
        }
        Commands::List { provider } => {
            let client = registry.resolve(&provider_or_default(provider)).await?;
            let videos = client.list_videos().await?;
            print_json(&videos)?;
        }
        Commands::Providers => {
            print_json(&serde_json::json!({
                "supported": ProviderRegistry::supported(),
                "configured": registry.configured().await,
                "default": config.default_provider,
            }))?;
        }
        Commands::Pending => {
            let pending = store.load().await?;
            print_json(&pending)?;
        }
        Commands::Abandon => {
            let abandoned = orchestrator.abandon().await?;
            print_json(&serde_json::json!({
                "abandoned": abandoned.map(|session| session.session_id),
            }))?;
        }
    }

    Ok(())
}
