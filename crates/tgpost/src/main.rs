use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use tgpost_core::{
    cache::sanitize_component, config::Config, domain::ChatRef, domain::MessageRef,
    media::MediaBlob, service::MediaService,
};
use tgpost_mtproto::{MtprotoProvider, MtprotoSettings};

#[derive(Parser)]
#[command(name = "tgpost")]
#[command(about = "Fetch Telegram posts and their media, with a local cache")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one attachment of a post
    Media {
        /// Post link (https://t.me/<chat>/<id>) or <chat>/<id>
        post: String,
        /// Attachment index; 0 is the linked message itself
        #[arg(short, long, default_value_t = 0)]
        index: usize,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Download every attachment of a post's album
    Album {
        post: String,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Download a channel's profile photo
    Photo {
        chat: String,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Report whether a post exists and carries media
    Check { post: String },
    /// Print a JSON summary of a post
    Post { post: String },
    /// Package a post (media, logo, text, metadata) into a ZIP file
    Archive {
        post: String,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = Config::load()?;
    tgpost_core::logging::init("tgpost", cfg.log_file.as_deref())?;

    let provider = Arc::new(MtprotoProvider::new(MtprotoSettings::from(&cfg)));
    let service = tgpost_core::build_service(&cfg, provider);

    let outcome = run(&service, cli.command, cfg.request_timeout).await;
    // Let background cache writes land before exiting.
    tracing::debug!(pending = service.pending_writes(), "flushing cache writes");
    service.flush().await;
    outcome
}

async fn run(service: &MediaService, command: Commands, limit: Duration) -> Result<()> {
    match command {
        Commands::Media { post, index, out } => {
            let msg = parse_post(&post)?;
            let blob = timed(limit, service.get_media(&msg, index)).await?;
            let path = save(&out, &blob).await?;
            println!("{}", path.display());
        }
        Commands::Album { post, out } => {
            let msg = parse_post(&post)?;
            let blobs = timed(limit, service.get_all_media(&msg)).await?;
            if blobs.is_empty() {
                bail!("no media found for {msg}");
            }
            for blob in &blobs {
                println!("{}", save(&out, blob).await?.display());
            }
        }
        Commands::Photo { chat, out } => {
            let chat = ChatRef::parse(&chat);
            let Some(mut blob) = timed(limit, service.get_channel_photo(&chat)).await? else {
                bail!("{chat} has no profile photo");
            };
            blob.filename = format!("{}.jpg", sanitize_component(&chat.to_string()));
            println!("{}", save(&out, &blob).await?.display());
        }
        Commands::Check { post } => {
            let msg = parse_post(&post)?;
            let available = tokio::time::timeout(limit, service.check_availability(&msg))
                .await
                .unwrap_or(false);
            println!("{}", serde_json::json!({ "post": msg.to_string(), "available": available }));
        }
        Commands::Post { post } => {
            let msg = parse_post(&post)?;
            let summary = timed(limit, service.post_summary(&msg)).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Archive { post, out } => {
            let msg = parse_post(&post)?;
            let archive = timed(limit, service.build_archive(&msg)).await?;
            tokio::fs::create_dir_all(&out).await?;
            let path = out.join(&archive.filename);
            tokio::fs::write(&path, &archive.bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn parse_post(raw: &str) -> Result<MessageRef> {
    MessageRef::parse(raw)
        .ok_or_else(|| anyhow!("expected a post link like https://t.me/<chat>/<id>, got {raw:?}"))
}

async fn timed<T>(
    limit: Duration,
    fut: impl Future<Output = tgpost_core::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => Ok(res?),
        Err(_) => bail!("request timed out after {}s", limit.as_secs()),
    }
}

async fn save(dir: &Path, blob: &MediaBlob) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(sanitize_component(&blob.filename));
    tokio::fs::write(&path, &blob.bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), size = blob.len(), mime = %blob.mime_type, "saved");
    Ok(path)
}
