use anyhow::{Context, Result};
use fileshelf::{
    RequestContext,
    config::{AppConfig, Command, FilesCommand},
    services::{self, Sweeper},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const FILENAME_DISPLAY_LEN: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + subcommand ---
    let (cfg, command) = AppConfig::from_env_and_args().context("loading configuration")?;
    tracing::info!(
        "Starting fileshelf with {} storage, purge interval {:?}",
        cfg.storage.backend_name(),
        cfg.purge_interval
    );

    // --- Initialize storage backend ---
    let storage = services::build_storage(&cfg.storage)
        .await
        .context("initializing storage backend")?;
    let ctx = RequestContext::background();

    match command {
        Command::Files(FilesCommand::List) => {
            let mut objects = storage.list(&ctx).await.context("listing files")?;
            objects.sort_by(|a, b| a.id.cmp(&b.id));
            println!("File ID | Size (bytes) | Filename | Expires");
            for object in objects {
                let expires = if object.metadata.expires_at.is_empty() {
                    "never"
                } else {
                    object.metadata.expires_at.as_str()
                };
                println!(
                    "{} {} {} {}",
                    object.id,
                    object.metadata.content_length,
                    truncate_text(&object.metadata.filename, FILENAME_DISPLAY_LEN),
                    expires
                );
            }
        }
        Command::Files(FilesCommand::Delete { id }) => {
            storage
                .delete(&ctx, &id)
                .await
                .with_context(|| format!("deleting file `{}`", id))?;
            println!("File deleted [fileId={}]", id);
        }
        Command::Purge => {
            let deleted = Sweeper::new(storage, cfg.purge_interval)?
                .sweep_once(&ctx)
                .await
                .context("purging expired files")?;
            println!("Purged {} expired file(s)", deleted);
        }
        Command::Sweep { interval_secs } => {
            let interval = interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(cfg.purge_interval);
            let shutdown = CancellationToken::new();
            let handle = Sweeper::new(storage, interval)?.spawn(shutdown.clone());

            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            tracing::info!("Shutdown requested, stopping sweeper");
            shutdown.cancel();
            handle.await.context("joining sweeper task")?;
        }
    }

    Ok(())
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
