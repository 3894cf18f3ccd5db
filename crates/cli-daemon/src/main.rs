use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use daemon::{
    config::ConvertConfig, convert::Converter, notify::Notifier, schedule::Scheduler,
    store::CatalogStore, store::SqliteStore,
};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

/// HEVC conversion daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger - use RUST_LOG env var or default to info level
    env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    let cfg = ConvertConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    cfg.validate().context("Invalid configuration")?;

    info!("HEVC daemon starting");
    info!("  Include folders: {:?}", cfg.folders.include);
    info!("  Backup folder: {}", cfg.folders.backup.display());
    info!("  Scratch folder: {}", cfg.folders.scratch.display());
    info!("  Catalog store: {}", cfg.store_path.display());
    info!("  Worker: {} (main: {})", cfg.resolve_worker_name(), cfg.main_worker);

    for root in &cfg.folders.include {
        if !root.exists() {
            warn!("Include folder does not exist: {}", root.display());
        }
    }

    std::fs::create_dir_all(&cfg.folders.scratch).with_context(|| {
        format!(
            "Failed to create scratch directory: {}",
            cfg.folders.scratch.display()
        )
    })?;
    std::fs::create_dir_all(&cfg.folders.backup).with_context(|| {
        format!(
            "Failed to create backup directory: {}",
            cfg.folders.backup.display()
        )
    })?;
    if let Some(parent) = cfg.store_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create store directory: {}", parent.display())
        })?;
    }

    let store: Arc<dyn CatalogStore> = Arc::new(
        SqliteStore::open(&cfg.store_path).with_context(|| {
            format!("Failed to open catalog store: {}", cfg.store_path.display())
        })?,
    );
    let notifier = Arc::new(Notifier::new(cfg.notify_url.clone()));
    let cancel = CancellationToken::new();

    let converter = Converter::new(&cfg, Arc::clone(&store), notifier, cancel.clone());
    let mut scheduler = Scheduler::new(cfg, store, converter, cancel)
        .context("Failed to build scheduler")?;

    scheduler.run().await;

    Ok(())
}
