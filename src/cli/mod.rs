//! CLI definition and dispatch.

mod cache;
mod images;
mod model;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arkmesh::Config;

#[derive(Parser)]
#[command(name = "arkmesh")]
#[command(version, about = "Generate 3D models from images and cache them locally", long_about = None)]
pub(crate) struct Cli {
    /// Config file (default: ~/.arkmesh/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Generate images from a text prompt
    Images {
        /// Text description
        prompt: String,
        /// Allow a related series of images instead of a single one
        #[arg(long)]
        sequential: bool,
    },
    /// Image-to-3D model tasks
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Inspect or manage the local model cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ModelAction {
    /// Submit a model generation task for an image URL
    Create {
        /// Source image URL
        image_url: String,
    },
    /// Show a task's status
    Status {
        /// Task ID
        task_id: String,
        /// Poll until the task finishes
        #[arg(long)]
        wait: bool,
    },
    /// Download a model archive into the cache
    Fetch {
        /// Archive URL from a finished task
        file_url: String,
    },
    /// Create a task, wait for it and fetch the result
    Generate {
        /// Source image URL
        image_url: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// List cached models
    List,
    /// Remove one cached model by key
    Remove {
        /// Cache key (as shown by `cache list`)
        key: String,
    },
    /// Delete every cached model
    Clear,
    /// Print the cache directory
    Path,
}

/// Initialise tracing from `RUST_LOG`, defaulting to `arkmesh=info`.
pub(crate) fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arkmesh=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .with_context(|| "Failed to load configuration")?;

    match cli.command {
        Commands::Images { prompt, sequential } => {
            images::cmd_images(&config, &prompt, sequential).await
        }
        Commands::Model { action } => model::cmd_model(&config, action).await,
        Commands::Cache { action } => cache::cmd_cache(&config, action),
    }
}

/// Receiver that flips to `true` on Ctrl-C.
pub(crate) fn ctrl_c_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            let _ = tx.send(true);
        }
    });
    rx
}
