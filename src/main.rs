//! docsync - keep a vector index in sync with a directory
//!
//! Entry point for the docsync binary.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use docsync::embeddings::HashEmbedder;
use docsync::observability::{init_metrics, init_tracing};
use docsync::storage::{SqliteIndex, VectorIndex};
use docsync::sync::{SyncWorker, WorkerState};
use docsync::{Config, Error, Result};

/// docsync - keep a vector index in sync with a directory
#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory to mirror into the index
    #[arg(short, long, env = "DOCSYNC_WATCH_DIR", default_value = ".")]
    watch_dir: PathBuf,

    /// Directory for the index database (default: <watch-dir>/.docsync)
    #[arg(short, long, env = "DOCSYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// File extensions to index
    #[arg(
        short,
        long,
        env = "DOCSYNC_EXTENSIONS",
        value_delimiter = ',',
        default_value = "md,txt,pdf"
    )]
    extensions: Vec<String>,

    /// Extra exclusion patterns (gitignore syntax)
    #[arg(long, env = "DOCSYNC_IGNORE", value_delimiter = ',')]
    ignore: Vec<String>,

    /// Seconds between sync cycles
    #[arg(long, env = "DOCSYNC_INTERVAL", default_value = "5")]
    interval: u64,

    /// Chunk size in characters
    #[arg(long, env = "DOCSYNC_CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, env = "DOCSYNC_CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Embedding dimension
    #[arg(long, env = "DOCSYNC_EMBEDDING_DIM", default_value = "384")]
    embedding_dim: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DOCSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "DOCSYNC_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the directory and keep the index in sync (default)
    Watch,
    /// List indexed documents
    List,
    /// Query the index
    Search {
        /// Query text
        query: String,
        /// Number of results
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
        /// Rank whole documents instead of chunks
        #[arg(long)]
        documents: bool,
        /// Only consider documents below this directory (with --documents)
        /// or chunks of this document (without)
        #[arg(long)]
        within: Option<String>,
    },
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let watch_dir = std::fs::canonicalize(&self.watch_dir).map_err(|e| {
            Error::config(format!(
                "cannot use watch directory '{}': {e}",
                self.watch_dir.display()
            ))
        })?;

        Ok(Config {
            data_dir: self.data_dir.clone(),
            extensions: self.extensions.clone(),
            ignore_patterns: self.ignore.clone(),
            sync_interval: Duration::from_secs(self.interval),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            embedding_dim: self.embedding_dim,
            log_level: self.log_level.clone(),
            log_json: self.log_json,
            ..Config::new(watch_dir)
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    let config = cli.config()?;
    config.validate()?;
    tracing::debug!(?config, "Configuration loaded");

    let embedder = Arc::new(HashEmbedder::new(config.embedding_dim));
    let index = Arc::new(SqliteIndex::open(config.database_path(), embedder)?);

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(&config, index).await,
        Command::List => {
            for (id, _) in index.list_documents()? {
                println!("{id}");
            }
            Ok(())
        }
        Command::Search {
            query,
            limit,
            documents,
            within,
        } => {
            let within = within.as_deref();
            let json = if documents {
                serde_json::to_string_pretty(&index.query_documents(&query, limit, within)?)
            } else {
                serde_json::to_string_pretty(&index.query_chunks(&query, limit, within)?)
            }
            .map_err(|e| Error::internal(format!("failed to encode results: {e}")))?;
            println!("{json}");
            Ok(())
        }
    }
}

async fn watch(config: &Config, index: Arc<SqliteIndex>) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        path = %config.watch_dir.display(),
        database = %config.database_path().display(),
        "docsync starting"
    );

    init_metrics();

    let worker = SyncWorker::from_config(config, index)?;
    let mut states = worker.subscribe();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker.run(cancel.clone()));

    tokio::select! {
        () = shutdown_signal() => cancel.cancel(),
        changed = states.wait_for(|s| *s == WorkerState::Stopped) => {
            if changed.is_err() {
                tracing::warn!("Worker exited without reporting its state");
            }
        }
    }

    handle
        .await
        .map_err(|e| Error::internal(format!("worker task failed: {e}")))??;
    tracing::info!("Shut down gracefully");
    Ok(())
}

/// Wait for SIGTERM or Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
