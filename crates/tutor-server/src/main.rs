//! tutor-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the student-model API over HTTP.
//!
//! # Memory sweep
//!
//! Expired memories are hidden from reads immediately; to reclaim their rows
//! run the sweep from cron or a timer:
//!
//! ```
//! cargo run -p tutor-server -- --sweep-memories
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tutor_core::store::MemoryStore;
use tutor_server::{ServerConfig, app, open_store};

#[derive(Parser)]
#[command(author, version, about = "Tutoring student-model server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Delete expired memories, print how many, and exit.
  #[arg(long)]
  sweep_memories: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TUTOR").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store = open_store(&server_cfg)
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store_path))?;

  if cli.sweep_memories {
    let purged = store
      .purge_expired_memories()
      .await
      .context("memory sweep failed")?;
    println!("{purged}");
    return Ok(());
  }

  let app = app(Arc::new(store), &server_cfg);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
