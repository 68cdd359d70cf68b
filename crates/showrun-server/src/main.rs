//! showrun server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, connects the HTTP generation backend, and serves
//! the JSON pipeline API.
//!
//! # Driving a batch from the command line
//!
//! To run one project's batch to completion without the HTTP surface:
//!
//! ```
//! cargo run -p showrun-server --bin server -- --drive <PROJECT_ID>
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use showrun_core::generate::NoAudit;
use showrun_engine::Pipeline;
use showrun_server::{ServerConfig, app, backend::HttpBackend, warn_stale_batches};
use showrun_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Showrun episode pipeline server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Run this project's batch to completion and exit instead of serving.
  #[arg(long, value_name = "PROJECT_ID")]
  drive: Option<Uuid>,
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
    .add_source(config::Environment::with_prefix("SHOWRUN"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let backend =
    HttpBackend::new(server_cfg.backend_url.clone(), server_cfg.backend_timeout())
      .context("failed to build backend client")?;

  let pipeline = Arc::new(Pipeline::with_config(
    store,
    backend,
    NoAudit,
    server_cfg.pipeline_config(),
  ));

  // Helper mode: drive one batch to completion and exit.
  if let Some(project_id) = cli.drive {
    match pipeline.start_batch(project_id, None).await {
      Ok(_) => {}
      Err(showrun_engine::Error::BatchRunning) => {
        tracing::warn!(%project_id, "batch already marked running; resuming");
      }
      Err(e) => return Err(e).context("failed to start batch"),
    }
    let cursor = pipeline
      .drive(project_id)
      .await
      .context("batch drive failed")?;
    tracing::info!(
      %project_id,
      status = cursor.status.as_str(),
      next_index = cursor.next_index,
      "batch settled"
    );
    return Ok(());
  }

  warn_stale_batches(&pipeline)
    .await
    .context("failed to scan batch cursors")?;

  let router = app(pipeline);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, router).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
