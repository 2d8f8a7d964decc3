//! Reel Server
//!
//! HTTP front end for ephemeral rendered artifacts: accepts uploads, runs the
//! renderer, and serves results until the reaper evicts them.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod handlers;
pub mod render;
pub mod service;

use config::ServerConfig;
use handlers::{create_router, AppState};
use reel_janitor::{Reaper, ReaperWorker};
use reel_store::MemoryStore;
use render::CommandRenderer;
use service::ArtifactService;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Server binding or work directory error
    #[error("Failed to bind server: {0}")]
    Bind(#[from] std::io::Error),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `default_level`. A second call is a no-op.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Build the artifact service described by `config`
///
/// Must be called from within a tokio runtime when background deletion is
/// enabled.
pub fn build_service(config: &ServerConfig) -> ArtifactService {
    let renderer = CommandRenderer::new(&config.renderer.program, config.renderer.args.clone());

    ArtifactService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(Reaper::new(config.reaper.clone())),
        Arc::new(renderer),
        &config.work_dir,
        config.chunk_size,
    )
    .with_residual_cleanup(config.clean_residual_files)
}

/// Start the HTTP server
///
/// Creates the work directory, starts the periodic reaper, and serves until
/// Ctrl-C. On shutdown the reaper is stopped and every tracked artifact is
/// cleaned up before returning.
pub async fn start_server(config: ServerConfig) -> Result<(), ServerError> {
    init_tracing(&config.log_level);

    info!("Starting Reel server");
    info!("Bind address: {}", config.bind_addr());
    info!("Work directory: {}", config.work_dir.display());
    info!(
        "Artifact TTL: {} seconds, sweep every {} seconds",
        config.reaper.ttl_secs, config.reaper.sweep_interval_secs
    );

    tokio::fs::create_dir_all(&config.work_dir).await?;

    let service = Arc::new(build_service(&config));

    let shutdown = CancellationToken::new();
    let worker = ReaperWorker::new(service.reaper()).spawn(service.store(), shutdown.clone());

    let state = AppState {
        service: Arc::clone(&service),
        max_upload_bytes: config.max_upload_bytes,
    };
    let app = create_router(state);

    let listener = TcpListener::bind(&config.bind_addr()).await?;
    info!("Server listening on {}", config.bind_addr());

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown signal received");
                }
                _ = signal.cancelled() => {}
            }
        })
        .await;

    shutdown.cancel();
    if let Err(e) = worker.await {
        tracing::error!("Reaper worker terminated abnormally: {}", e);
    }

    service.shutdown_cleanup().await;
    info!("Shutdown complete");

    served.map_err(|e| ServerError::Server(e.to_string()))
}
