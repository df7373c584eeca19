use anyhow::{Context, Result};
use clap::Parser;
use facereg_core::{FaceRegistry, OnnxProvider};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;

use api::{AppState, UploadLimits};
use config::{Args, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load(&args)?;
    tracing::info!(
        listen = %config.listen_addr,
        faces_dir = %config.faces_dir.display(),
        model_dir = %config.model_dir.display(),
        tolerance = config.tolerance,
        on_multiple_faces = %config.on_multiple_faces,
        "faceregd starting"
    );

    // No models, no service.
    let provider = OnnxProvider::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;

    let registry = Arc::new(FaceRegistry::new(&config.faces_dir, config.tolerance));
    let engine = engine::spawn_engine(
        provider,
        registry.clone(),
        config.on_multiple_faces,
        config.request_timeout(),
    )?;

    let app = api::router(AppState {
        engine,
        registry,
        limits: UploadLimits {
            max_bytes: config.max_upload_bytes,
            min_bytes: config.min_upload_bytes,
        },
        policy: config.on_multiple_faces,
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "faceregd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("faceregd shutting down");
        })
        .await?;

    Ok(())
}
