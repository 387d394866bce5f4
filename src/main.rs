use anyhow::{Context, Result};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod store;

use config::{AppConfig, BackendKind};
use services::browser_service::BrowserService;
use store::{ObjectStore, local::LocalStore, memory::MemoryStore, s3::S3Store};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!("Starting bucket-browser with config: {:?}", cfg);

    // --- Initialize store backend ---
    let store = build_store(&cfg).await?;

    // --- Initialize browser service ---
    let shutdown = CancellationToken::new();
    let service = BrowserService::new(store, cfg.browser.clone(), shutdown.clone());

    // --- Build router ---
    let app = routes::routes::app(service, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Construct the configured backend. Credentials and connection details are
/// handed over explicitly here and nowhere else.
async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        BackendKind::S3 => {
            tracing::info!(
                "Using S3 backend (region {}, endpoint {:?})",
                cfg.s3.region,
                cfg.s3.endpoint
            );
            Arc::new(S3Store::connect(&cfg.s3).await)
        }
        BackendKind::Local => {
            tracing::info!(
                "Using local backend (payloads in {}, metadata at {})",
                cfg.storage_dir,
                cfg.database_url
            );
            let store = LocalStore::connect(&cfg.database_url, &cfg.storage_dir)
                .await
                .context("opening local store")?;
            Arc::new(store)
        }
        BackendKind::Memory => {
            tracing::warn!("Using in-memory backend; all data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

/// Resolves on Ctrl+C or SIGTERM and cancels `shutdown`, which stops any
/// listing still being drained.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, shutting down");
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    shutdown.cancel();
}
