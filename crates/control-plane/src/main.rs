// Noscope admin API server
// Decision: The worker pool runs in the same process as the HTTP API
// Decision: On shutdown the HTTP server stops first, then in-flight tasks drain

use std::sync::Arc;

use anyhow::{Context, Result};
use noscope_control_plane::{build_app, build_registry, ServerConfig};
use noscope_durable::{
    ControllerError, InMemoryTaskStore, PostgresTaskStore, TaskService, TaskStore,
    WorkerController,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "noscope_control_plane=debug,noscope_durable=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    info!("noscope-control-plane starting...");

    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    let store = build_store(&config).await?;

    let registry = build_registry(&config);
    if registry.is_empty() {
        warn!("Enrichment not configured (NOSCOPE_ENRICH_URL / NOSCOPE_KEY unset); worker cannot start");
    } else {
        info!(
            upsert = config.enrichment.as_ref().is_some_and(|e| e.upsert.is_some()),
            tags = config.enrichment.as_ref().is_some_and(|e| e.tags.is_some()),
            "Enrichment handler registered"
        );
    }

    let controller = WorkerController::new(store.clone(), registry, config.worker.clone());
    let service = Arc::new(TaskService::new(store));

    if !config.api_prefix.is_empty() {
        info!(prefix = %config.api_prefix, "API prefix configured");
    }
    if config.cors_origins.is_empty() {
        info!("CORS not configured (same-origin requests only)");
    } else {
        info!(origins = ?config.cors_origins, "CORS origins configured");
    }

    let app = build_app(service, controller.clone(), &config);

    if config.autostart {
        match controller.start().await {
            Ok(()) => info!(worker_id = %config.worker.worker_id, "Worker started"),
            Err(ControllerError::InvalidConfig(reason)) => {
                warn!("Worker not started: {}", reason);
            }
            Err(e) => return Err(e).context("Failed to start worker"),
        }
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server stopped, draining worker");
    match controller.stop().await {
        Ok(()) | Err(ControllerError::AlreadyStopped) => {}
        Err(e) => warn!("Worker did not stop cleanly: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}

/// PostgreSQL when DATABASE_URL is set, in-memory otherwise
async fn build_store(config: &ServerConfig) -> Result<Arc<dyn TaskStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresTaskStore::connect(url)
                .await
                .context("Failed to connect to database")?;
            store.migrate().await.context("Failed to run migrations")?;
            info!("Connected to database");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set; tasks are kept in memory and lost on restart");
            Ok(Arc::new(InMemoryTaskStore::new()))
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
