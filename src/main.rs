//! User Segments - segment membership server
//!
//! REST API over a local RocksDB store. Configuration comes from
//! environment variables; run with `--help` to list them.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tracing::info;

use user_segments::config::{self, ServerConfig};
use user_segments::handlers::{build_router, SegmentService};
use user_segments::{metrics, middleware, tracing_setup};

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().skip(1).any(|a| a == "--help" || a == "-h") {
        config::print_env_help();
        return Ok(());
    }

    tracing_setup::init_tracing()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    metrics::register_metrics().context("Failed to register metrics")?;
    info!("Metrics registered at /metrics");

    info!("Starting user segments server...");

    let server_config = ServerConfig::from_env();
    server_config.log();

    let service = Arc::new(SegmentService::new(server_config.clone())?);
    let service_for_shutdown = Arc::clone(&service);

    let app = build_router(service)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(ConcurrencyLimitLayer::new(server_config.max_concurrent_requests))
        .layer(server_config.cors.to_layer());

    let addr = format!("{}:{}", server_config.host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received, flushing store...");

    let flush_timeout = Duration::from_secs(server_config.shutdown_flush_timeout_secs);
    let flush = tokio::task::spawn_blocking(move || service_for_shutdown.flush());

    match tokio::time::timeout(flush_timeout, flush).await {
        Ok(Ok(Ok(()))) => info!("Store flushed successfully"),
        Ok(Ok(Err(e))) => tracing::error!("Failed to flush store: {e:#}"),
        Ok(Err(e)) => tracing::error!("Flush task panicked: {e}"),
        Err(_) => tracing::error!(
            "Store flush timed out after {}s",
            server_config.shutdown_flush_timeout_secs
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
