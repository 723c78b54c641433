//! Tagcache - A byte-budgeted, tag-invalidated HTTP response cache
//!
//! Runs the cache in front of a small set of deliberately slow demo routes.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagcache::{create_router, spawn_cleanup_task, spawn_eviction_listener, AppState, Config};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build store, metrics and eviction controller
/// 4. Start the TTL cleanup task and the store eviction listener
/// 5. Create Axum router with admin and cached routes
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tagcache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: budget={}B, store_capacity={}B, default_ttl={}s, port={}, compression={:?}",
        config.budget_bytes,
        config.store_capacity_bytes,
        config.default_ttl,
        config.server_port,
        config.compression
    );

    let (state, removals) = AppState::from_config(&config);
    info!("Cache initialized");

    let cleanup_handle =
        spawn_cleanup_task(state.controller.store().clone(), config.cleanup_interval);
    let listener_handle = spawn_eviction_listener(state.controller.clone(), removals);
    info!("Background tasks started");

    let app = create_router(state, demo_routes());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(vec![cleanup_handle, listener_handle]))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Slow routes that benefit from caching.
fn demo_routes() -> Router<AppState> {
    Router::new()
        .route("/reports/:name", get(report_handler))
        .route("/search", post(search_handler))
}

/// Simulates an expensive report and tags it for group invalidation.
async fn report_handler(Path(name): Path<String>) -> impl IntoResponse {
    tokio::time::sleep(Duration::from_millis(250)).await;
    let body = Json(json!({
        "report": name,
        "generated_at": chrono::Utc::now().to_rfc3339(),
    }));
    ([("x-cache-tags", format!("reports,report:{}", name))], body)
}

/// Echoes a search request after a delay; keyed by its body digest.
async fn search_handler(Json(query): Json<Value>) -> impl IntoResponse {
    tokio::time::sleep(Duration::from_millis(250)).await;
    let body = Json(json!({
        "query": query,
        "results": [],
        "generated_at": chrono::Utc::now().to_rfc3339(),
    }));
    ([("x-cache-tags", "search".to_string())], body)
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts background tasks.
async fn shutdown_signal(tasks: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for task in tasks {
        task.abort();
    }
    warn!("Background tasks aborted");
}
