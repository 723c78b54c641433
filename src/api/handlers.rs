//! API Handlers
//!
//! Administrative HTTP handlers that forward to the eviction controller.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::cache::{
    CacheMetrics, EntryStore, EvictionController, KeyGenerator, RemovalReceiver, StoredEntry,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{EvictKeyQuery, EvictResponse, HealthResponse, MetricsResponse};

/// Application state shared across all handlers and the cache middleware.
#[derive(Clone)]
pub struct AppState {
    /// Admission and eviction logic
    pub controller: Arc<EvictionController>,
    /// Key derivation with the configured reserved parameters
    pub keys: Arc<KeyGenerator>,
    /// Server configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates a new AppState around an existing controller.
    pub fn new(controller: Arc<EvictionController>, config: Config) -> Self {
        let keys = KeyGenerator::new(config.params.names());
        Self {
            controller,
            keys: Arc::new(keys),
            config: Arc::new(config),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds the store, metrics and controller. The returned receiver carries
    /// the store's removal notifications and must be handed to
    /// [`spawn_eviction_listener`](crate::tasks::spawn_eviction_listener).
    pub fn from_config(config: &Config) -> (Self, RemovalReceiver<StoredEntry>) {
        let (store, removals) = EntryStore::new(config.store_capacity_bytes);
        let controller = EvictionController::new(
            Arc::new(store),
            Arc::new(CacheMetrics::new()),
            config.budget_bytes,
        );
        (Self::new(Arc::new(controller), config.clone()), removals)
    }
}

/// Handler for DELETE /cache/key?key=...
///
/// Evicts a single entry by its exact key.
pub async fn evict_key_handler(
    State(state): State<AppState>,
    Query(query): Query<EvictKeyQuery>,
) -> Result<Json<EvictResponse>> {
    if let Some(error_msg) = query.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let removed = state.controller.evict_by_key(&query.key).await;
    info!(key = %query.key, removed, "admin key eviction");
    Ok(Json(EvictResponse::new(removed)))
}

/// Handler for DELETE /cache/tag/:tag
///
/// Evicts every entry carrying the tag.
pub async fn evict_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<EvictResponse> {
    let removed = state.controller.evict_by_tag(&tag).await;
    Json(EvictResponse::new(removed))
}

/// Handler for DELETE /cache
///
/// Flushes every entry and resets all metrics.
pub async fn flush_handler(State(state): State<AppState>) -> Json<EvictResponse> {
    let removed = state.controller.flush().await;
    Json(EvictResponse::new(removed))
}

/// Handler for GET /cache/metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    let metrics = state.controller.metrics();
    Json(MetricsResponse::new(
        metrics.snapshot(),
        state.controller.budget_bytes(),
        metrics.tag_counts(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
