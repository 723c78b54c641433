//! API Routes
//!
//! Mounts the administrative endpoints and wraps application routes in the
//! cache middleware.

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    evict_key_handler, evict_tag_handler, flush_handler, health_handler, metrics_handler,
    AppState,
};
use super::middleware::cache_middleware;

/// Creates the main router.
///
/// `cached` holds the application's own routes; each of them runs behind the
/// cache middleware. Admin routes are never cached.
///
/// # Endpoints
/// - `DELETE /cache/key?key=...` - Evict one key
/// - `DELETE /cache/tag/:tag` - Evict every key carrying a tag
/// - `DELETE /cache` - Flush everything and reset metrics
/// - `GET /cache/metrics` - Counters, hit ratio and per-tag key counts
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState, cached: Router<AppState>) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let cached = cached.layer(middleware::from_fn_with_state(
        state.clone(),
        cache_middleware,
    ));

    Router::new()
        .route("/cache", delete(flush_handler))
        .route("/cache/key", delete(evict_key_handler))
        .route("/cache/tag/:tag", delete(evict_tag_handler))
        .route("/cache/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .merge(cached)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
