//! API Module
//!
//! Cache middleware, administrative handlers and routing.
//!
//! # Endpoints
//! - `DELETE /cache/key?key=...` - Evict one key
//! - `DELETE /cache/tag/:tag` - Evict every key carrying a tag
//! - `DELETE /cache` - Flush the cache
//! - `GET /cache/metrics` - Cache metrics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::*;
pub use middleware::cache_middleware;
pub use routes::create_router;
