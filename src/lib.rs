//! Tagcache - A byte-budgeted, tag-invalidated HTTP response cache
//!
//! Memoizes handler output keyed by request identity, reclaims space oldest
//! first when the budget runs out, and invalidates groups of entries by tag.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use tasks::{spawn_cleanup_task, spawn_eviction_listener};
