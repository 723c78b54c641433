//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of the server.
//!
//! # Tasks
//! - TTL Cleanup: Sweeps expired values out of the store at configured intervals
//! - Eviction Listener: Reconciles the store's removal notifications

mod cleanup;
mod eviction_listener;

pub use cleanup::spawn_cleanup_task;
pub use eviction_listener::spawn_eviction_listener;
