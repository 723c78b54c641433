//! Eviction Listener Task
//!
//! Delivers the store's removal notifications to the eviction controller on
//! a task of its own, away from whichever request triggered the removal.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{EvictionController, RemovalReceiver, StoredEntry};

/// Spawns the task that reconciles store-driven removals.
///
/// Runs until every sender is dropped or the handle is aborted.
pub fn spawn_eviction_listener(
    controller: Arc<EvictionController>,
    mut removals: RemovalReceiver<StoredEntry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting store eviction listener");

        while let Some(notification) = removals.recv().await {
            let key = notification.key.clone();
            if controller.on_store_evicted(notification).await {
                debug!(key = %key, "store eviction reconciled");
            }
        }

        info!("Store eviction listener stopped");
    })
}
