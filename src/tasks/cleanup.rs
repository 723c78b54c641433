//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired values out of the store.
//! The store reports each one, so the eviction listener settles the
//! bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::EntryStore;

/// Spawns a background task that periodically drops expired store values.
///
/// # Arguments
/// * `store` - shared reference to the backing store
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// An interval of zero is treated as one second. Missed ticks are delayed
/// rather than bunched up after a slow sweep.
pub fn spawn_cleanup_task(store: Arc<EntryStore>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let period = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            period.as_secs()
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let removed = store.cleanup_expired().await;

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
