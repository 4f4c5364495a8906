//! Background Sweeper
//!
//! Periodic expiry pass over the session store.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::store::SessionStore;
use crate::telemetry::{DeviceAuthLogContext, DeviceAuthMetrics, Logger};

/// Spawn a task running `sweep_expired` every `period`.
///
/// The task runs until the returned handle is aborted or the runtime shuts down.
pub fn spawn_sweeper(
    store: Arc<dyn SessionStore>,
    period: Duration,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn DeviceAuthMetrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let stats = store.sweep_expired();
            if stats.expired > 0 || stats.evicted > 0 {
                logger.debug(
                    "Swept device sessions",
                    &DeviceAuthLogContext::new()
                        .operation("sweep")
                        .extra("expired", stats.expired.to_string())
                        .extra("evicted", stats.evicted.to_string()),
                );
                metrics.record_swept(stats.expired, stats.evicted);
            }
            metrics.set_live_sessions(store.len());
        }
    })
}
