//! Background consumption.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

use super::consumer::CacheConsumer;

/// Spawn a task that drains the queue whenever `wake` fires, with `interval`
/// as a fallback tick.
///
/// The task runs until aborted.
pub fn spawn_worker(
    consumer: Arc<CacheConsumer>,
    wake: Arc<Notify>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.tick().await; // Skip the first immediate tick
        loop {
            tokio::select! {
                _ = wake.notified() => {}
                _ = interval.tick() => {}
            }

            while let Some(report) = consumer.consume().await {
                if !report.failed.is_empty() {
                    warn!(
                        failed = report.failed.len(),
                        rebuilt = report.rebuilt.len(),
                        "Cache consumption finished with failed rebuilds"
                    );
                }
            }
        }
    })
}
