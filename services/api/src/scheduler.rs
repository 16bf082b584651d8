//! services/api/src/scheduler.rs
//!
//! Background daily price tracking.
//!
//! Enabled through `PRICE_TRACKING_INTERVAL_HOURS` (default 24, `0` disables).
//! Each tick records the current price of every tracked product and then runs
//! the price alert sweep.

use std::sync::Arc;
use std::time::Duration;

use crate::config::SECONDS_PER_HOUR;
use smartcart_core::alerts::DailyPriceTracker;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Start the price tracker as a background task that runs until `shutdown` fires.
pub fn start_price_tracking_scheduler(
    tracker: Arc<DailyPriceTracker>,
    interval_hours: u64,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    info!("Starting price tracking scheduler: every {} hours", interval_hours);

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(
            interval_hours.saturating_mul(SECONDS_PER_HOUR),
        ));

        // Skip the first immediate tick - tracking is not run on startup
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Price tracking scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    info!("Running scheduled price tracking...");
                    match tracker.run().await {
                        Ok(report) => info!(
                            "Scheduled price tracking completed: {}, {} alerts sent",
                            report.summary(),
                            report.alerts.as_ref().map(|a| a.notified).unwrap_or(0)
                        ),
                        Err(e) => error!("Scheduled price tracking failed: {}", e),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartcart_core::testing::InMemoryDatabase;

    #[tokio::test]
    async fn stops_on_shutdown() {
        let tracker = Arc::new(DailyPriceTracker::new(Arc::new(InMemoryDatabase::new())));
        let shutdown = CancellationToken::new();

        let handle = start_price_tracking_scheduler(tracker, 24, shutdown.clone());
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
