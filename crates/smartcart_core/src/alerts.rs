//! crates/smartcart_core/src/alerts.rs
//!
//! Backend price jobs: the alert sweep that turns price drops into in-app
//! notifications, and the daily tracker that records the current price of every
//! tracked product before running the sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{AlertSubscription, NewNotification, PRICE_ALERT_NOTIFICATION};
use crate::ports::{DatabaseService, PortResult};

/// Formats an amount as US dollars, e.g. `$1,299.00`.
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, digit) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

pub fn price_alert_message(title: &str, current: f64, target: f64) -> String {
    format!(
        "Price Alert: {} has dropped to {}, which is at or below your target price of {}.",
        title,
        format_usd(current),
        format_usd(target)
    )
}

//=========================================================================================
// Price Alert Sweep
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Alert-enabled subscriptions examined.
    pub checked: usize,
    /// Subscriptions whose current price was at or below target.
    pub triggered: usize,
    /// Notifications actually written.
    pub notified: usize,
}

impl SweepReport {
    pub fn summary(&self) -> String {
        format!(
            "Checked {} products, found {} alerts to send",
            self.checked, self.triggered
        )
    }
}

pub struct PriceAlertSweeper {
    db: Arc<dyn DatabaseService>,
}

impl PriceAlertSweeper {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    pub async fn run(&self) -> PortResult<SweepReport> {
        info!("Starting price alert check");
        let subscriptions = self.db.list_alert_subscriptions().await?;
        info!(count = subscriptions.len(), "Found products with alerts enabled");

        let triggered: Vec<(&AlertSubscription, f64, f64)> = subscriptions
            .iter()
            .filter_map(|sub| triggered_prices(sub).map(|(c, t)| (sub, c, t)))
            .collect();
        info!(count = triggered.len(), "Found alerts to send");

        let mut notified = 0;
        for (sub, current, target) in &triggered {
            let notification = NewNotification {
                user_id: sub.user_id,
                product_id: sub.product_id,
                message: price_alert_message(&sub.title, *current, *target),
                kind: PRICE_ALERT_NOTIFICATION.to_string(),
                is_read: false,
            };
            match self.db.insert_notification(notification).await {
                Ok(()) => {
                    notified += 1;
                    info!(user_id = %sub.user_id, title = %sub.title, "Created price alert notification");
                }
                Err(e) => error!(error = %e, user_id = %sub.user_id, "Error creating notification"),
            }
        }

        Ok(SweepReport {
            checked: subscriptions.len(),
            triggered: triggered.len(),
            notified,
        })
    }
}

/// Returns `(current, target)` when the subscription should fire.
///
/// Missing or zero prices never fire.
fn triggered_prices(sub: &AlertSubscription) -> Option<(f64, f64)> {
    let current = sub.current_price.filter(|p| *p != 0.0)?;
    let target = sub.alert_price.filter(|p| *p != 0.0)?;
    (current <= target).then_some((current, target))
}

//=========================================================================================
// Daily Price Tracking
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TrackingStatus {
    #[serde(rename = "success")]
    Recorded,
    Skipped { reason: String },
    #[serde(rename = "error")]
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingResult {
    pub product_id: Uuid,
    #[serde(flatten)]
    pub status: TrackingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingReport {
    pub results: Vec<TrackingResult>,
    /// `None` when the follow-up alert sweep failed.
    pub alerts: Option<SweepReport>,
}

impl TrackingReport {
    pub fn summary(&self) -> String {
        format!("Processed {} products", self.results.len())
    }
}

pub struct DailyPriceTracker {
    db: Arc<dyn DatabaseService>,
    sweeper: PriceAlertSweeper,
}

impl DailyPriceTracker {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self {
            sweeper: PriceAlertSweeper::new(db.clone()),
            db,
        }
    }

    pub async fn run(&self) -> PortResult<TrackingReport> {
        info!("Starting daily price tracking job");
        let tracked = self.db.list_tracked_products().await?;

        let mut seen = HashSet::new();
        let unique: Vec<_> = tracked
            .into_iter()
            .filter(|t| seen.insert(t.product_id))
            .collect();
        info!(count = unique.len(), "Processing unique products");

        let mut results = Vec::with_capacity(unique.len());
        for product in unique {
            let status = match product.current_price {
                None => {
                    warn!(product_id = %product.product_id, "No current price available");
                    TrackingStatus::Skipped {
                        reason: "no price available".to_string(),
                    }
                }
                Some(price) => match self
                    .db
                    .insert_price_point(product.product_id, price, Utc::now())
                    .await
                {
                    Ok(()) => {
                        info!(product_id = %product.product_id, price, "Recorded current price");
                        TrackingStatus::Recorded
                    }
                    Err(e) => {
                        error!(error = %e, product_id = %product.product_id, "Error recording price history");
                        TrackingStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                },
            };
            results.push(TrackingResult {
                product_id: product.product_id,
                status,
            });
        }

        let alerts = match self.sweeper.run().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Error checking price alerts");
                None
            }
        };

        Ok(TrackingReport { results, alerts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CatalogProduct, UserProduct};
    use crate::testing::InMemoryDatabase;

    fn product(db: &InMemoryDatabase, title: &str, price: Option<f64>) -> Uuid {
        let id = Uuid::new_v4();
        db.add_product(CatalogProduct {
            id,
            asin: format!("B0{:08}", id.as_u128() % 100_000_000),
            title: title.to_string(),
            current_price: price,
            ..Default::default()
        });
        id
    }

    fn track(db: &InMemoryDatabase, user: u128, product_id: Uuid, target: f64, enabled: bool) {
        db.add_user_product(UserProduct {
            id: Uuid::new_v4(),
            user_id: Uuid::from_u128(user),
            product_id,
            alert_price: Some(target),
            alert_enabled: Some(enabled),
        });
    }

    #[test]
    fn formats_dollars_with_grouping() {
        assert_eq!(format_usd(1299.0), "$1,299.00");
        assert_eq!(format_usd(5.5), "$5.50");
        assert_eq!(format_usd(1234567.891), "$1,234,567.89");
        assert_eq!(format_usd(0.0), "$0.00");
    }

    #[tokio::test]
    async fn sweep_notifies_only_at_or_below_target() {
        let db = Arc::new(InMemoryDatabase::new());
        let cheap = product(&db, "Kettle", Some(25.0));
        let exact = product(&db, "Toaster", Some(40.0));
        let pricey = product(&db, "Blender", Some(120.0));
        track(&db, 1, cheap, 30.0, true);
        track(&db, 1, exact, 40.0, true);
        track(&db, 1, pricey, 100.0, true);
        track(&db, 2, cheap, 30.0, false);

        let report = PriceAlertSweeper::new(db.clone()).run().await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                checked: 3,
                triggered: 2,
                notified: 2
            }
        );
        let notes = db.notifications();
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|n| n.kind == "price_alert" && !n.is_read));
        assert_eq!(
            notes[0].message,
            "Price Alert: Kettle has dropped to $25.00, which is at or below your target price of $30.00."
        );
    }

    #[tokio::test]
    async fn sweep_skips_missing_and_zero_prices() {
        let db = Arc::new(InMemoryDatabase::new());
        let unpriced = product(&db, "Mystery", None);
        let free = product(&db, "Sample", Some(0.0));
        let zero_target = product(&db, "Lamp", Some(10.0));
        track(&db, 1, unpriced, 50.0, true);
        track(&db, 1, free, 50.0, true);
        track(&db, 1, zero_target, 0.0, true);

        let report = PriceAlertSweeper::new(db.clone()).run().await.unwrap();

        assert_eq!(report.checked, 3);
        assert_eq!(report.triggered, 0);
        assert!(db.notifications().is_empty());
    }

    #[tokio::test]
    async fn sweep_propagates_listing_failure() {
        let db = Arc::new(InMemoryDatabase::new());
        db.set_failing(true);
        assert!(PriceAlertSweeper::new(db).run().await.is_err());
    }

    #[tokio::test]
    async fn tracker_dedupes_and_records_prices() {
        let db = Arc::new(InMemoryDatabase::new());
        let shared = product(&db, "Headphones", Some(89.0));
        let unpriced = product(&db, "Preorder", None);
        track(&db, 1, shared, 100.0, true);
        track(&db, 2, shared, 95.0, false);
        track(&db, 1, unpriced, 10.0, true);

        let report = DailyPriceTracker::new(db.clone()).run().await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].product_id, shared);
        assert_eq!(report.results[0].status, TrackingStatus::Recorded);
        assert_eq!(
            report.results[1].status,
            TrackingStatus::Skipped {
                reason: "no price available".to_string()
            }
        );
        assert_eq!(db.price_points(shared).len(), 1);
        assert_eq!(report.alerts.as_ref().map(|a| a.notified), Some(1));
        assert_eq!(report.summary(), "Processed 2 products");
    }

    #[tokio::test]
    async fn tracker_reports_failed_inserts() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = product(&db, "Monitor", Some(199.0));
        track(&db, 1, id, 150.0, true);
        db.set_failing_price_inserts(true);

        let report = DailyPriceTracker::new(db.clone()).run().await.unwrap();

        assert!(matches!(
            report.results[0].status,
            TrackingStatus::Failed { .. }
        ));
        assert_eq!(report.alerts.map(|a| a.triggered), Some(0));
    }

    #[test]
    fn tracking_results_serialize_with_status_tags() {
        let result = TrackingResult {
            product_id: Uuid::nil(),
            status: TrackingStatus::Skipped {
                reason: "no price available".to_string(),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "no price available");
        let ok = serde_json::to_value(TrackingResult {
            product_id: Uuid::nil(),
            status: TrackingStatus::Recorded,
        })
        .unwrap();
        assert_eq!(ok["status"], "success");
    }
}
