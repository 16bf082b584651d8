//! crates/smartcart_core/src/price_history.rs
//!
//! Price history for the product chart. Recorded prices are served when there
//! are enough of them; otherwise a deterministic month of prices is derived
//! from the ASIN and stored so later requests see the same series.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ports::{DatabaseService, PortError, PortResult};

/// Days of history synthesized before today.
const SYNTHETIC_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryReport {
    pub price_history: Vec<ChartPoint>,
    pub lowest_price: Option<f64>,
    pub lowest_date: Option<String>,
}

pub fn camel_chart_url(asin: &str, cache_buster: i64) -> String {
    format!(
        "https://charts.camelcamelcamel.com/us/{}/amazon.png?force=1&zero=0&w=1022&h=529&desired=false&legend=1&ilt=1&tp=all&fo=0&lang=en&t={}",
        asin, cache_buster
    )
}

pub fn camel_product_url(asin: &str) -> String {
    format!("https://camelcamelcamel.com/product/{}", asin)
}

fn chart_date(at: DateTime<Utc>) -> String {
    at.format("%-m/%-d/%Y").to_string()
}

fn pseudo_random(seed: f64, min: f64, max: f64) -> f64 {
    let x = seed.sin() * 10000.0;
    min + (x - x.floor()) * (max - min)
}

/// The synthesized price for `days_ago` days before today.
pub fn synthetic_price(asin: &str, days_ago: i64) -> f64 {
    let seed: f64 = asin.chars().map(|c| c as u32 as f64).sum();
    let day_factor = days_ago as f64 / 10.0;
    let base = 8000.0 + pseudo_random(seed + day_factor, 0.0, 5000.0);
    let variance = 0.9 + pseudo_random(seed * day_factor, 0.0, 0.2);
    (base * variance).round()
}

fn with_lowest(points: Vec<ChartPoint>) -> PriceHistoryReport {
    let lowest = points
        .iter()
        .fold(None::<&ChartPoint>, |best, p| match best {
            Some(b) if b.price <= p.price => Some(b),
            _ => Some(p),
        })
        .cloned();
    PriceHistoryReport {
        lowest_price: lowest.as_ref().map(|p| p.price),
        lowest_date: lowest.map(|p| p.date),
        price_history: points,
    }
}

pub struct PriceHistoryService {
    db: Arc<dyn DatabaseService>,
}

impl PriceHistoryService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    pub async fn price_history(
        &self,
        asin: &str,
        product_id: Uuid,
    ) -> PortResult<PriceHistoryReport> {
        if asin.trim().is_empty() {
            return Err(PortError::Validation(
                "ASIN and productId are required".to_string(),
            ));
        }

        let stored = self.db.get_price_history(product_id).await?;
        if stored.len() > 1 {
            info!(count = stored.len(), %asin, "Serving recorded price history");
            let points = stored
                .into_iter()
                .map(|p| ChartPoint {
                    date: chart_date(p.recorded_at),
                    price: p.price,
                })
                .collect();
            return Ok(with_lowest(points));
        }

        info!(%asin, "Not enough recorded history, synthesizing");
        let now = Utc::now();
        let mut points = Vec::with_capacity(SYNTHETIC_DAYS as usize + 1);
        for days_ago in (0..=SYNTHETIC_DAYS).rev() {
            let at = now - Duration::days(days_ago);
            let price = synthetic_price(asin, days_ago);
            if let Err(e) = self.db.insert_price_point(product_id, price, at).await {
                warn!(error = %e, %product_id, "Error saving price point");
            }
            points.push(ChartPoint {
                date: chart_date(at),
                price,
            });
        }
        Ok(with_lowest(points))
    }
}
