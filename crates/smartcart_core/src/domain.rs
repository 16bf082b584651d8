//! crates/smartcart_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! Storage rows keep their loosely-typed JSON columns as raw `serde_json::Value`;
//! the comparison types carry the normalized shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::json_field::deserialize_json_field;

/// A string-keyed mapping, as used by `product_information` and `product_details`.
/// Values keep whatever JSON type the catalog stored.
pub type FlatMap = BTreeMap<String, Value>;

//=========================================================================================
// Users and Auth
//=========================================================================================

// Represents an authenticated user - used throughout app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Session transitions reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(User),
    SignedOut,
}

//=========================================================================================
// Comparison
//=========================================================================================

/// A denormalized snapshot of a catalog product, used only by the comparison feature.
///
/// `id`, `asin` and `title` default to empty strings so that partially-specified
/// records can be deserialized and then validated, rather than rejected wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparedProduct {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub asin: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_json_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub about_product: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_json_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_information: Option<FlatMap>,
    #[serde(
        default,
        deserialize_with = "deserialize_json_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_details: Option<FlatMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<i64>,
}

impl ComparedProduct {
    /// A snapshot is structurally valid when its identity and title are present.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.asin.trim().is_empty() && !self.title.trim().is_empty()
    }

    /// True when any of the three enrichment fields still has to be fetched.
    pub fn needs_enrichment(&self) -> bool {
        self.about_product.is_none()
            || self.product_information.is_none()
            || self.product_details.is_none()
    }
}

/// A named, timestamped, user-owned snapshot of a comparison set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonHistory {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub products: Vec<ComparedProduct>,
}

/// A `comparison_history` row as the store returns it; `products` is opaque JSON.
#[derive(Debug, Clone)]
pub struct ComparisonHistoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub products: Option<Value>,
}

/// The insert payload for a new comparison history record.
#[derive(Debug, Clone)]
pub struct NewComparisonHistory {
    pub user_id: Uuid,
    pub name: String,
    pub products: Value,
}

//=========================================================================================
// Catalog
//=========================================================================================

/// A row of the authoritative `products` table.
#[derive(Debug, Clone, Default)]
pub struct CatalogProduct {
    pub id: Uuid,
    pub asin: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub url: Option<String>,
    pub availability: Option<String>,
    pub customers_say: Option<String>,
    pub about_product: Option<Value>,
    pub product_information: Option<Value>,
    pub product_details: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The sanitized column set written when a product is inserted or updated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductUpsert {
    pub asin: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub url: Option<String>,
    pub availability: String,
    pub customers_say: Option<String>,
    pub about_product: Option<Value>,
    pub product_information: Option<Value>,
    pub product_details: Option<Value>,
}

/// Product details as returned by the external product-data API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub asin: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub url: String,
    pub rating: Option<String>,
    pub num_ratings: i64,
    pub images: Vec<String>,
    pub availability: String,
    pub customers_say: String,
    pub about_product: Vec<String>,
    pub product_information: Value,
    pub product_details: Value,
}

//=========================================================================================
// Price Tracking
//=========================================================================================

/// A single recorded price.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub product_id: Uuid,
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

/// A `user_products` row: a user's tracking relationship with a product.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProduct {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub alert_price: Option<f64>,
    pub alert_enabled: Option<bool>,
}

/// An alert-enabled tracking row joined with the product fields the sweep needs.
#[derive(Debug, Clone)]
pub struct AlertSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub alert_price: Option<f64>,
    pub title: String,
    pub asin: String,
    pub current_price: Option<f64>,
    pub image_url: Option<String>,
    pub url: Option<String>,
}

/// A tracked product for the daily price recording job.
#[derive(Debug, Clone)]
pub struct TrackedProduct {
    pub product_id: Uuid,
    pub asin: String,
    pub current_price: Option<f64>,
}

/// A watchlist row: tracking settings plus display fields of the product.
#[derive(Debug, Clone, Serialize)]
pub struct WatchlistEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub asin: String,
    pub title: String,
    pub image_url: Option<String>,
    pub current_price: Option<f64>,
    pub alert_price: Option<f64>,
    pub alert_enabled: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// A recently viewed product of a user.
#[derive(Debug, Clone, Serialize)]
pub struct RecentlyViewedEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub asin: String,
    pub title: String,
    pub image_url: Option<String>,
    pub current_price: Option<f64>,
    pub viewed_at: DateTime<Utc>,
}

//=========================================================================================
// Notifications and Insights
//=========================================================================================

pub const PRICE_ALERT_NOTIFICATION: &str = "price_alert";

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub message: String,
    pub kind: String,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A cached AI insight for a product.
#[derive(Debug, Clone)]
pub struct ProductInsight {
    pub product_id: Uuid,
    pub insight_text: String,
    pub created_at: DateTime<Utc>,
}
