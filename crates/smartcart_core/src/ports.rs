//! crates/smartcart_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AlertSubscription, CatalogProduct, ComparisonHistoryRow, NewComparisonHistory,
    NewNotification, Notification, PricePoint, ProductDetails, ProductInsight, ProductUpsert,
    RecentlyViewedEntry, TrackedProduct, User, UserProduct, WatchlistEntry,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Catalog ---
    async fn get_product_by_id(&self, product_id: Uuid) -> PortResult<CatalogProduct>;

    async fn find_product_by_asin(&self, asin: &str) -> PortResult<Option<CatalogProduct>>;

    async fn insert_product(&self, product: &ProductUpsert) -> PortResult<Uuid>;

    async fn update_product(&self, product_id: Uuid, product: &ProductUpsert) -> PortResult<()>;

    // --- Price History ---
    async fn insert_price_point(
        &self,
        product_id: Uuid,
        price: f64,
        recorded_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the product's recorded prices, oldest first.
    async fn get_price_history(&self, product_id: Uuid) -> PortResult<Vec<PricePoint>>;

    // --- Tracking ---
    async fn get_user_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> PortResult<Option<UserProduct>>;

    async fn insert_user_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        alert_price: f64,
        alert_enabled: bool,
    ) -> PortResult<()>;

    async fn update_user_product_alert(
        &self,
        user_product_id: Uuid,
        alert_price: f64,
        alert_enabled: bool,
    ) -> PortResult<()>;

    async fn list_watchlist(&self, user_id: Uuid) -> PortResult<Vec<WatchlistEntry>>;

    /// Rows with `alert_enabled = true` and a non-null `alert_price`.
    async fn list_alert_subscriptions(&self) -> PortResult<Vec<AlertSubscription>>;

    /// Rows with a non-null `alert_price`, one entry per tracking row.
    async fn list_tracked_products(&self) -> PortResult<Vec<TrackedProduct>>;

    // --- Notifications ---
    async fn insert_notification(&self, notification: NewNotification) -> PortResult<()>;

    async fn list_notifications(&self, user_id: Uuid) -> PortResult<Vec<Notification>>;

    // --- Recently Viewed ---
    async fn latest_view(&self, user_id: Uuid, product_id: Uuid) -> PortResult<Option<Uuid>>;

    async fn touch_view(&self, view_id: Uuid, viewed_at: DateTime<Utc>) -> PortResult<()>;

    async fn insert_view(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        viewed_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn list_recently_viewed(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> PortResult<Vec<RecentlyViewedEntry>>;

    // --- Insights ---
    async fn get_product_insight(&self, product_id: Uuid) -> PortResult<Option<ProductInsight>>;

    async fn save_product_insight(&self, product_id: Uuid, insight_text: &str) -> PortResult<()>;

    // --- Comparison History ---
    async fn insert_comparison_history(
        &self,
        record: NewComparisonHistory,
    ) -> PortResult<ComparisonHistoryRow>;

    /// Returns the user's saved comparisons, newest first.
    async fn list_comparison_history(&self, user_id: Uuid)
        -> PortResult<Vec<ComparisonHistoryRow>>;

    /// The record with `id` if it belongs to `user_id`.
    async fn get_comparison_history(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<ComparisonHistoryRow>>;

    /// Deletes the user's record; `NotFound` when the user owns no such record.
    async fn delete_comparison_history(&self, id: Uuid, user_id: Uuid) -> PortResult<()>;

    // --- Auth Sessions ---
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The signed-in user, or `None` when there is no valid session.
    async fn current_user(&self) -> PortResult<Option<User>>;

    /// Whether a session currently exists.
    async fn has_session(&self) -> PortResult<bool> {
        Ok(self.current_user().await?.is_some())
    }
}

/// Durable key-value storage local to the client session.
pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> PortResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> PortResult<()>;
    fn remove_item(&self, key: &str) -> PortResult<()>;
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Surfaces short messages to the user (toasts, terminal lines, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

#[async_trait]
pub trait ProductDataService: Send + Sync {
    /// Fetches full product details for an ASIN in a marketplace country.
    async fn fetch_product(&self, asin: &str, country: &str) -> PortResult<ProductDetails>;

    /// Fetches the text of the product's customer reviews.
    async fn fetch_reviews(&self, asin: &str, country: &str) -> PortResult<Vec<String>>;
}

/// A single chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the text of the first choice, or `None` if the model produced no content.
    async fn complete(&self, request: CompletionRequest) -> PortResult<Option<String>>;
}
