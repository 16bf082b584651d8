//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use smartcart_core::domain::{
    AlertSubscription, CatalogProduct, ComparisonHistoryRow, NewComparisonHistory,
    NewNotification, Notification, PricePoint, ProductInsight, ProductUpsert,
    RecentlyViewedEntry, TrackedProduct, User, UserProduct, WatchlistEntry,
};
use smartcart_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const PRODUCT_COLUMNS: &str = "id, asin, title, description, image_url, current_price, \
    original_price, url, availability, customers_say, about_product, product_information, \
    product_details, created_at, updated_at";

#[derive(FromRow)]
struct ProductRecord {
    id: Uuid,
    asin: String,
    title: String,
    description: Option<String>,
    image_url: Option<String>,
    current_price: Option<f64>,
    original_price: Option<f64>,
    url: Option<String>,
    availability: Option<String>,
    customers_say: Option<String>,
    about_product: Option<Value>,
    product_information: Option<Value>,
    product_details: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ProductRecord {
    fn to_domain(self) -> CatalogProduct {
        CatalogProduct {
            id: self.id,
            asin: self.asin,
            title: self.title,
            description: self.description,
            image_url: self.image_url,
            current_price: self.current_price,
            original_price: self.original_price,
            url: self.url,
            availability: self.availability,
            customers_say: self.customers_say,
            about_product: self.about_product,
            product_information: self.product_information,
            product_details: self.product_details,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        }
    }
}

#[derive(FromRow)]
struct PricePointRecord {
    product_id: Uuid,
    price: f64,
    recorded_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct UserProductRecord {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    alert_price: Option<f64>,
    alert_enabled: Option<bool>,
}

#[derive(FromRow)]
struct WatchlistRecord {
    id: Uuid,
    product_id: Uuid,
    asin: String,
    title: String,
    image_url: Option<String>,
    current_price: Option<f64>,
    alert_price: Option<f64>,
    alert_enabled: Option<bool>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AlertSubscriptionRecord {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    alert_price: Option<f64>,
    title: String,
    asin: String,
    current_price: Option<f64>,
    image_url: Option<String>,
    url: Option<String>,
}

#[derive(FromRow)]
struct TrackedProductRecord {
    product_id: Uuid,
    asin: String,
    current_price: Option<f64>,
}

#[derive(FromRow)]
struct NotificationRecord {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    message: String,
    kind: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct RecentlyViewedRecord {
    id: Uuid,
    product_id: Uuid,
    asin: String,
    title: String,
    image_url: Option<String>,
    current_price: Option<f64>,
    viewed_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct InsightRecord {
    product_id: Uuid,
    insight_text: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ComparisonHistoryRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    products: Option<Value>,
    created_at: DateTime<Utc>,
}
impl ComparisonHistoryRecord {
    fn to_domain(self) -> ComparisonHistoryRow {
        ComparisonHistoryRow {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            created_at: self.created_at,
            products: self.products,
        }
    }
}

#[derive(FromRow)]
struct SessionUserRecord {
    user_id: Uuid,
    email: Option<String>,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- Catalog ---
    async fn get_product_by_id(&self, product_id: Uuid) -> PortResult<CatalogProduct> {
        let record = sqlx::query_as::<_, ProductRecord>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Product {} not found", product_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn find_product_by_asin(&self, asin: &str) -> PortResult<Option<CatalogProduct>> {
        let record = sqlx::query_as::<_, ProductRecord>(&format!(
            "SELECT {} FROM products WHERE asin = $1",
            PRODUCT_COLUMNS
        ))
        .bind(asin)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ProductRecord::to_domain))
    }

    async fn insert_product(&self, product: &ProductUpsert) -> PortResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO products (id, asin, title, description, image_url, current_price, \
             original_price, url, availability, customers_say, about_product, \
             product_information, product_details) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&product.asin)
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.image_url)
        .bind(product.current_price)
        .bind(product.original_price)
        .bind(&product.url)
        .bind(&product.availability)
        .bind(&product.customers_say)
        .bind(&product.about_product)
        .bind(&product.product_information)
        .bind(&product.product_details)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(id)
    }

    async fn update_product(&self, product_id: Uuid, product: &ProductUpsert) -> PortResult<()> {
        sqlx::query(
            "UPDATE products SET title = $1, description = $2, image_url = $3, \
             current_price = $4, original_price = $5, url = $6, availability = $7, \
             customers_say = $8, about_product = $9, product_information = $10, \
             product_details = $11, updated_at = NOW() WHERE id = $12",
        )
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.image_url)
        .bind(product.current_price)
        .bind(product.original_price)
        .bind(&product.url)
        .bind(&product.availability)
        .bind(&product.customers_say)
        .bind(&product.about_product)
        .bind(&product.product_information)
        .bind(&product.product_details)
        .bind(product_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    // --- Price History ---
    async fn insert_price_point(
        &self,
        product_id: Uuid,
        price: f64,
        recorded_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO price_history (id, product_id, price, recorded_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(price)
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_price_history(&self, product_id: Uuid) -> PortResult<Vec<PricePoint>> {
        let records = sqlx::query_as::<_, PricePointRecord>(
            "SELECT product_id, price, recorded_at FROM price_history \
             WHERE product_id = $1 ORDER BY recorded_at ASC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| PricePoint {
                product_id: r.product_id,
                price: r.price,
                recorded_at: r.recorded_at,
            })
            .collect())
    }

    // --- Tracking ---
    async fn get_user_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> PortResult<Option<UserProduct>> {
        let record = sqlx::query_as::<_, UserProductRecord>(
            "SELECT id, user_id, product_id, alert_price, alert_enabled FROM user_products \
             WHERE user_id = $1 AND product_id = $2",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| UserProduct {
            id: r.id,
            user_id: r.user_id,
            product_id: r.product_id,
            alert_price: r.alert_price,
            alert_enabled: r.alert_enabled,
        }))
    }

    async fn insert_user_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        alert_price: f64,
        alert_enabled: bool,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_products (id, user_id, product_id, alert_price, alert_enabled) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(product_id)
        .bind(alert_price)
        .bind(alert_enabled)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn update_user_product_alert(
        &self,
        user_product_id: Uuid,
        alert_price: f64,
        alert_enabled: bool,
    ) -> PortResult<()> {
        sqlx::query("UPDATE user_products SET alert_price = $1, alert_enabled = $2 WHERE id = $3")
            .bind(alert_price)
            .bind(alert_enabled)
            .bind(user_product_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_watchlist(&self, user_id: Uuid) -> PortResult<Vec<WatchlistEntry>> {
        let records = sqlx::query_as::<_, WatchlistRecord>(
            "SELECT up.id, p.id AS product_id, p.asin, p.title, p.image_url, p.current_price, \
             up.alert_price, up.alert_enabled, up.created_at \
             FROM user_products up JOIN products p ON p.id = up.product_id \
             WHERE up.user_id = $1 ORDER BY up.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| WatchlistEntry {
                id: r.id,
                product_id: r.product_id,
                asin: r.asin,
                title: r.title,
                image_url: r.image_url,
                current_price: r.current_price,
                alert_price: r.alert_price,
                alert_enabled: r.alert_enabled.unwrap_or(false),
                created_at: Some(r.created_at),
            })
            .collect())
    }

    async fn list_alert_subscriptions(&self) -> PortResult<Vec<AlertSubscription>> {
        let records = sqlx::query_as::<_, AlertSubscriptionRecord>(
            "SELECT up.id, up.user_id, up.product_id, up.alert_price, p.title, p.asin, \
             p.current_price, p.image_url, p.url \
             FROM user_products up JOIN products p ON p.id = up.product_id \
             WHERE up.alert_enabled = TRUE AND up.alert_price IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| AlertSubscription {
                id: r.id,
                user_id: r.user_id,
                product_id: r.product_id,
                alert_price: r.alert_price,
                title: r.title,
                asin: r.asin,
                current_price: r.current_price,
                image_url: r.image_url,
                url: r.url,
            })
            .collect())
    }

    async fn list_tracked_products(&self) -> PortResult<Vec<TrackedProduct>> {
        let records = sqlx::query_as::<_, TrackedProductRecord>(
            "SELECT up.product_id, p.asin, p.current_price \
             FROM user_products up JOIN products p ON p.id = up.product_id \
             WHERE up.alert_price IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| TrackedProduct {
                product_id: r.product_id,
                asin: r.asin,
                current_price: r.current_price,
            })
            .collect())
    }

    // --- Notifications ---
    async fn insert_notification(&self, notification: NewNotification) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, product_id, message, type, is_read) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.product_id)
        .bind(notification.message)
        .bind(notification.kind)
        .bind(notification.is_read)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            "SELECT id, user_id, product_id, message, type AS kind, is_read, created_at \
             FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| Notification {
                id: r.id,
                user_id: r.user_id,
                product_id: r.product_id,
                message: r.message,
                kind: r.kind,
                is_read: r.is_read,
                created_at: r.created_at,
            })
            .collect())
    }

    // --- Recently Viewed ---
    async fn latest_view(&self, user_id: Uuid, product_id: Uuid) -> PortResult<Option<Uuid>> {
        sqlx::query_scalar(
            "SELECT id FROM recently_viewed WHERE user_id = $1 AND product_id = $2 \
             ORDER BY viewed_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn touch_view(&self, view_id: Uuid, viewed_at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE recently_viewed SET viewed_at = $1 WHERE id = $2")
            .bind(viewed_at)
            .bind(view_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_view(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        viewed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO recently_viewed (id, user_id, product_id, viewed_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(product_id)
        .bind(viewed_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn list_recently_viewed(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> PortResult<Vec<RecentlyViewedEntry>> {
        let records = sqlx::query_as::<_, RecentlyViewedRecord>(
            "SELECT rv.id, p.id AS product_id, p.asin, p.title, p.image_url, p.current_price, \
             rv.viewed_at FROM recently_viewed rv JOIN products p ON p.id = rv.product_id \
             WHERE rv.user_id = $1 ORDER BY rv.viewed_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| RecentlyViewedEntry {
                id: r.id,
                product_id: r.product_id,
                asin: r.asin,
                title: r.title,
                image_url: r.image_url,
                current_price: r.current_price,
                viewed_at: r.viewed_at,
            })
            .collect())
    }

    // --- Insights ---
    async fn get_product_insight(&self, product_id: Uuid) -> PortResult<Option<ProductInsight>> {
        let record = sqlx::query_as::<_, InsightRecord>(
            "SELECT product_id, insight_text, created_at FROM product_insights WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| ProductInsight {
            product_id: r.product_id,
            insight_text: r.insight_text,
            created_at: r.created_at,
        }))
    }

    async fn save_product_insight(&self, product_id: Uuid, insight_text: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO product_insights (id, product_id, insight_text, created_at) \
             VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (product_id) DO UPDATE SET insight_text = EXCLUDED.insight_text, \
             created_at = EXCLUDED.created_at",
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(insight_text)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    // --- Comparison History ---
    async fn insert_comparison_history(
        &self,
        record: NewComparisonHistory,
    ) -> PortResult<ComparisonHistoryRow> {
        let row = sqlx::query_as::<_, ComparisonHistoryRecord>(
            "INSERT INTO comparison_history (id, user_id, name, products) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, name, products, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(record.name)
        .bind(record.products)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(row.to_domain())
    }

    async fn list_comparison_history(
        &self,
        user_id: Uuid,
    ) -> PortResult<Vec<ComparisonHistoryRow>> {
        let records = sqlx::query_as::<_, ComparisonHistoryRecord>(
            "SELECT id, user_id, name, products, created_at FROM comparison_history \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_comparison_history(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<ComparisonHistoryRow>> {
        let record = sqlx::query_as::<_, ComparisonHistoryRecord>(
            "SELECT id, user_id, name, products, created_at FROM comparison_history \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn delete_comparison_history(&self, id: Uuid, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM comparison_history WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Comparison {} not found", id)));
        }
        Ok(())
    }

    // --- Auth Sessions ---
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, SessionUserRecord>(
            "SELECT u.user_id, u.email FROM auth_sessions s JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;
        Ok(User {
            user_id: record.user_id,
            email: record.email,
        })
    }
}
