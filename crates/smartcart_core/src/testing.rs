//! In-memory port implementations for tests
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for downstream crates. None of these are meant for production use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AlertSubscription, CatalogProduct, ComparisonHistoryRow, NewComparisonHistory,
    NewNotification, Notification, PricePoint, ProductDetails, ProductInsight, ProductUpsert,
    RecentlyViewedEntry, TrackedProduct, User, UserProduct, WatchlistEntry,
};
use crate::ports::{
    AuthProvider, CompletionRequest, CompletionService, DatabaseService, LocalStorage,
    NoticeLevel, Notifier, PortError, PortResult, ProductDataService,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//=========================================================================================
// Database
//=========================================================================================

#[derive(Debug, Clone)]
struct ViewRecord {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    viewed_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    products: Vec<CatalogProduct>,
    price_history: Vec<PricePoint>,
    user_products: Vec<UserProduct>,
    notifications: Vec<Notification>,
    views: Vec<ViewRecord>,
    insights: HashMap<Uuid, ProductInsight>,
    comparisons: Vec<ComparisonHistoryRow>,
    sessions: HashMap<String, User>,
}

/// A `DatabaseService` backed by vectors, with call counting and failure injection.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    failing: AtomicBool,
    failing_price_inserts: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of port calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every subsequent port call fail with `PortError::Unexpected`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes only `insert_price_point` fail.
    pub fn set_failing_price_inserts(&self, failing: bool) {
        self.failing_price_inserts.store(failing, Ordering::SeqCst);
    }

    pub fn add_product(&self, product: CatalogProduct) {
        lock(&self.tables).products.push(product);
    }

    pub fn add_comparison_row(&self, row: ComparisonHistoryRow) {
        lock(&self.tables).comparisons.push(row);
    }

    pub fn add_user_product(&self, row: UserProduct) {
        lock(&self.tables).user_products.push(row);
    }

    pub fn add_price_point(&self, point: PricePoint) {
        lock(&self.tables).price_history.push(point);
    }

    pub fn add_session(&self, token: &str, user: User) {
        lock(&self.tables).sessions.insert(token.to_string(), user);
    }

    pub fn add_insight(&self, insight: ProductInsight) {
        lock(&self.tables).insights.insert(insight.product_id, insight);
    }

    pub fn products(&self) -> Vec<CatalogProduct> {
        lock(&self.tables).products.clone()
    }

    pub fn price_points(&self, product_id: Uuid) -> Vec<PricePoint> {
        lock(&self.tables)
            .price_history
            .iter()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect()
    }

    pub fn user_products(&self) -> Vec<UserProduct> {
        lock(&self.tables).user_products.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.tables).notifications.clone()
    }

    pub fn view_count(&self, user_id: Uuid) -> usize {
        lock(&self.tables)
            .views
            .iter()
            .filter(|v| v.user_id == user_id)
            .count()
    }

    pub fn insight(&self, product_id: Uuid) -> Option<ProductInsight> {
        lock(&self.tables).insights.get(&product_id).cloned()
    }

    /// Whether a comparison record with `id` exists for any user.
    pub fn has_comparison(&self, id: Uuid) -> bool {
        lock(&self.tables).comparisons.iter().any(|c| c.id == id)
    }

    fn enter(&self) -> PortResult<MutexGuard<'_, Tables>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("database unavailable".to_string()));
        }
        Ok(lock(&self.tables))
    }
}

fn upsert_into(row: &mut CatalogProduct, product: &ProductUpsert) {
    row.asin = product.asin.clone();
    row.title = product.title.clone();
    row.description = product.description.clone();
    row.image_url = product.image_url.clone();
    row.current_price = product.current_price;
    row.original_price = product.original_price;
    row.url = product.url.clone();
    row.availability = Some(product.availability.clone());
    row.customers_say = product.customers_say.clone();
    row.about_product = product.about_product.clone();
    row.product_information = product.product_information.clone();
    row.product_details = product.product_details.clone();
    row.updated_at = Some(Utc::now());
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn get_product_by_id(&self, product_id: Uuid) -> PortResult<CatalogProduct> {
        self.enter()?
            .products
            .iter()
            .find(|p| p.id == product_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Product {} not found", product_id)))
    }

    async fn find_product_by_asin(&self, asin: &str) -> PortResult<Option<CatalogProduct>> {
        Ok(self.enter()?.products.iter().find(|p| p.asin == asin).cloned())
    }

    async fn insert_product(&self, product: &ProductUpsert) -> PortResult<Uuid> {
        let mut tables = self.enter()?;
        let mut row = CatalogProduct {
            id: Uuid::new_v4(),
            created_at: Some(Utc::now()),
            ..Default::default()
        };
        upsert_into(&mut row, product);
        let id = row.id;
        tables.products.push(row);
        Ok(id)
    }

    async fn update_product(&self, product_id: Uuid, product: &ProductUpsert) -> PortResult<()> {
        let mut tables = self.enter()?;
        let row = tables
            .products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| PortError::NotFound(format!("Product {} not found", product_id)))?;
        upsert_into(row, product);
        Ok(())
    }

    async fn insert_price_point(
        &self,
        product_id: Uuid,
        price: f64,
        recorded_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut tables = self.enter()?;
        if self.failing_price_inserts.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("price_history insert failed".to_string()));
        }
        tables.price_history.push(PricePoint {
            product_id,
            price,
            recorded_at,
        });
        Ok(())
    }

    async fn get_price_history(&self, product_id: Uuid) -> PortResult<Vec<PricePoint>> {
        let tables = self.enter()?;
        let mut points: Vec<PricePoint> = tables
            .price_history
            .iter()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.recorded_at);
        Ok(points)
    }

    async fn get_user_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> PortResult<Option<UserProduct>> {
        Ok(self
            .enter()?
            .user_products
            .iter()
            .find(|u| u.user_id == user_id && u.product_id == product_id)
            .cloned())
    }

    async fn insert_user_product(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        alert_price: f64,
        alert_enabled: bool,
    ) -> PortResult<()> {
        self.enter()?.user_products.push(UserProduct {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            alert_price: Some(alert_price),
            alert_enabled: Some(alert_enabled),
        });
        Ok(())
    }

    async fn update_user_product_alert(
        &self,
        user_product_id: Uuid,
        alert_price: f64,
        alert_enabled: bool,
    ) -> PortResult<()> {
        let mut tables = self.enter()?;
        if let Some(row) = tables
            .user_products
            .iter_mut()
            .find(|u| u.id == user_product_id)
        {
            row.alert_price = Some(alert_price);
            row.alert_enabled = Some(alert_enabled);
        }
        Ok(())
    }

    async fn list_watchlist(&self, user_id: Uuid) -> PortResult<Vec<WatchlistEntry>> {
        let tables = self.enter()?;
        Ok(tables
            .user_products
            .iter()
            .filter(|u| u.user_id == user_id)
            .filter_map(|u| {
                let product = tables.products.iter().find(|p| p.id == u.product_id)?;
                Some(WatchlistEntry {
                    id: u.id,
                    product_id: product.id,
                    asin: product.asin.clone(),
                    title: product.title.clone(),
                    image_url: product.image_url.clone(),
                    current_price: product.current_price,
                    alert_price: u.alert_price,
                    alert_enabled: u.alert_enabled.unwrap_or(false),
                    created_at: None,
                })
            })
            .collect())
    }

    async fn list_alert_subscriptions(&self) -> PortResult<Vec<AlertSubscription>> {
        let tables = self.enter()?;
        Ok(tables
            .user_products
            .iter()
            .filter(|u| u.alert_enabled == Some(true) && u.alert_price.is_some())
            .filter_map(|u| {
                let product = tables.products.iter().find(|p| p.id == u.product_id)?;
                Some(AlertSubscription {
                    id: u.id,
                    user_id: u.user_id,
                    product_id: u.product_id,
                    alert_price: u.alert_price,
                    title: product.title.clone(),
                    asin: product.asin.clone(),
                    current_price: product.current_price,
                    image_url: product.image_url.clone(),
                    url: product.url.clone(),
                })
            })
            .collect())
    }

    async fn list_tracked_products(&self) -> PortResult<Vec<TrackedProduct>> {
        let tables = self.enter()?;
        Ok(tables
            .user_products
            .iter()
            .filter(|u| u.alert_price.is_some())
            .filter_map(|u| {
                let product = tables.products.iter().find(|p| p.id == u.product_id)?;
                Some(TrackedProduct {
                    product_id: product.id,
                    asin: product.asin.clone(),
                    current_price: product.current_price,
                })
            })
            .collect())
    }

    async fn insert_notification(&self, notification: NewNotification) -> PortResult<()> {
        self.enter()?.notifications.push(Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            product_id: notification.product_id,
            message: notification.message,
            kind: notification.kind,
            is_read: notification.is_read,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid) -> PortResult<Vec<Notification>> {
        Ok(self
            .enter()?
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn latest_view(&self, user_id: Uuid, product_id: Uuid) -> PortResult<Option<Uuid>> {
        Ok(self
            .enter()?
            .views
            .iter()
            .filter(|v| v.user_id == user_id && v.product_id == product_id)
            .max_by_key(|v| v.viewed_at)
            .map(|v| v.id))
    }

    async fn touch_view(&self, view_id: Uuid, viewed_at: DateTime<Utc>) -> PortResult<()> {
        let mut tables = self.enter()?;
        if let Some(view) = tables.views.iter_mut().find(|v| v.id == view_id) {
            view.viewed_at = viewed_at;
        }
        Ok(())
    }

    async fn insert_view(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        viewed_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.enter()?.views.push(ViewRecord {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            viewed_at,
        });
        Ok(())
    }

    async fn list_recently_viewed(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> PortResult<Vec<RecentlyViewedEntry>> {
        let tables = self.enter()?;
        let mut views: Vec<&ViewRecord> =
            tables.views.iter().filter(|v| v.user_id == user_id).collect();
        views.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
        Ok(views
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .filter_map(|v| {
                let product = tables.products.iter().find(|p| p.id == v.product_id)?;
                Some(RecentlyViewedEntry {
                    id: v.id,
                    product_id: product.id,
                    asin: product.asin.clone(),
                    title: product.title.clone(),
                    image_url: product.image_url.clone(),
                    current_price: product.current_price,
                    viewed_at: v.viewed_at,
                })
            })
            .collect())
    }

    async fn get_product_insight(&self, product_id: Uuid) -> PortResult<Option<ProductInsight>> {
        Ok(self.enter()?.insights.get(&product_id).cloned())
    }

    async fn save_product_insight(&self, product_id: Uuid, insight_text: &str) -> PortResult<()> {
        self.enter()?.insights.insert(
            product_id,
            ProductInsight {
                product_id,
                insight_text: insight_text.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn insert_comparison_history(
        &self,
        record: NewComparisonHistory,
    ) -> PortResult<ComparisonHistoryRow> {
        let row = ComparisonHistoryRow {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            name: record.name,
            created_at: Utc::now(),
            products: Some(record.products),
        };
        self.enter()?.comparisons.push(row.clone());
        Ok(row)
    }

    async fn list_comparison_history(
        &self,
        user_id: Uuid,
    ) -> PortResult<Vec<ComparisonHistoryRow>> {
        let tables = self.enter()?;
        let mut rows: Vec<ComparisonHistoryRow> = tables
            .comparisons
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_comparison_history(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<ComparisonHistoryRow>> {
        Ok(self
            .enter()?
            .comparisons
            .iter()
            .find(|c| c.id == id && c.user_id == user_id)
            .cloned())
    }

    async fn delete_comparison_history(&self, id: Uuid, user_id: Uuid) -> PortResult<()> {
        let mut tables = self.enter()?;
        let before = tables.comparisons.len();
        tables
            .comparisons
            .retain(|c| !(c.id == id && c.user_id == user_id));
        if tables.comparisons.len() == before {
            return Err(PortError::NotFound(format!("Comparison {} not found", id)));
        }
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User> {
        self.enter()?
            .sessions
            .get(session_id)
            .cloned()
            .ok_or(PortError::Unauthorized)
    }
}

//=========================================================================================
// Auth, Storage, Notifications
//=========================================================================================

/// An auth provider whose user is set directly by the test.
#[derive(Default)]
pub struct StaticAuth {
    user: Mutex<Option<User>>,
}

impl StaticAuth {
    pub fn signed_in(user: User) -> Self {
        Self {
            user: Mutex::new(Some(user)),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: User) {
        *lock(&self.user) = Some(user);
    }

    pub fn sign_out(&self) {
        *lock(&self.user) = None;
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> PortResult<Option<User>> {
        Ok(lock(&self.user).clone())
    }
}

#[derive(Default)]
pub struct MemoryLocalStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        lock(&self.items).get(key).cloned()
    }
}

impl LocalStorage for MemoryLocalStorage {
    fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> PortResult<()> {
        lock(&self.items).remove(key);
        Ok(())
    }
}

/// Collects every notice for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        lock(&self.notices).clone()
    }

    pub fn last(&self) -> Option<(NoticeLevel, String)> {
        lock(&self.notices).last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        lock(&self.notices).push((level, message.to_string()));
    }
}

//=========================================================================================
// External APIs
//=========================================================================================

/// A completion service that always answers with the same reply.
#[derive(Default)]
pub struct ScriptedCompletion {
    reply: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model that returns a choice without any content.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> PortResult<Option<String>> {
        lock(&self.requests).push(request);
        Ok(self.reply.clone())
    }
}

/// A product-data API with a fixed catalogue of one product.
#[derive(Default)]
pub struct StubProductData {
    pub product: Option<ProductDetails>,
    pub reviews: Vec<String>,
}

#[async_trait]
impl ProductDataService for StubProductData {
    async fn fetch_product(&self, asin: &str, _country: &str) -> PortResult<ProductDetails> {
        self.product
            .clone()
            .filter(|p| p.asin == asin)
            .ok_or_else(|| PortError::NotFound(format!("Product {} not found", asin)))
    }

    async fn fetch_reviews(&self, _asin: &str, _country: &str) -> PortResult<Vec<String>> {
        Ok(self.reviews.clone())
    }
}
