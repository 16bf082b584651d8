//! crates/smartcart_core/src/comparison.rs
//!
//! The comparison state manager: the working set of up to four products, mirrored
//! to local storage, plus the user's saved comparison history.
//!
//! The manager is constructed once per client session with its collaborators
//! injected. State lives behind a mutex that is never held across an `.await`, so
//! a shared handle can serve several callers; overlapping save/load calls are not
//! serialized against each other and the last one to finish wins.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    AuthEvent, CatalogProduct, ComparedProduct, ComparisonHistory, ComparisonHistoryRow,
    NewComparisonHistory, User,
};
use crate::json_field::parse_json_field;
use crate::ports::{
    AuthProvider, DatabaseService, LocalStorage, NoticeLevel, Notifier, PortError,
};

/// The local storage key holding the serialized working set.
pub const COMPARE_STORAGE_KEY: &str = "smartcart.compared_products";

/// Maximum number of products in the working set.
pub const MAX_COMPARED_PRODUCTS: usize = 4;

//=========================================================================================
// Errors
//=========================================================================================

/// Why a comparison operation did not take effect.
///
/// By the time one of these is returned it has already been logged and shown to
/// the user, so callers are free to ignore it.
#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("product has no id")]
    InvalidProduct,
    #[error("comparison already holds {0} products")]
    CompareFull(usize),
    #[error("product {0} is already being compared")]
    AlreadyInCompare(String),
    #[error("there are no products to save")]
    EmptyComparison,
    #[error("comparison name is empty")]
    MissingName,
    #[error("no authenticated user")]
    NotAuthenticated,
    #[error("invalid comparison id {0:?}")]
    InvalidId(String),
    #[error("comparison {0} not found")]
    NotFound(String),
    #[error("saving the comparison failed: {0}")]
    SaveFailed(PortError),
    #[error("loading comparison history failed: {0}")]
    HistoryLoadFailed(PortError),
    #[error("loading the comparison failed: {0}")]
    LoadFailed(PortError),
    #[error("deleting the comparison failed: {0}")]
    DeleteFailed(PortError),
}

impl ComparisonError {
    /// The message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidProduct => "Cannot add an invalid product to comparison".to_string(),
            Self::CompareFull(max) => format!("You can compare up to {} products", max),
            Self::AlreadyInCompare(_) => "Product already in comparison".to_string(),
            Self::EmptyComparison => "No products to save for comparison".to_string(),
            Self::MissingName => "Please enter a name for this comparison".to_string(),
            Self::NotAuthenticated => "You need to be logged in to save comparisons".to_string(),
            Self::InvalidId(_) => "Cannot use a comparison with an invalid ID".to_string(),
            Self::NotFound(_) => "No comparison found with the given ID".to_string(),
            Self::SaveFailed(_) => "Failed to save comparison".to_string(),
            Self::HistoryLoadFailed(_) => "Failed to load comparison history".to_string(),
            Self::LoadFailed(_) => "Failed to load comparison".to_string(),
            Self::DeleteFailed(_) => "Failed to delete comparison".to_string(),
        }
    }

    pub fn level(&self) -> NoticeLevel {
        match self {
            Self::AlreadyInCompare(_) => NoticeLevel::Info,
            _ => NoticeLevel::Error,
        }
    }
}

//=========================================================================================
// The Manager
//=========================================================================================

#[derive(Default)]
struct ComparisonState {
    compared: Vec<ComparedProduct>,
    history: Vec<ComparisonHistory>,
}

pub struct ComparisonManager {
    auth: Arc<dyn AuthProvider>,
    db: Arc<dyn DatabaseService>,
    storage: Arc<dyn LocalStorage>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ComparisonState>,
}

impl ComparisonManager {
    /// Creates a manager and hydrates the working set from local storage.
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        db: Arc<dyn DatabaseService>,
        storage: Arc<dyn LocalStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let compared = hydrate(storage.as_ref());
        Self {
            auth,
            db,
            storage,
            notifier,
            state: Mutex::new(ComparisonState {
                compared,
                history: Vec::new(),
            }),
        }
    }

    /// Loads the history if a session already exists.
    pub async fn initialize(&self) -> Result<(), ComparisonError> {
        match self.auth.has_session().await {
            Ok(true) => self.load_comparison_history().await,
            Ok(false) => Ok(()),
            Err(e) => {
                error!(error = %e, "Failed to check the auth session");
                Err(self.fail(ComparisonError::HistoryLoadFailed(e)))
            }
        }
    }

    /// Reloads history on sign-in and forgets it on sign-out.
    pub async fn handle_auth_event(&self, event: &AuthEvent) -> Result<(), ComparisonError> {
        match event {
            AuthEvent::SignedIn(user) => {
                debug!(user_id = %user.user_id, "Signed in, loading comparison history");
                self.load_comparison_history().await
            }
            AuthEvent::SignedOut => {
                debug!("Signed out, clearing comparison history");
                self.state().history.clear();
                Ok(())
            }
        }
    }

    /// Applies auth events until the sending side goes away.
    pub async fn run_auth_listener(&self, mut events: broadcast::Receiver<AuthEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    // Failures are already reported to the user.
                    let _ = self.handle_auth_event(&event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth listener fell behind; some events were dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Working set
    //-------------------------------------------------------------------------------------

    pub fn compared_products(&self) -> Vec<ComparedProduct> {
        self.state().compared.clone()
    }

    pub fn comparison_history(&self) -> Vec<ComparisonHistory> {
        self.state().history.clone()
    }

    pub fn is_in_compare(&self, product_id: &str) -> bool {
        if product_id.is_empty() {
            error!("Invalid product ID for comparison check");
            return false;
        }
        self.state().compared.iter().any(|p| p.id == product_id)
    }

    /// Appends a product to the working set, filling in missing enrichment fields
    /// from the catalog first.
    pub async fn add_to_compare(&self, product: ComparedProduct) -> Result<(), ComparisonError> {
        if product.id.trim().is_empty() {
            error!(asin = %product.asin, "Invalid product object: missing id");
            return Err(self.fail(ComparisonError::InvalidProduct));
        }

        let admitted = admit(&self.state().compared, &product.id);
        if let Err(e) = admitted {
            return Err(self.fail(e));
        }

        let product = if product.needs_enrichment() {
            enrich(self.db.as_ref(), product).await
        } else {
            product
        };

        // The set may have changed while the catalog lookup was in flight.
        let committed = {
            let mut state = self.state();
            let admitted = admit(&state.compared, &product.id);
            if admitted.is_ok() {
                state.compared.push(product);
                self.persist(&state.compared);
            }
            admitted
        };
        if let Err(e) = committed {
            return Err(self.fail(e));
        }

        self.notifier.notify(NoticeLevel::Success, "Added to comparison");
        Ok(())
    }

    /// Removes a product by id. Returns whether anything was removed.
    pub fn remove_from_compare(&self, product_id: &str) -> bool {
        if product_id.is_empty() {
            error!("Invalid product ID for removal");
            return false;
        }

        let removed = {
            let mut state = self.state();
            let before = state.compared.len();
            state.compared.retain(|p| p.id != product_id);
            let removed = state.compared.len() != before;
            if removed {
                self.persist(&state.compared);
            }
            removed
        };

        if removed {
            self.notifier.notify(NoticeLevel::Info, "Removed from comparison");
        }
        removed
    }

    pub fn clear_compare(&self) {
        self.state().compared.clear();
        if let Err(e) = self.storage.remove_item(COMPARE_STORAGE_KEY) {
            error!(error = %e, "Failed to clear stored comparison products");
        }
    }

    //-------------------------------------------------------------------------------------
    // History
    //-------------------------------------------------------------------------------------

    /// Saves the working set under `name` and refreshes the history list.
    pub async fn save_comparison(&self, name: &str) -> Result<Uuid, ComparisonError> {
        let products = self.compared_products();
        if products.is_empty() {
            return Err(self.fail(ComparisonError::EmptyComparison));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(self.fail(ComparisonError::MissingName));
        }

        let user = self
            .require_user(ComparisonError::SaveFailed)
            .await
            .map_err(|e| self.fail(e))?;

        let payload = serde_json::to_value(&products)
            .map_err(|e| PortError::Unexpected(e.to_string()))
            .map_err(|e| self.fail(ComparisonError::SaveFailed(e)))?;

        let record = self
            .db
            .insert_comparison_history(NewComparisonHistory {
                user_id: user.user_id,
                name: name.to_string(),
                products: payload,
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Error saving comparison");
                self.fail(ComparisonError::SaveFailed(e))
            })?;

        info!(comparison_id = %record.id, products = products.len(), "Comparison saved");
        self.notifier.notify(NoticeLevel::Success, "Comparison saved successfully");

        if let Err(e) = self.load_comparison_history().await {
            warn!(error = %e, "Saved comparison but could not refresh the history list");
        }
        Ok(record.id)
    }

    /// Replaces the in-memory history with the user's records, newest first.
    /// Without a signed-in user this does nothing.
    pub async fn load_comparison_history(&self) -> Result<(), ComparisonError> {
        let user = match self.auth.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(error = %e, "Failed to resolve the current user");
                return Err(self.fail(ComparisonError::HistoryLoadFailed(e)));
            }
        };

        let rows = self
            .db
            .list_comparison_history(user.user_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Error loading comparison history");
                self.fail(ComparisonError::HistoryLoadFailed(e))
            })?;

        let history: Vec<ComparisonHistory> = rows.into_iter().map(history_from_row).collect();
        debug!(records = history.len(), "Loaded comparison history");
        self.state().history = history;
        Ok(())
    }

    /// Replaces the working set with one of the signed-in user's saved comparisons.
    pub async fn load_comparison_by_id(&self, id: &str) -> Result<(), ComparisonError> {
        let history_id = parse_history_id(id).map_err(|e| self.fail(e))?;
        let user = self
            .require_user(ComparisonError::LoadFailed)
            .await
            .map_err(|e| self.fail(e))?;

        let row = match self.db.get_comparison_history(history_id, user.user_id).await {
            Ok(Some(row)) => row,
            Ok(None) => return Err(self.fail(ComparisonError::NotFound(id.to_string()))),
            Err(e) => {
                error!(comparison_id = %history_id, error = %e, "Error loading comparison");
                return Err(self.fail(ComparisonError::LoadFailed(e)));
            }
        };

        let Some(raw) = row.products.filter(|v| !v.is_null()) else {
            return Err(self.fail(ComparisonError::NotFound(id.to_string())));
        };

        let (valid, dropped) = normalize_products(raw);
        if dropped > 0 {
            warn!(
                comparison_id = %history_id,
                dropped,
                "Some products were filtered out due to invalid data"
            );
        }

        let db = self.db.as_ref();
        let enriched: Vec<ComparedProduct> = join_all(valid.into_iter().map(|product| async move {
            if product.needs_enrichment() {
                enrich(db, product).await
            } else {
                product
            }
        }))
        .await;

        {
            let mut state = self.state();
            state.compared = enriched;
            self.persist(&state.compared);
        }

        self.notifier.notify(NoticeLevel::Success, "Comparison loaded");
        Ok(())
    }

    pub async fn delete_comparison_history(&self, id: &str) -> Result<(), ComparisonError> {
        let history_id = parse_history_id(id).map_err(|e| self.fail(e))?;
        let user = self
            .require_user(ComparisonError::DeleteFailed)
            .await
            .map_err(|e| self.fail(e))?;

        match self
            .db
            .delete_comparison_history(history_id, user.user_id)
            .await
        {
            Ok(()) => {}
            Err(PortError::NotFound(_)) => {
                return Err(self.fail(ComparisonError::NotFound(id.to_string())));
            }
            Err(e) => {
                error!(comparison_id = %history_id, error = %e, "Error deleting comparison");
                return Err(self.fail(ComparisonError::DeleteFailed(e)));
            }
        }

        self.state().history.retain(|c| c.id != history_id);
        self.notifier.notify(NoticeLevel::Success, "Comparison deleted");
        Ok(())
    }

    //-------------------------------------------------------------------------------------
    // Helpers
    //-------------------------------------------------------------------------------------

    fn state(&self) -> MutexGuard<'_, ComparisonState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, err: ComparisonError) -> ComparisonError {
        self.notifier.notify(err.level(), &err.user_message());
        err
    }

    /// The signed-in user; `on_error` wraps a failure of the auth provider itself.
    async fn require_user(
        &self,
        on_error: fn(PortError) -> ComparisonError,
    ) -> Result<User, ComparisonError> {
        match self.auth.current_user().await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(ComparisonError::NotAuthenticated),
            Err(e) => {
                error!(error = %e, "Failed to resolve the current user");
                Err(on_error(e))
            }
        }
    }

    fn persist(&self, products: &[ComparedProduct]) {
        let serialized = match serde_json::to_string(products) {
            Ok(serialized) => serialized,
            Err(e) => {
                error!(error = %e, "Failed to serialize comparison products");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(COMPARE_STORAGE_KEY, &serialized) {
            error!(error = %e, "Failed to persist comparison products");
        }
    }
}

//=========================================================================================
// Free Functions
//=========================================================================================

fn admit(compared: &[ComparedProduct], product_id: &str) -> Result<(), ComparisonError> {
    if compared.len() >= MAX_COMPARED_PRODUCTS {
        return Err(ComparisonError::CompareFull(MAX_COMPARED_PRODUCTS));
    }
    if compared.iter().any(|p| p.id == product_id) {
        return Err(ComparisonError::AlreadyInCompare(product_id.to_string()));
    }
    Ok(())
}

fn parse_history_id(id: &str) -> Result<Uuid, ComparisonError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        error!("Invalid comparison ID");
        return Err(ComparisonError::InvalidId(id.to_string()));
    }
    Uuid::parse_str(trimmed).map_err(|_| {
        error!(comparison_id = %trimmed, "Comparison ID is not a UUID");
        ComparisonError::InvalidId(id.to_string())
    })
}

/// Fetches the catalog row for `product` and merges its normalized enrichment fields.
/// Lookup failures leave the product as it was.
async fn enrich(db: &dyn DatabaseService, product: ComparedProduct) -> ComparedProduct {
    let Ok(product_id) = Uuid::parse_str(&product.id) else {
        warn!(product_id = %product.id, "Cannot enrich a product whose id is not a UUID");
        return product;
    };
    match db.get_product_by_id(product_id).await {
        Ok(row) => merge_enrichment(product, &row),
        Err(e) => {
            error!(product_id = %product_id, error = %e, "Error fetching complete product details");
            product
        }
    }
}

fn merge_enrichment(product: ComparedProduct, row: &CatalogProduct) -> ComparedProduct {
    ComparedProduct {
        about_product: Some(parse_json_field(row.about_product.as_ref(), Vec::new())),
        product_information: Some(parse_json_field(
            row.product_information.as_ref(),
            Default::default(),
        )),
        product_details: Some(parse_json_field(row.product_details.as_ref(), Default::default())),
        ..product
    }
}

/// Decodes a stored product list, keeping only structurally valid entries.
/// Returns the survivors and how many entries were dropped.
fn normalize_products(raw: Value) -> (Vec<ComparedProduct>, usize) {
    let entries: Vec<Value> = parse_json_field(raw, Vec::new());
    let total = entries.len();
    let valid: Vec<ComparedProduct> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<ComparedProduct>(entry).ok())
        .filter(ComparedProduct::is_valid)
        .collect();
    let dropped = total - valid.len();
    (valid, dropped)
}

fn history_from_row(row: ComparisonHistoryRow) -> ComparisonHistory {
    let (products, dropped) = match row.products {
        Some(raw) => normalize_products(raw),
        None => (Vec::new(), 0),
    };
    if dropped > 0 {
        warn!(comparison_id = %row.id, dropped, "Dropped invalid products from saved comparison");
    }
    ComparisonHistory {
        id: row.id,
        name: row.name,
        created_at: row.created_at,
        products,
    }
}

fn hydrate(storage: &dyn LocalStorage) -> Vec<ComparedProduct> {
    let raw = match storage.get_item(COMPARE_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            error!(error = %e, "Failed to read saved comparison products");
            return Vec::new();
        }
    };

    let entries = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!("Saved comparison products are not a list; starting empty");
            return Vec::new();
        }
        Err(e) => {
            error!(error = %e, "Error parsing saved comparison products");
            return Vec::new();
        }
    };

    let stored = entries.len();
    let mut products: Vec<ComparedProduct> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ComparedProduct>(entry) {
            Ok(product) => Some(product),
            Err(e) => {
                warn!(error = %e, "Dropping saved comparison product that cannot be decoded");
                None
            }
        })
        .filter(|p| !p.id.trim().is_empty())
        .collect();
    if products.len() < stored {
        warn!(
            dropped = stored - products.len(),
            "Some saved comparison products were dropped due to invalid data"
        );
    }
    if products.len() > MAX_COMPARED_PRODUCTS {
        warn!(
            stored = products.len(),
            "Saved comparison exceeds the maximum size; truncating"
        );
        products.truncate(MAX_COMPARED_PRODUCTS);
    }
    products
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryDatabase, MemoryLocalStorage, RecordingNotifier, StaticAuth};
    use chrono::{Duration, Utc};
    use serde_json::json;

    struct Harness {
        auth: Arc<StaticAuth>,
        db: Arc<InMemoryDatabase>,
        storage: Arc<MemoryLocalStorage>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                auth: Arc::new(StaticAuth::signed_in(user())),
                db: Arc::new(InMemoryDatabase::new()),
                storage: Arc::new(MemoryLocalStorage::new()),
                notifier: Arc::new(RecordingNotifier::new()),
            }
        }

        fn manager(&self) -> ComparisonManager {
            ComparisonManager::new(
                self.auth.clone(),
                self.db.clone(),
                self.storage.clone(),
                self.notifier.clone(),
            )
        }
    }

    fn user() -> User {
        User {
            user_id: Uuid::from_u128(7),
            email: Some("shopper@example.com".to_string()),
        }
    }

    fn snapshot(id: Uuid, asin: &str) -> ComparedProduct {
        ComparedProduct {
            id: id.to_string(),
            asin: asin.to_string(),
            title: format!("Product {}", asin),
            current_price: Some(19.99),
            ..Default::default()
        }
    }

    fn enriched_snapshot(id: Uuid, asin: &str) -> ComparedProduct {
        ComparedProduct {
            about_product: Some(vec!["Durable".to_string()]),
            product_information: Some(Default::default()),
            product_details: Some(Default::default()),
            ..snapshot(id, asin)
        }
    }

    fn catalog_row(id: Uuid, asin: &str) -> CatalogProduct {
        CatalogProduct {
            id,
            asin: asin.to_string(),
            title: format!("Product {}", asin),
            about_product: Some(json!(r#"["Fast charging","USB-C"]"#)),
            product_information: Some(json!({"Brand": "Acme"})),
            product_details: None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_enriches_from_catalog_and_persists() {
        let h = Harness::new();
        let id = Uuid::new_v4();
        h.db.add_product(catalog_row(id, "B000000001"));
        let manager = h.manager();

        manager.add_to_compare(snapshot(id, "B000000001")).await.unwrap();

        let products = manager.compared_products();
        assert_eq!(products.len(), 1);
        assert_eq!(
            products[0].about_product,
            Some(vec!["Fast charging".to_string(), "USB-C".to_string()])
        );
        assert_eq!(
            products[0]
                .product_information
                .as_ref()
                .and_then(|m| m.get("Brand"))
                .and_then(Value::as_str),
            Some("Acme")
        );
        assert_eq!(products[0].product_details, Some(Default::default()));
        assert!(h.storage.get_raw(COMPARE_STORAGE_KEY).is_some());
        assert_eq!(
            h.notifier.last(),
            Some((NoticeLevel::Success, "Added to comparison".to_string()))
        );
    }

    #[tokio::test]
    async fn enrichment_keeps_non_string_map_values() {
        let h = Harness::new();
        let id = Uuid::new_v4();
        h.db.add_product(CatalogProduct {
            product_information: Some(json!({"Brand": "Acme", "Item Weight": 1.5})),
            product_details: Some(json!(r#"{"Batteries": true, "Color": "Black"}"#)),
            ..catalog_row(id, "B000000011")
        });
        let manager = h.manager();

        manager.add_to_compare(snapshot(id, "B000000011")).await.unwrap();

        let product = &manager.compared_products()[0];
        let information = product.product_information.as_ref().unwrap();
        assert_eq!(information.get("Brand"), Some(&json!("Acme")));
        assert_eq!(information.get("Item Weight"), Some(&json!(1.5)));
        let details = product.product_details.as_ref().unwrap();
        assert_eq!(details.get("Batteries"), Some(&json!(true)));
        assert_eq!(details.len(), 2);
    }

    #[tokio::test]
    async fn add_keeps_product_when_catalog_lookup_fails() {
        let h = Harness::new();
        let manager = h.manager();
        let id = Uuid::new_v4();

        manager.add_to_compare(snapshot(id, "B000000002")).await.unwrap();

        let products = manager.compared_products();
        assert_eq!(products.len(), 1);
        assert!(products[0].about_product.is_none());
    }

    #[tokio::test]
    async fn add_skips_lookup_for_complete_snapshots() {
        let h = Harness::new();
        let manager = h.manager();

        manager
            .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000003"))
            .await
            .unwrap();

        assert_eq!(h.db.call_count(), 0);
    }

    #[tokio::test]
    async fn add_rejects_missing_id() {
        let h = Harness::new();
        let manager = h.manager();
        let mut product = snapshot(Uuid::new_v4(), "B000000004");
        product.id = String::new();

        let err = manager.add_to_compare(product).await.unwrap_err();

        assert!(matches!(err, ComparisonError::InvalidProduct));
        assert!(manager.compared_products().is_empty());
        assert_eq!(h.notifier.last().map(|n| n.0), Some(NoticeLevel::Error));
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_a_fifth_product() {
        let h = Harness::new();
        let manager = h.manager();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

        for (i, id) in ids.iter().take(4).enumerate() {
            manager
                .add_to_compare(enriched_snapshot(*id, &format!("B00000001{}", i)))
                .await
                .unwrap();
        }

        let dup = manager
            .add_to_compare(enriched_snapshot(ids[0], "B000000010"))
            .await
            .unwrap_err();
        assert!(matches!(dup, ComparisonError::CompareFull(4)));

        let fifth = manager
            .add_to_compare(enriched_snapshot(ids[4], "B000000019"))
            .await
            .unwrap_err();
        assert!(matches!(fifth, ComparisonError::CompareFull(4)));
        assert_eq!(manager.compared_products().len(), 4);
    }

    #[tokio::test]
    async fn add_reports_duplicate_as_info() {
        let h = Harness::new();
        let manager = h.manager();
        let id = Uuid::new_v4();
        manager.add_to_compare(enriched_snapshot(id, "B000000020")).await.unwrap();

        let err = manager
            .add_to_compare(enriched_snapshot(id, "B000000020"))
            .await
            .unwrap_err();

        assert!(matches!(err, ComparisonError::AlreadyInCompare(_)));
        assert_eq!(manager.compared_products().len(), 1);
        assert_eq!(
            h.notifier.last(),
            Some((NoticeLevel::Info, "Product already in comparison".to_string()))
        );
    }

    #[tokio::test]
    async fn remove_and_membership() {
        let h = Harness::new();
        let manager = h.manager();
        let id = Uuid::new_v4();
        manager.add_to_compare(enriched_snapshot(id, "B000000030")).await.unwrap();

        assert!(manager.is_in_compare(&id.to_string()));
        assert!(!manager.is_in_compare(""));
        assert!(!manager.remove_from_compare("missing"));
        assert!(manager.remove_from_compare(&id.to_string()));
        assert!(!manager.is_in_compare(&id.to_string()));
        assert_eq!(h.storage.get_raw(COMPARE_STORAGE_KEY).as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn clear_then_reload_is_empty() {
        let h = Harness::new();
        let manager = h.manager();
        manager
            .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000040"))
            .await
            .unwrap();

        manager.clear_compare();

        assert!(manager.compared_products().is_empty());
        assert!(h.storage.get_raw(COMPARE_STORAGE_KEY).is_none());
        assert!(h.manager().compared_products().is_empty());
    }

    #[tokio::test]
    async fn working_set_survives_restart() {
        let h = Harness::new();
        let id = Uuid::new_v4();
        h.db.add_product(catalog_row(id, "B000000050"));
        let before = {
            let manager = h.manager();
            manager.add_to_compare(snapshot(id, "B000000050")).await.unwrap();
            manager
                .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000051"))
                .await
                .unwrap();
            manager.compared_products()
        };

        let restarted = h.manager();

        assert_eq!(restarted.compared_products(), before);
    }

    #[test]
    fn hydrate_tolerates_garbage_and_truncates() {
        let storage = MemoryLocalStorage::new();
        storage.set_item(COMPARE_STORAGE_KEY, "{not json").unwrap();
        assert!(hydrate(&storage).is_empty());

        let many: Vec<Value> = (0..6)
            .map(|i| json!({"id": format!("p{}", i), "asin": "A", "title": "T"}))
            .chain(std::iter::once(json!({"asin": "no id"})))
            .collect();
        storage
            .set_item(COMPARE_STORAGE_KEY, &Value::Array(many).to_string())
            .unwrap();
        let hydrated = hydrate(&storage);
        assert_eq!(hydrated.len(), MAX_COMPARED_PRODUCTS);
        assert_eq!(hydrated[0].id, "p0");
    }

    #[test]
    fn hydrate_drops_entries_that_cannot_be_decoded() {
        let storage = MemoryLocalStorage::new();
        let entries = json!([
            {"id": "p1", "asin": "A", "title": "Good"},
            {"id": "p2", "asin": "B", "title": "Bad price", "current_price": "19.99"},
            {"id": "p3", "asin": "C", "title": "Also good", "product_information": {"Weight": 2}}
        ]);
        storage
            .set_item(COMPARE_STORAGE_KEY, &entries.to_string())
            .unwrap();

        let hydrated = hydrate(&storage);
        let ids: Vec<&str> = hydrated.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p3"]);
    }

    #[tokio::test]
    async fn save_requires_products_and_name_without_touching_backend() {
        let h = Harness::new();
        let manager = h.manager();

        let empty_name = manager.save_comparison("").await.unwrap_err();
        let named = manager.save_comparison("x").await.unwrap_err();

        assert!(matches!(empty_name, ComparisonError::EmptyComparison));
        assert!(matches!(named, ComparisonError::EmptyComparison));
        assert_eq!(h.db.call_count(), 0);

        manager
            .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000060"))
            .await
            .unwrap();
        let blank = manager.save_comparison("   ").await.unwrap_err();
        assert!(matches!(blank, ComparisonError::MissingName));
        assert_eq!(h.db.call_count(), 0);
    }

    #[tokio::test]
    async fn save_requires_a_user() {
        let h = Harness::new();
        h.auth.sign_out();
        let manager = h.manager();
        manager
            .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000070"))
            .await
            .unwrap();

        let err = manager.save_comparison("Phones").await.unwrap_err();

        assert!(matches!(err, ComparisonError::NotAuthenticated));
        assert_eq!(h.db.call_count(), 0);
        assert_eq!(
            h.notifier.last().map(|n| n.1),
            Some("You need to be logged in to save comparisons".to_string())
        );
    }

    #[tokio::test]
    async fn save_writes_record_and_refreshes_history() {
        let h = Harness::new();
        let manager = h.manager();
        manager
            .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000080"))
            .await
            .unwrap();

        let id = manager.save_comparison("  Headphones ").await.unwrap();

        let history = manager.comparison_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].name, "Headphones");
        assert_eq!(history[0].products, manager.compared_products());
    }

    #[tokio::test]
    async fn save_failure_leaves_history_untouched() {
        let h = Harness::new();
        let manager = h.manager();
        manager
            .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000090"))
            .await
            .unwrap();
        h.db.set_failing(true);

        let err = manager.save_comparison("Broken").await.unwrap_err();

        assert!(matches!(err, ComparisonError::SaveFailed(_)));
        assert!(manager.comparison_history().is_empty());
        assert_eq!(manager.compared_products().len(), 1);
        assert_eq!(
            h.notifier.last(),
            Some((NoticeLevel::Error, "Failed to save comparison".to_string()))
        );
    }

    #[tokio::test]
    async fn history_is_newest_first_and_accepts_text_payloads() {
        let h = Harness::new();
        let now = Utc::now();
        let older = ComparisonHistoryRow {
            id: Uuid::new_v4(),
            user_id: user().user_id,
            name: "Older".to_string(),
            created_at: now - Duration::days(2),
            products: Some(json!([{"id": "a", "asin": "A1", "title": "Alpha"}])),
        };
        let newer = ComparisonHistoryRow {
            id: Uuid::new_v4(),
            user_id: user().user_id,
            name: "Newer".to_string(),
            created_at: now,
            products: Some(json!(r#"[{"id":"b","asin":"B1","title":"Beta"}]"#)),
        };
        let foreign = ComparisonHistoryRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Someone else".to_string(),
            created_at: now,
            products: None,
        };
        h.db.add_comparison_row(older);
        h.db.add_comparison_row(newer);
        h.db.add_comparison_row(foreign);
        let manager = h.manager();

        manager.load_comparison_history().await.unwrap();

        let history = manager.comparison_history();
        let names: Vec<&str> = history.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Newer", "Older"]);
        assert_eq!(history[0].products[0].title, "Beta");
    }

    #[tokio::test]
    async fn load_by_id_drops_invalid_entries_and_enriches_the_rest() {
        let h = Harness::new();
        let good = Uuid::new_v4();
        let complete = Uuid::new_v4();
        h.db.add_product(catalog_row(good, "B000000100"));
        let row_id = Uuid::new_v4();
        h.db.add_comparison_row(ComparisonHistoryRow {
            id: row_id,
            user_id: user().user_id,
            name: "Mixed".to_string(),
            created_at: Utc::now(),
            products: Some(json!([
                {"id": good.to_string(), "asin": "B000000100", "title": "Good"},
                {"id": "no-title", "asin": "B000000101"},
                {
                    "id": complete.to_string(),
                    "asin": "B000000102",
                    "title": "Complete",
                    "about_product": "[\"Solid\"]",
                    "product_information": {},
                    "product_details": {}
                },
                42
            ])),
        });
        let manager = h.manager();

        manager.load_comparison_by_id(&row_id.to_string()).await.unwrap();

        let products = manager.compared_products();
        let titles: Vec<&str> = products.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Good", "Complete"]);
        assert_eq!(
            products[0].about_product,
            Some(vec!["Fast charging".to_string(), "USB-C".to_string()])
        );
        assert_eq!(products[1].about_product, Some(vec!["Solid".to_string()]));
        let stored = h.storage.get_raw(COMPARE_STORAGE_KEY).unwrap();
        assert!(stored.contains("Complete"));
    }

    #[tokio::test]
    async fn load_by_id_reports_missing_and_invalid_ids() {
        let h = Harness::new();
        let manager = h.manager();
        manager
            .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000110"))
            .await
            .unwrap();

        let invalid = manager.load_comparison_by_id("").await.unwrap_err();
        assert!(matches!(invalid, ComparisonError::InvalidId(_)));

        let missing = manager
            .load_comparison_by_id(&Uuid::new_v4().to_string())
            .await
            .unwrap_err();
        assert!(matches!(missing, ComparisonError::NotFound(_)));
        assert_eq!(manager.compared_products().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_from_history() {
        let h = Harness::new();
        let row_id = Uuid::new_v4();
        h.db.add_comparison_row(ComparisonHistoryRow {
            id: row_id,
            user_id: user().user_id,
            name: "Doomed".to_string(),
            created_at: Utc::now(),
            products: Some(json!([])),
        });
        let manager = h.manager();
        manager.load_comparison_history().await.unwrap();
        assert_eq!(manager.comparison_history().len(), 1);

        manager.delete_comparison_history(&row_id.to_string()).await.unwrap();

        assert!(manager.comparison_history().is_empty());
        manager.load_comparison_history().await.unwrap();
        assert!(manager.comparison_history().is_empty());
    }

    fn foreign_row(name: &str) -> ComparisonHistoryRow {
        ComparisonHistoryRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
            products: Some(json!([{"id": "p1", "asin": "B000000900", "title": "Secret"}])),
        }
    }

    #[tokio::test]
    async fn load_and_delete_by_id_require_a_user() {
        let h = Harness::new();
        let row = foreign_row("Theirs");
        let row_id = row.id.to_string();
        h.db.add_comparison_row(row);
        h.auth.sign_out();
        let manager = h.manager();
        let calls = h.db.call_count();

        let load = manager.load_comparison_by_id(&row_id).await.unwrap_err();
        assert!(matches!(load, ComparisonError::NotAuthenticated));
        let delete = manager.delete_comparison_history(&row_id).await.unwrap_err();
        assert!(matches!(delete, ComparisonError::NotAuthenticated));

        assert_eq!(h.db.call_count(), calls);
        assert!(manager.compared_products().is_empty());
    }

    #[tokio::test]
    async fn other_users_comparisons_are_not_found() {
        let h = Harness::new();
        let row = foreign_row("Theirs");
        let row_id = row.id;
        h.db.add_comparison_row(row);
        let manager = h.manager();

        let load = manager
            .load_comparison_by_id(&row_id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(load, ComparisonError::NotFound(_)));
        assert!(manager.compared_products().is_empty());

        let delete = manager
            .delete_comparison_history(&row_id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(delete, ComparisonError::NotFound(_)));
        assert!(h.db.has_comparison(row_id));
    }

    #[tokio::test]
    async fn backend_failures_leave_working_set_and_history_unchanged() {
        let h = Harness::new();
        let row_id = Uuid::new_v4();
        h.db.add_comparison_row(ComparisonHistoryRow {
            id: row_id,
            user_id: user().user_id,
            name: "Kept".to_string(),
            created_at: Utc::now(),
            products: Some(json!([])),
        });
        let manager = h.manager();
        manager
            .add_to_compare(enriched_snapshot(Uuid::new_v4(), "B000000120"))
            .await
            .unwrap();
        manager.load_comparison_history().await.unwrap();
        let working_set = manager.compared_products();
        let stored = h.storage.get_raw(COMPARE_STORAGE_KEY);

        h.db.set_failing(true);
        let load = manager
            .load_comparison_by_id(&row_id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(load, ComparisonError::LoadFailed(_)));
        let delete = manager
            .delete_comparison_history(&row_id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(delete, ComparisonError::DeleteFailed(_)));

        assert_eq!(manager.compared_products(), working_set);
        assert_eq!(h.storage.get_raw(COMPARE_STORAGE_KEY), stored);
        assert_eq!(manager.comparison_history().len(), 1);
        assert_eq!(
            h.notifier.last(),
            Some((NoticeLevel::Error, "Failed to delete comparison".to_string()))
        );
    }

    #[tokio::test]
    async fn auth_events_drive_history() {
        let h = Harness::new();
        h.db.add_comparison_row(ComparisonHistoryRow {
            id: Uuid::new_v4(),
            user_id: user().user_id,
            name: "Saved".to_string(),
            created_at: Utc::now(),
            products: Some(json!([])),
        });
        let manager = Arc::new(h.manager());
        let (tx, rx) = broadcast::channel(8);
        let listener = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run_auth_listener(rx).await })
        };

        tx.send(AuthEvent::SignedIn(user())).unwrap();
        tx.send(AuthEvent::SignedOut).unwrap();
        tx.send(AuthEvent::SignedIn(user())).unwrap();
        drop(tx);
        listener.await.unwrap();

        assert_eq!(manager.comparison_history().len(), 1);

        manager.handle_auth_event(&AuthEvent::SignedOut).await.unwrap();
        assert!(manager.comparison_history().is_empty());
    }

    #[tokio::test]
    async fn initialize_loads_history_only_with_a_session() {
        let h = Harness::new();
        h.db.add_comparison_row(ComparisonHistoryRow {
            id: Uuid::new_v4(),
            user_id: user().user_id,
            name: "Saved".to_string(),
            created_at: Utc::now(),
            products: Some(json!([])),
        });

        h.auth.sign_out();
        let signed_out = h.manager();
        signed_out.initialize().await.unwrap();
        assert!(signed_out.comparison_history().is_empty());

        h.auth.sign_in(user());
        let signed_in = h.manager();
        signed_in.initialize().await.unwrap();
        assert_eq!(signed_in.comparison_history().len(), 1);
    }
}
