//! crates/smartcart_core/src/catalog.rs
//!
//! The product catalog: ASIN extraction, product search through the external
//! product-data API, and the save-product flow that upserts a product and the
//! caller's view and tracking rows.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{ProductDetails, ProductUpsert};
use crate::ports::{DatabaseService, PortError, PortResult, ProductDataService};

pub const DEFAULT_SEARCH_COUNTRY: &str = "US";

fn asin_in_url() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)/dp/([A-Z0-9]{10})|/(?:gp/product|product)/([A-Z0-9]{10})").ok()
    })
    .as_ref()
}

/// Extracts an upper-cased ASIN from a bare ASIN or an Amazon product URL.
pub fn extract_asin(input: &str) -> Option<String> {
    let input = input.trim();
    if input.len() == 10 && input.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(input.to_ascii_uppercase());
    }
    let caps = asin_in_url()?.captures(input)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Parses a display price such as `"$1,299.00"`, keeping only digits and dots.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok().filter(|p| *p != 0.0)
}

//=========================================================================================
// Save Product
//=========================================================================================

/// A product as submitted by the client. Every field is optional and loosely typed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductSubmission {
    #[serde(default)]
    pub asin: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub current_price: Option<Value>,
    #[serde(default)]
    pub original_price: Option<Value>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub customers_say: Option<String>,
    #[serde(default)]
    pub about_product: Option<Value>,
    #[serde(default)]
    pub product_information: Option<Value>,
    #[serde(default)]
    pub product_details: Option<Value>,
}

impl From<ProductDetails> for ProductSubmission {
    fn from(details: ProductDetails) -> Self {
        Self {
            asin: Some(details.asin),
            title: Some(details.title),
            description: Some(details.description),
            image_url: Some(details.image_url),
            current_price: details.current_price.map(Value::from),
            original_price: details.original_price.map(Value::from),
            url: Some(details.url),
            availability: Some(details.availability),
            customers_say: Some(details.customers_say),
            about_product: Some(Value::from(details.about_product)),
            product_information: Some(details.product_information),
            product_details: Some(details.product_details),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaveProductRequest {
    pub product: ProductSubmission,
    pub alert_price: Option<f64>,
    pub alert_enabled: Option<bool>,
    pub record_view: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Builds the stored column set from a submission. Fails without an ASIN.
pub fn sanitize(product: ProductSubmission) -> PortResult<ProductUpsert> {
    let asin = non_empty(product.asin)
        .ok_or_else(|| PortError::Validation("Invalid product data".to_string()))?;
    Ok(ProductUpsert {
        asin,
        title: non_empty(product.title).unwrap_or_else(|| "Unknown product".to_string()),
        description: non_empty(product.description),
        image_url: non_empty(product.image_url),
        current_price: product.current_price.as_ref().and_then(Value::as_f64),
        original_price: product.original_price.as_ref().and_then(Value::as_f64),
        url: non_empty(product.url),
        availability: non_empty(product.availability).unwrap_or_else(|| "Unknown".to_string()),
        customers_say: non_empty(product.customers_say),
        about_product: product.about_product.filter(Value::is_array),
        product_information: product.product_information.filter(is_structured),
        product_details: product.product_details.filter(is_structured),
    })
}

fn is_structured(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

pub struct CatalogService {
    db: Arc<dyn DatabaseService>,
    products: Arc<dyn ProductDataService>,
}

impl CatalogService {
    pub fn new(db: Arc<dyn DatabaseService>, products: Arc<dyn ProductDataService>) -> Self {
        Self { db, products }
    }

    /// Looks up a product by ASIN or product URL.
    pub async fn search_product(
        &self,
        asin_or_url: &str,
        country: Option<&str>,
    ) -> PortResult<ProductDetails> {
        let asin = extract_asin(asin_or_url)
            .ok_or_else(|| PortError::Validation("ASIN is required".to_string()))?;
        let country = country
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_SEARCH_COUNTRY);
        info!(%asin, %country, "Getting product details");
        self.products.fetch_product(&asin, country).await
    }

    /// Upserts the product and the user's view and alert rows, returning the product id.
    pub async fn save_product(&self, user_id: Uuid, request: SaveProductRequest) -> PortResult<Uuid> {
        let product = sanitize(request.product)?;
        info!(asin = %product.asin, "Saving product");

        let product_id = match self.db.find_product_by_asin(&product.asin).await? {
            Some(existing) => {
                self.db.update_product(existing.id, &product).await?;
                info!(product_id = %existing.id, "Updated existing product");
                existing.id
            }
            None => {
                let id = self.db.insert_product(&product).await?;
                info!(product_id = %id, "Inserted new product");
                id
            }
        };

        if let Some(price) = product.current_price {
            if let Err(e) = self.db.insert_price_point(product_id, price, Utc::now()).await {
                error!(error = %e, %product_id, "Error recording price history");
            }
        }

        if request.record_view {
            self.record_view(user_id, product_id).await;
        }

        match (request.alert_enabled, request.alert_price) {
            (Some(enabled), Some(price)) if price > 0.0 => {
                match self.db.get_user_product(user_id, product_id).await? {
                    Some(existing) => {
                        self.db
                            .update_user_product_alert(existing.id, price, enabled)
                            .await?
                    }
                    None => {
                        self.db
                            .insert_user_product(user_id, product_id, price, enabled)
                            .await?
                    }
                }
                info!(%product_id, price, enabled, "Saved alert settings");
            }
            _ => info!("No alert price set, not creating tracked product entry"),
        }

        Ok(product_id)
    }

    async fn record_view(&self, user_id: Uuid, product_id: Uuid) {
        let now = Utc::now();
        let result = match self.db.latest_view(user_id, product_id).await {
            Ok(Some(view_id)) => self.db.touch_view(view_id, now).await,
            Ok(None) => self.db.insert_view(user_id, product_id, now).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, %product_id, "Error recording recently viewed entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryDatabase, StubProductData};
    use serde_json::json;

    fn service(db: Arc<InMemoryDatabase>) -> CatalogService {
        CatalogService::new(db, Arc::new(StubProductData::default()))
    }

    fn submission(asin: &str) -> ProductSubmission {
        serde_json::from_value(json!({
            "asin": asin,
            "title": "Noise Cancelling Headphones",
            "current_price": 199.99,
            "about_product": ["ANC", "30h battery"],
            "product_information": "not an object",
            "product_details": {"Color": "Black"}
        }))
        .unwrap()
    }

    #[test]
    fn extracts_asins_from_urls_and_bare_codes() {
        assert_eq!(extract_asin("b08n5wrwnw").as_deref(), Some("B08N5WRWNW"));
        assert_eq!(
            extract_asin("https://www.amazon.com/Echo-Dot/dp/B08N5WRWNW/ref=sr_1_1").as_deref(),
            Some("B08N5WRWNW")
        );
        assert_eq!(
            extract_asin("https://amazon.in/gp/product/b07xjwd3m3?th=1").as_deref(),
            Some("B07XJWD3M3")
        );
        assert_eq!(
            extract_asin("https://amazon.com/product/B0C1234567").as_deref(),
            Some("B0C1234567")
        );
        assert_eq!(extract_asin("https://example.com/item/42"), None);
        assert_eq!(extract_asin("short"), None);
    }

    #[test]
    fn parses_display_prices() {
        assert_eq!(parse_price("$1,299.00"), Some(1299.0));
        assert_eq!(parse_price("₹ 45,999"), Some(45999.0));
        assert_eq!(parse_price("Currently unavailable"), None);
    }

    #[test]
    fn sanitize_applies_defaults_and_drops_malformed_json() {
        let product = sanitize(ProductSubmission {
            asin: Some("B000000001".to_string()),
            title: Some(String::new()),
            current_price: Some(json!("19.99")),
            about_product: Some(json!("not a list")),
            product_information: Some(json!({"Brand": "Acme"})),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(product.title, "Unknown product");
        assert_eq!(product.availability, "Unknown");
        assert_eq!(product.current_price, None);
        assert_eq!(product.about_product, None);
        assert_eq!(product.product_information, Some(json!({"Brand": "Acme"})));
    }

    #[tokio::test]
    async fn save_requires_an_asin() {
        let db = Arc::new(InMemoryDatabase::new());
        let err = service(db.clone())
            .save_product(Uuid::new_v4(), SaveProductRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(db.call_count(), 0);
    }

    #[tokio::test]
    async fn save_inserts_then_updates_by_asin() {
        let db = Arc::new(InMemoryDatabase::new());
        let catalog = service(db.clone());
        let user = Uuid::new_v4();

        let first = catalog
            .save_product(
                user,
                SaveProductRequest {
                    product: submission("B000000001"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let mut changed = submission("B000000001");
        changed.title = Some("Headphones v2".to_string());
        let second = catalog
            .save_product(
                user,
                SaveProductRequest {
                    product: changed,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        let products = db.products();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].title, "Headphones v2");
        assert_eq!(products[0].product_information, None);
        assert_eq!(products[0].product_details, Some(json!({"Color": "Black"})));
        assert_eq!(db.price_points(first).len(), 2);
    }

    #[tokio::test]
    async fn save_records_views_once_per_product() {
        let db = Arc::new(InMemoryDatabase::new());
        let catalog = service(db.clone());
        let user = Uuid::new_v4();
        for _ in 0..2 {
            catalog
                .save_product(
                    user,
                    SaveProductRequest {
                        product: submission("B000000002"),
                        record_view: true,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(db.view_count(user), 1);
    }

    #[tokio::test]
    async fn save_upserts_alert_only_for_positive_price() {
        let db = Arc::new(InMemoryDatabase::new());
        let catalog = service(db.clone());
        let user = Uuid::new_v4();

        catalog
            .save_product(
                user,
                SaveProductRequest {
                    product: submission("B000000003"),
                    alert_price: Some(0.0),
                    alert_enabled: Some(true),
                    record_view: false,
                },
            )
            .await
            .unwrap();
        assert!(db.user_products().is_empty());

        for price in [150.0, 120.0] {
            catalog
                .save_product(
                    user,
                    SaveProductRequest {
                        product: submission("B000000003"),
                        alert_price: Some(price),
                        alert_enabled: Some(true),
                        record_view: false,
                    },
                )
                .await
                .unwrap();
        }
        let rows = db.user_products();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alert_price, Some(120.0));
    }

    #[tokio::test]
    async fn price_history_failure_does_not_fail_save() {
        let db = Arc::new(InMemoryDatabase::new());
        db.set_failing_price_inserts(true);
        let saved = service(db.clone())
            .save_product(
                Uuid::new_v4(),
                SaveProductRequest {
                    product: submission("B000000004"),
                    ..Default::default()
                },
            )
            .await;
        assert!(saved.is_ok());
    }

    #[tokio::test]
    async fn search_extracts_asin_and_defaults_country() {
        let products = StubProductData {
            product: Some(ProductDetails {
                asin: "B08N5WRWNW".to_string(),
                title: "Echo Dot".to_string(),
                ..Default::default()
            }),
            reviews: Vec::new(),
        };
        let catalog = CatalogService::new(Arc::new(InMemoryDatabase::new()), Arc::new(products));

        let found = catalog
            .search_product("https://www.amazon.com/dp/B08N5WRWNW", None)
            .await
            .unwrap();
        assert_eq!(found.title, "Echo Dot");

        let err = catalog.search_product("not a product", None).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }
}
