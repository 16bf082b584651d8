//! services/api/src/adapters/product_data.rs
//!
//! The adapter for the RapidAPI "real-time Amazon data" service. It implements
//! the `ProductDataService` port from the `core` crate.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use smartcart_core::catalog::parse_price;
use smartcart_core::domain::ProductDetails;
use smartcart_core::ports::{PortError, PortResult, ProductDataService};
use tracing::{debug, error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An adapter that implements `ProductDataService` over HTTP.
#[derive(Clone)]
pub struct RapidApiProductAdapter {
    http_client: Client,
    host: String,
    api_key: Option<String>,
}

impl RapidApiProductAdapter {
    pub fn new(host: &str, api_key: Option<String>) -> PortResult<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            http_client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Performs a GET against an endpoint and returns the payload's `data` object.
    async fn get_data(&self, endpoint: &str, asin: &str, country: &str) -> PortResult<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PortError::Unexpected("AMAZON_API_KEY is not configured".to_string()))?;
        let url = format!("https://{}/{}", self.host, endpoint);
        debug!(%url, %asin, %country, "Requesting product data");

        let response = self
            .http_client
            .get(&url)
            .query(&[("asin", asin), ("country", country)])
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", &self.host)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PortError::Unexpected("Search request timed out".to_string())
                } else {
                    PortError::Unexpected(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(PortError::Unexpected(
                "Empty response received from Amazon API".to_string(),
            ));
        }
        let payload: Value = serde_json::from_str(&text).map_err(|_| {
            error!(sample = %text.chars().take(200).collect::<String>(), "Invalid JSON from product API");
            PortError::Unexpected("Invalid JSON response from Amazon API".to_string())
        })?;
        extract_data(status, payload)
    }
}

fn extract_data(status: reqwest::StatusCode, mut payload: Value) -> PortResult<Value> {
    if !status.is_success() {
        return Err(PortError::Unexpected(format!(
            "Amazon API HTTP error: {}",
            status.canonical_reason().unwrap_or("unknown status")
        )));
    }
    if payload.get("status").and_then(Value::as_str) != Some("OK") {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(PortError::Unexpected(format!("Amazon API error: {}", message)));
    }
    match payload.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(PortError::Unexpected(
            "API response missing data object".to_string(),
        )),
    }
}

fn text_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn price_field(data: &Value, key: &str) -> Option<f64> {
    match data.get(key)? {
        Value::String(s) => parse_price(s),
        Value::Number(n) => n.as_f64().filter(|p| *p != 0.0),
        _ => None,
    }
}

/// Maps a product-details payload onto `ProductDetails`.
pub fn product_from_payload(asin: &str, data: &Value) -> ProductDetails {
    let structured = |key: &str| {
        data.get(key)
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    };
    ProductDetails {
        asin: text_field(data, "asin").unwrap_or_else(|| asin.to_string()),
        title: text_field(data, "product_title").unwrap_or_default(),
        description: text_field(data, "product_description").unwrap_or_default(),
        image_url: text_field(data, "product_photo").unwrap_or_default(),
        current_price: price_field(data, "product_price"),
        original_price: price_field(data, "product_original_price"),
        url: text_field(data, "product_url").unwrap_or_default(),
        rating: data.get("product_star_rating").and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        num_ratings: data
            .get("product_num_ratings")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        images: data
            .get("product_photos")
            .and_then(Value::as_array)
            .map(|photos| {
                photos
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        availability: text_field(data, "product_availability")
            .unwrap_or_else(|| "In Stock".to_string()),
        customers_say: text_field(data, "customers_say").unwrap_or_default(),
        about_product: data
            .get("about_product")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        product_information: structured("product_information"),
        product_details: structured("product_details"),
    }
}

/// Extracts the review texts from a product-reviews payload.
pub fn reviews_from_payload(data: &Value) -> Vec<String> {
    data.get("reviews")
        .and_then(Value::as_array)
        .map(|reviews| {
            reviews
                .iter()
                .filter_map(|r| {
                    r.get("review")
                        .or_else(|| r.get("review_comment"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ProductDataService for RapidApiProductAdapter {
    async fn fetch_product(&self, asin: &str, country: &str) -> PortResult<ProductDetails> {
        info!(%asin, %country, "Getting product details");
        let data = self.get_data("product-details", asin, country).await?;
        Ok(product_from_payload(asin, &data))
    }

    async fn fetch_reviews(&self, asin: &str, country: &str) -> PortResult<Vec<String>> {
        info!(%asin, %country, "Fetching reviews");
        let data = self.get_data("product-reviews", asin, country).await?;
        Ok(reviews_from_payload(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn maps_product_payload() {
        let data = json!({
            "asin": "B08N5WRWNW",
            "product_title": "Echo Dot",
            "product_price": "$1,049.99",
            "product_original_price": null,
            "product_star_rating": "4.7",
            "product_num_ratings": 1200,
            "product_photos": ["a.jpg", "b.jpg"],
            "about_product": ["Smart speaker", 3],
            "product_information": {"Brand": "Amazon"},
            "product_details": "n/a"
        });

        let product = product_from_payload("B08N5WRWNW", &data);

        assert_eq!(product.title, "Echo Dot");
        assert_eq!(product.current_price, Some(1049.99));
        assert_eq!(product.original_price, None);
        assert_eq!(product.rating.as_deref(), Some("4.7"));
        assert_eq!(product.num_ratings, 1200);
        assert_eq!(product.images.len(), 2);
        assert_eq!(product.about_product, vec!["Smart speaker".to_string()]);
        assert_eq!(product.availability, "In Stock");
        assert_eq!(product.product_details, json!({}));
    }

    #[test]
    fn rejects_error_payloads() {
        let err = extract_data(
            StatusCode::OK,
            json!({"status": "ERROR", "message": "quota exceeded"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));

        assert!(extract_data(StatusCode::OK, json!({"status": "OK"})).is_err());
        assert!(extract_data(StatusCode::TOO_MANY_REQUESTS, json!({"status": "OK", "data": {}})).is_err());
        assert_eq!(
            extract_data(StatusCode::OK, json!({"status": "OK", "data": {"x": 1}})).unwrap(),
            json!({"x": 1})
        );
    }

    #[test]
    fn collects_review_texts() {
        let data = json!({"reviews": [{"review": "Great"}, {"review_comment": "Meh"}, {"rating": 1}]});
        assert_eq!(reviews_from_payload(&data), vec!["Great", "Meh"]);
    }
}
