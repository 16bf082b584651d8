//! services/api/src/web/protocol.rs
//!
//! Request and response bodies of the HTTP API.
//!
//! Field names are camelCase on the wire. Product payloads keep the loosely
//! typed shape the web client sends and are documented as plain objects.

use serde::{Deserialize, Serialize};
use smartcart_core::alerts::TrackingResult;
use smartcart_core::assistant::{SentimentCounts, SentimentReport};
use smartcart_core::catalog::{ProductSubmission, SaveProductRequest};
use smartcart_core::domain::{Notification, ProductDetails, RecentlyViewedEntry, WatchlistEntry};
use smartcart_core::price_history::{ChartPoint, PriceHistoryReport};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Product Search and Save
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// A bare ASIN or a product URL.
    #[serde(default)]
    pub asin: String,
    /// Marketplace country code, "US" when omitted.
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    #[schema(value_type = Object)]
    pub product: ProductDetails,
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveProductBody {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub product_data: ProductSubmission,
    #[serde(default)]
    pub alert_price: Option<f64>,
    #[serde(default)]
    pub alert_enabled: Option<bool>,
    #[serde(default)]
    pub record_view: bool,
}

impl From<SaveProductBody> for SaveProductRequest {
    fn from(body: SaveProductBody) -> Self {
        Self {
            product: body.product_data,
            alert_price: body.alert_price,
            alert_enabled: body.alert_enabled,
            record_view: body.record_view,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveProductResponse {
    pub success: bool,
    pub product_id: Uuid,
}

//=========================================================================================
// Price History
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryRequest {
    #[serde(default)]
    pub asin: String,
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PricePointDto {
    /// `M/D/YYYY`
    pub date: String,
    pub price: f64,
}

impl From<ChartPoint> for PricePointDto {
    fn from(point: ChartPoint) -> Self {
        Self {
            date: point.date,
            price: point.price,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryResponse {
    pub price_history: Vec<PricePointDto>,
    pub lowest_price: Option<f64>,
    pub lowest_date: Option<String>,
}

impl From<PriceHistoryReport> for PriceHistoryResponse {
    fn from(report: PriceHistoryReport) -> Self {
        Self {
            price_history: report.price_history.into_iter().map(Into::into).collect(),
            lowest_price: report.lowest_price,
            lowest_date: report.lowest_date,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    pub chart_url: String,
    pub product_url: String,
}

//=========================================================================================
// Assistant
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuickInsightRequest {
    #[serde(default)]
    pub product_title: String,
    #[serde(default)]
    pub product_description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CachedInsightRequest {
    #[serde(default)]
    pub product_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InsightResponse {
    pub insight: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SentimentRequest {
    #[serde(default)]
    pub asin: String,
    /// Marketplace country code, "IN" when omitted.
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SentimentCountsDto {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
    pub total: u32,
}

impl From<SentimentCounts> for SentimentCountsDto {
    fn from(counts: SentimentCounts) -> Self {
        Self {
            positive: counts.positive,
            negative: counts.negative,
            neutral: counts.neutral,
            total: counts.total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentimentResponse {
    pub sentiment: SentimentCountsDto,
    pub top_positive: Vec<String>,
    pub top_negative: Vec<String>,
    pub summary: String,
}

impl From<SentimentReport> for SentimentResponse {
    fn from(report: SentimentReport) -> Self {
        Self {
            sentiment: report.sentiment.into(),
            top_positive: report.top_positive,
            top_negative: report.top_negative,
            summary: report.summary,
        }
    }
}

//=========================================================================================
// Jobs
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub results: Option<Vec<TrackingResult>>,
}

//=========================================================================================
// User Listings
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct WatchlistResponse {
    #[schema(value_type = Vec<Object>)]
    pub watchlist: Vec<WatchlistEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationsResponse {
    #[schema(value_type = Vec<Object>)]
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentlyViewedResponse {
    #[schema(value_type = Vec<Object>)]
    pub recently_viewed: Vec<RecentlyViewedEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
