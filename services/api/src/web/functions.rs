//! services/api/src/web/functions.rs
//!
//! The `POST /functions/*` endpoints: product search and save, price history,
//! the shopping assistant, and the two price jobs.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    Extension,
};
use smartcart_core::domain::User;
use smartcart_core::ports::PortError;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::ApiError;
use crate::web::protocol::{
    CachedInsightRequest, ChatRequest, ChatResponse, ErrorResponse, InsightResponse, JobResponse,
    PriceHistoryRequest, PriceHistoryResponse, QuickInsightRequest, SaveProductBody,
    SaveProductResponse, SearchRequest, SearchResponse, SentimentRequest, SentimentResponse,
};
use crate::web::state::AppState;

/// Unwraps a JSON body, turning a malformed payload into a 400.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Port(PortError::Validation(rejection.body_text())))
}

//=========================================================================================
// Catalog
//=========================================================================================

/// Look up live product details by ASIN or product URL.
#[utoipa::path(
    post,
    path = "/functions/amazon-product-search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Product details", body = SearchResponse),
        (status = 400, description = "No ASIN could be extracted", body = ErrorResponse),
        (status = 502, description = "The product data API failed", body = ErrorResponse)
    )
)]
pub async fn product_search_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let req = body(payload)?;
    let product = app_state
        .catalog
        .search_product(&req.asin, req.country.as_deref())
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(SearchResponse {
        product,
        status: "OK".to_string(),
    }))
}

/// Save a product to the catalog for the signed-in user.
///
/// Optionally records a recently-viewed entry and a price alert.
#[utoipa::path(
    post,
    path = "/functions/save-product",
    request_body = SaveProductBody,
    responses(
        (status = 200, description = "Product saved", body = SaveProductResponse),
        (status = 400, description = "Missing ASIN", body = ErrorResponse),
        (status = 401, description = "No valid session", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn save_product_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    payload: Result<Json<SaveProductBody>, JsonRejection>,
) -> Result<Json<SaveProductResponse>, ApiError> {
    let req = body(payload)?;
    let product_id = app_state
        .catalog
        .save_product(user.user_id, req.into())
        .await?;
    Ok(Json(SaveProductResponse {
        success: true,
        product_id,
    }))
}

/// Price history of a product, synthesized when fewer than two points are stored.
#[utoipa::path(
    post,
    path = "/functions/keepa-price-history",
    request_body = PriceHistoryRequest,
    responses(
        (status = 200, description = "Chart points and the lowest price", body = PriceHistoryResponse),
        (status = 400, description = "Missing ASIN or product id", body = ErrorResponse)
    )
)]
pub async fn price_history_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<PriceHistoryRequest>, JsonRejection>,
) -> Result<Json<PriceHistoryResponse>, ApiError> {
    let req = body(payload)?;
    let product_id = req.product_id.ok_or_else(|| {
        ApiError::Port(PortError::Validation(
            "ASIN and productId are required".to_string(),
        ))
    })?;
    let report = app_state
        .price_history
        .price_history(&req.asin, product_id)
        .await?;
    Ok(Json(report.into()))
}

//=========================================================================================
// Assistant
//=========================================================================================

/// Answer a shopper's question about a stored product.
#[utoipa::path(
    post,
    path = "/functions/product-chatbot",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The assistant's answer", body = ChatResponse),
        (status = 400, description = "Missing product id or message", body = ErrorResponse),
        (status = 404, description = "Unknown product", body = ErrorResponse),
        (status = 502, description = "The model provider failed", body = ErrorResponse)
    )
)]
pub async fn chatbot_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let req = body(payload)?;
    let response = app_state
        .assistant
        .chat(&req.product_id, &req.message)
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(ChatResponse { response }))
}

/// Generate a one-off shopping insight from a title, description and price.
#[utoipa::path(
    post,
    path = "/functions/gemini-insights",
    request_body = QuickInsightRequest,
    responses(
        (status = 200, description = "Generated insight", body = InsightResponse),
        (status = 400, description = "Missing product title", body = ErrorResponse),
        (status = 502, description = "The model provider failed", body = ErrorResponse)
    )
)]
pub async fn quick_insight_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<QuickInsightRequest>, JsonRejection>,
) -> Result<Json<InsightResponse>, ApiError> {
    let req = body(payload)?;
    let insight = app_state
        .assistant
        .quick_insight(
            &req.product_title,
            req.product_description.as_deref(),
            req.price,
        )
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(InsightResponse { insight }))
}

/// Return the cached insight of a stored product, regenerating it when stale.
#[utoipa::path(
    post,
    path = "/functions/update-product-insights",
    request_body = CachedInsightRequest,
    responses(
        (status = 200, description = "Cached or regenerated insight", body = InsightResponse),
        (status = 400, description = "Missing product id", body = ErrorResponse),
        (status = 404, description = "Unknown product", body = ErrorResponse),
        (status = 502, description = "The model provider failed", body = ErrorResponse)
    )
)]
pub async fn cached_insight_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<CachedInsightRequest>, JsonRejection>,
) -> Result<Json<InsightResponse>, ApiError> {
    let req = body(payload)?;
    let insight = app_state
        .assistant
        .cached_insight(&req.product_id)
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(InsightResponse { insight }))
}

/// Summarize the sentiment of a product's customer reviews.
#[utoipa::path(
    post,
    path = "/functions/product-sentiment-analysis",
    request_body = SentimentRequest,
    responses(
        (status = 200, description = "Sentiment counts and highlights", body = SentimentResponse),
        (status = 400, description = "Missing ASIN", body = ErrorResponse),
        (status = 502, description = "An upstream API failed", body = ErrorResponse)
    )
)]
pub async fn sentiment_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<SentimentRequest>, JsonRejection>,
) -> Result<Json<SentimentResponse>, ApiError> {
    let req = body(payload)?;
    let report = app_state
        .assistant
        .sentiment(&req.asin, req.country.as_deref())
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(report.into()))
}

//=========================================================================================
// Jobs
//=========================================================================================

/// Run the price alert sweep once.
#[utoipa::path(
    post,
    path = "/functions/check-price-alerts",
    responses(
        (status = 200, description = "Sweep summary", body = JobResponse),
        (status = 500, description = "The sweep could not run", body = ErrorResponse)
    )
)]
pub async fn check_price_alerts_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<JobResponse>, ApiError> {
    let report = app_state.sweeper.run().await.map_err(|e| {
        error!("Error in check price alerts function: {}", e);
        e
    })?;
    info!("{}", report.summary());
    Ok(Json(JobResponse {
        success: true,
        message: report.summary(),
        results: None,
    }))
}

/// Record today's price of every tracked product, then sweep alerts.
#[utoipa::path(
    post,
    path = "/functions/daily-price-tracking",
    responses(
        (status = 200, description = "Per-product tracking results", body = JobResponse),
        (status = 500, description = "Tracking could not run", body = ErrorResponse)
    )
)]
pub async fn daily_price_tracking_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<JobResponse>, ApiError> {
    let report = app_state.tracker.run().await.map_err(|e| {
        error!("Error in daily price tracking function: {}", e);
        e
    })?;
    Ok(Json(JobResponse {
        success: true,
        message: report.summary(),
        results: Some(report.results),
    }))
}
