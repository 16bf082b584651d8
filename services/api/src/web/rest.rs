//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the read-only REST endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::functions;
use crate::web::protocol::{
    CachedInsightRequest, ChartResponse, ChatRequest, ChatResponse, ErrorResponse,
    InsightResponse, JobResponse, NotificationsResponse, PriceHistoryRequest,
    PriceHistoryResponse, PricePointDto, QuickInsightRequest, RecentlyViewedResponse,
    SaveProductBody, SaveProductResponse, SearchRequest, SearchResponse, SentimentCountsDto,
    SentimentRequest, SentimentResponse, WatchlistResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use smartcart_core::catalog::extract_asin;
use smartcart_core::domain::User;
use smartcart_core::ports::PortError;
use smartcart_core::price_history::{camel_chart_url, camel_product_url};
use std::sync::Arc;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi};

const DEFAULT_RECENTLY_VIEWED_LIMIT: i64 = 10;
const MAX_RECENTLY_VIEWED_LIMIT: i64 = 100;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        functions::product_search_handler,
        functions::save_product_handler,
        functions::price_history_handler,
        functions::chatbot_handler,
        functions::quick_insight_handler,
        functions::cached_insight_handler,
        functions::sentiment_handler,
        functions::check_price_alerts_handler,
        functions::daily_price_tracking_handler,
        chart_handler,
        watchlist_handler,
        notifications_handler,
        recently_viewed_handler,
    ),
    components(
        schemas(
            SearchRequest, SearchResponse, SaveProductBody, SaveProductResponse,
            PriceHistoryRequest, PriceHistoryResponse, PricePointDto, ChartResponse,
            ChatRequest, ChatResponse, QuickInsightRequest, CachedInsightRequest,
            InsightResponse, SentimentRequest, SentimentResponse, SentimentCountsDto,
            JobResponse, WatchlistResponse, NotificationsResponse, RecentlyViewedResponse,
            ErrorResponse
        )
    ),
    modifiers(&SessionSecurity),
    tags(
        (name = "SmartCart API", description = "Product tracking, price history and shopping assistant endpoints.")
    )
)]
pub struct ApiDoc;

/// Registers the bearer/cookie session scheme referenced by protected paths.
struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Price chart image and product page links for an ASIN.
#[utoipa::path(
    get,
    path = "/products/{asin}/chart",
    responses(
        (status = 200, description = "Chart links", body = ChartResponse),
        (status = 400, description = "Invalid ASIN", body = ErrorResponse)
    ),
    params(
        ("asin" = String, Path, description = "The product's ASIN.")
    )
)]
pub async fn chart_handler(Path(asin): Path<String>) -> Result<Json<ChartResponse>, ApiError> {
    let asin = extract_asin(&asin)
        .ok_or_else(|| ApiError::Port(PortError::Validation("Invalid ASIN".to_string())))?;
    Ok(Json(ChartResponse {
        chart_url: camel_chart_url(&asin, Utc::now().timestamp_millis()),
        product_url: camel_product_url(&asin),
    }))
}

/// The signed-in user's tracked products and alert settings.
#[utoipa::path(
    get,
    path = "/watchlist",
    responses(
        (status = 200, description = "Tracked products", body = WatchlistResponse),
        (status = 401, description = "No valid session", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn watchlist_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<WatchlistResponse>, ApiError> {
    let watchlist = app_state.db.list_watchlist(user.user_id).await?;
    Ok(Json(WatchlistResponse { watchlist }))
}

/// The signed-in user's notifications, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "Notifications", body = NotificationsResponse),
        (status = 401, description = "No valid session", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn notifications_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let notifications = app_state.db.list_notifications(user.user_id).await?;
    Ok(Json(NotificationsResponse { notifications }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentlyViewedQuery {
    /// Maximum number of entries, 10 by default.
    pub limit: Option<i64>,
}

/// The signed-in user's recently viewed products, newest first.
#[utoipa::path(
    get,
    path = "/recently-viewed",
    params(RecentlyViewedQuery),
    responses(
        (status = 200, description = "Recently viewed products", body = RecentlyViewedResponse),
        (status = 401, description = "No valid session", body = ErrorResponse)
    ),
    security(("session" = []))
)]
pub async fn recently_viewed_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<RecentlyViewedQuery>,
) -> Result<Json<RecentlyViewedResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENTLY_VIEWED_LIMIT)
        .clamp(1, MAX_RECENTLY_VIEWED_LIMIT);
    let recently_viewed = app_state
        .db
        .list_recently_viewed(user.user_id, limit)
        .await?;
    Ok(Json(RecentlyViewedResponse { recently_viewed }))
}
