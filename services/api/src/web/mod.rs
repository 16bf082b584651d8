pub mod functions;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;


use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ConfigError;
use functions::{
    cached_insight_handler, chatbot_handler, check_price_alerts_handler,
    daily_price_tracking_handler, price_history_handler, product_search_handler,
    quick_insight_handler, save_product_handler, sentiment_handler,
};
use rest::{chart_handler, notifications_handler, recently_viewed_handler, watchlist_handler, ApiDoc};

pub use middleware::require_auth;
pub use state::AppState;

/// CORS policy for the single configured web client origin.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string()))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]))
}

/// Builds the complete application router, including the Swagger UI.
pub fn build_router(app_state: Arc<AppState>, cors: CorsLayer) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/functions/amazon-product-search", post(product_search_handler))
        .route("/functions/keepa-price-history", post(price_history_handler))
        .route("/functions/product-chatbot", post(chatbot_handler))
        .route("/functions/gemini-insights", post(quick_insight_handler))
        .route("/functions/update-product-insights", post(cached_insight_handler))
        .route("/functions/product-sentiment-analysis", post(sentiment_handler))
        .route("/functions/check-price-alerts", post(check_price_alerts_handler))
        .route("/functions/daily-price-tracking", post(daily_price_tracking_handler))
        .route("/products/{asin}/chart", get(chart_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/functions/save-product", post(save_product_handler))
        .route("/watchlist", get(watchlist_handler))
        .route("/notifications", get(notifications_handler))
        .route("/recently-viewed", get(recently_viewed_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
