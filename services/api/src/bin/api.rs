//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiCompletionAdapter, RapidApiProductAdapter},
    config::Config,
    error::ApiError,
    scheduler::start_price_tracking_scheduler,
    web::{build_router, cors_layer, AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use smartcart_core::assistant::AssistantModels;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let llm_config = OpenAIConfig::new()
        .with_api_base(config.llm_api_base.clone())
        .with_api_key(
            config
                .llm_api_key
                .as_ref()
                .ok_or_else(|| ApiError::Internal("LLM_API_KEY is required".to_string()))?,
        );
    let llm_client = Client::with_config(llm_config);

    let models = AssistantModels {
        chat: Arc::new(OpenAiCompletionAdapter::new(
            llm_client.clone(),
            config.chat_model.clone(),
        )),
        insight: Arc::new(OpenAiCompletionAdapter::new(
            llm_client.clone(),
            config.insight_model.clone(),
        )),
        sentiment: Arc::new(OpenAiCompletionAdapter::new(
            llm_client,
            config.sentiment_model.clone(),
        )),
    };

    if config.amazon_api_key.is_none() {
        warn!("AMAZON_API_KEY is not set; product search and reviews will fail");
    }
    let product_adapter = Arc::new(RapidApiProductAdapter::new(
        &config.amazon_api_host,
        config.amazon_api_key.clone(),
    )?);

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(db_adapter, product_adapter, models));

    // --- 5. Start the Background Price Tracker ---
    let shutdown = CancellationToken::new();
    let scheduler = config.price_tracking_interval_hours.map(|hours| {
        start_price_tracking_scheduler(app_state.tracker.clone(), hours, shutdown.clone())
    });
    if scheduler.is_none() {
        info!("Price tracking scheduler disabled");
    }

    // --- 6. Create the Web Router ---
    let app = build_router(app_state, cors_layer(&config.cors_origin)?);

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            stop.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            warn!("Price tracking scheduler ended abnormally: {}", e);
        }
    }

    Ok(())
}
