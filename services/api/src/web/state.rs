//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use smartcart_core::alerts::{DailyPriceTracker, PriceAlertSweeper};
use smartcart_core::assistant::{AssistantModels, AssistantService};
use smartcart_core::catalog::CatalogService;
use smartcart_core::ports::{DatabaseService, ProductDataService};
use smartcart_core::price_history::PriceHistoryService;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub catalog: CatalogService,
    pub price_history: PriceHistoryService,
    pub assistant: AssistantService,
    pub sweeper: PriceAlertSweeper,
    pub tracker: Arc<DailyPriceTracker>,
}

impl AppState {
    /// Wires the core services over the given adapters.
    pub fn new(
        db: Arc<dyn DatabaseService>,
        products: Arc<dyn ProductDataService>,
        models: AssistantModels,
    ) -> Self {
        Self {
            catalog: CatalogService::new(db.clone(), products.clone()),
            price_history: PriceHistoryService::new(db.clone()),
            assistant: AssistantService::new(db.clone(), products, models),
            sweeper: PriceAlertSweeper::new(db.clone()),
            tracker: Arc::new(DailyPriceTracker::new(db.clone())),
            db,
        }
    }
}
