pub mod alerts;
pub mod assistant;
pub mod catalog;
pub mod comparison;
pub mod domain;
pub mod json_field;
pub mod ports;
pub mod price_history;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use alerts::{DailyPriceTracker, PriceAlertSweeper, SweepReport, TrackingReport};
pub use assistant::{AssistantModels, AssistantService, SentimentReport};
pub use catalog::{CatalogService, ProductSubmission, SaveProductRequest};
pub use comparison::{ComparisonError, ComparisonManager};
pub use domain::{AuthEvent, CatalogProduct, ComparedProduct, ComparisonHistory, ProductDetails, User};
pub use json_field::{parse_json_field, RawJson};
pub use ports::{
    AuthProvider, CompletionRequest, CompletionService, DatabaseService, LocalStorage,
    NoticeLevel, Notifier, PortError, PortResult, ProductDataService,
};
pub use price_history::{PriceHistoryReport, PriceHistoryService};
