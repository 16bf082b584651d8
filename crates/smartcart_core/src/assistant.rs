//! crates/smartcart_core/src/assistant.rs
//!
//! The AI features of a product page: the product chatbot, shopper insights
//! (fresh or cached for a day), and review sentiment analysis.

use std::sync::{Arc, OnceLock};

use chrono::{Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::CatalogProduct;
use crate::ports::{
    CompletionRequest, CompletionService, DatabaseService, PortError, PortResult,
    ProductDataService,
};

pub const CHAT_FALLBACK: &str = "I'm sorry, I couldn't process your request at this time.";
pub const INSIGHT_FALLBACK: &str = "Unable to generate insights at this time.";
pub const DEFAULT_REVIEW_COUNTRY: &str = "IN";

/// Reviews beyond this many characters are not sent to the model.
const MAX_REVIEW_CHARS: usize = 10_000;

const INSIGHT_TTL_HOURS: i64 = 24;

const SYSTEM_PROMPT: &str = "You are SmartCart AI, an advanced product comparison and recommendation assistant.
Your role is to help users make informed, confident purchasing decisions by providing clear, honest, and data-driven insights on products across various online stores.
You have to be straightforward, and give a proper opinion when asked about recommendations, keep it brief, keep it to the point, show performance differences, suggest better ones.
Try to be as human as possible too.
You are a genius about tech, keep your answers short and straightforward.

Your Core Objectives:
1. Provide Transparent & Honest Advice: offer unbiased, fact-based recommendations without marketing bias.
2. Help Users Make Smart Purchases: guide users through price trends, alternatives, and value-for-money options.
3. Analyze & Predict Prices Accurately: track price history, detect patterns, and forecast potential price changes.
4. Evaluate Product Sentiment: summarize real customer reviews and identify key pros and cons.
5. Compare Features Objectively: deliver side-by-side comparisons based on specs, pricing, and user needs.

Communication Style:
- Clear & Direct: no fluff, just useful insights.
- Friendly & Conversational: sound human, not robotic.
- Actionable & Practical: give users specific, useful advice.
- No Unnecessary Jargon: keep explanations simple and easy to understand.
- Transparent About Limitations: if a prediction isn't certain, say so.

Your goal: Make shopping easier, smarter, and stress-free.";

//=========================================================================================
// Prompts
//=========================================================================================

fn fmt_amount(amount: f64) -> String {
    amount.to_string()
}

/// Renders the product facts the chatbot answers from.
pub fn product_context(product: &CatalogProduct, lowest_price: Option<f64>) -> String {
    let current = product.current_price.unwrap_or(0.0);
    format!(
        "Product: {}\nASIN: {}\nCurrent Price: ${}\nOriginal Price: ${}\nLowest Recorded Price: ${}\nDescription: {}",
        product.title,
        product.asin,
        fmt_amount(current),
        fmt_amount(product.original_price.filter(|p| *p != 0.0).unwrap_or(current)),
        fmt_amount(lowest_price.unwrap_or(current)),
        product
            .description
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or("No description available"),
    )
}

fn chat_system_prompt(context: &str) -> String {
    format!(
        "{}\n\nHere's information about the product the user is asking about:\n{}\n\nFocus on the product in context and answer the user's questions based on this information.\nToday's date is {}.",
        SYSTEM_PROMPT,
        context,
        Utc::now().format("%-m/%-d/%Y")
    )
}

pub fn insight_prompt(title: &str, description: Option<&str>, price: Option<f64>) -> String {
    format!(
        "Analyze this Amazon India product:\nTitle: {}\nDescription: {}\nPrice: ₹{}\n\n\
         Provide a concise analysis including:\n\
         1. Value for money assessment\n\
         2. Key features and benefits\n\
         3. Potential drawbacks or concerns\n\
         4. When this would be a good purchase\n\
         5. Is this a good time to buy based on the current price?\n\n\
         Keep the response under 250 words and make it helpful for a shopper.",
        title,
        description.filter(|d| !d.is_empty()).unwrap_or("Not available"),
        price
            .filter(|p| *p != 0.0)
            .map(fmt_amount)
            .unwrap_or_else(|| "Not available".to_string()),
    )
}

fn sentiment_prompt(reviews: &str) -> String {
    format!(
        "Analyze the sentiment of these Amazon product reviews. Categorize each review as positive, negative, or neutral. Then provide a count of each category, identify the top 3 most positive and top 3 most negative reviews, and give an overall summary of customer sentiment in 2-3 sentences.\n\n\
         Reviews:\n{}\n\n\
         Output your response in this JSON format:\n\
         {{\n  \"sentiment\": {{\n    \"positive\": number,\n    \"negative\": number,\n    \"neutral\": number,\n    \"total\": number\n  }},\n  \
         \"topPositive\": [\"review text 1\", \"review text 2\", \"review text 3\"],\n  \
         \"topNegative\": [\"review text 1\", \"review text 2\", \"review text 3\"],\n  \
         \"summary\": \"Overall sentiment summary here\"\n}}",
        reviews
    )
}

//=========================================================================================
// Sentiment
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentCounts {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SentimentReport {
    pub sentiment: SentimentCounts,
    pub top_positive: Vec<String>,
    pub top_negative: Vec<String>,
    pub summary: String,
}

impl SentimentReport {
    fn empty(total: usize, summary: &str) -> Self {
        Self {
            sentiment: SentimentCounts {
                total: u32::try_from(total).unwrap_or(u32::MAX),
                ..Default::default()
            },
            summary: summary.to_string(),
            ..Default::default()
        }
    }
}

fn fenced_json() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\n(.*?)\n```").ok())
        .as_ref()
}

/// Finds the JSON document in a model reply: a ```json fence, else the outermost braces.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(caps) = fenced_json().and_then(|re| re.captures(text)) {
        return caps.get(1).map(|m| m.as_str());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Parses a sentiment reply, falling back to an empty report over `review_count` reviews.
pub fn parse_sentiment_reply(reply: Option<&str>, review_count: usize) -> SentimentReport {
    let Some(text) = reply else {
        return SentimentReport::empty(review_count, "No sentiment analysis available.");
    };
    match extract_json_block(text).map(serde_json::from_str::<SentimentReport>) {
        Some(Ok(report)) => report,
        Some(Err(e)) => {
            error!(error = %e, "Error parsing sentiment analysis");
            SentimentReport::empty(review_count, "Unable to parse sentiment analysis results.")
        }
        None => SentimentReport::empty(review_count, "Unable to parse sentiment analysis results."),
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

//=========================================================================================
// The Service
//=========================================================================================

/// The completion backends used by each assistant feature.
#[derive(Clone)]
pub struct AssistantModels {
    pub chat: Arc<dyn CompletionService>,
    pub insight: Arc<dyn CompletionService>,
    pub sentiment: Arc<dyn CompletionService>,
}

impl AssistantModels {
    /// Uses one backend for every feature.
    pub fn shared(model: Arc<dyn CompletionService>) -> Self {
        Self {
            chat: model.clone(),
            insight: model.clone(),
            sentiment: model,
        }
    }
}

pub struct AssistantService {
    db: Arc<dyn DatabaseService>,
    products: Arc<dyn ProductDataService>,
    models: AssistantModels,
}

fn parse_product_id(product_id: &str) -> PortResult<Uuid> {
    Uuid::parse_str(product_id.trim())
        .map_err(|_| PortError::NotFound(format!("Product {} not found", product_id)))
}

impl AssistantService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        products: Arc<dyn ProductDataService>,
        models: AssistantModels,
    ) -> Self {
        Self {
            db,
            products,
            models,
        }
    }

    /// Answers a shopper's question about a stored product.
    pub async fn chat(&self, product_id: &str, message: &str) -> PortResult<String> {
        if product_id.trim().is_empty() || message.trim().is_empty() {
            return Err(PortError::Validation(
                "Product ID and message are required".to_string(),
            ));
        }
        let product = self.db.get_product_by_id(parse_product_id(product_id)?).await?;
        info!(product_id = %product.id, "Processing chatbot request");

        let lowest = match self.db.get_price_history(product.id).await {
            Ok(points) => points.iter().map(|p| p.price).reduce(f64::min),
            Err(e) => {
                error!(error = %e, "Error fetching price history");
                None
            }
        };

        let reply = self
            .models
            .chat
            .complete(CompletionRequest {
                system: Some(chat_system_prompt(&product_context(&product, lowest))),
                prompt: message.to_string(),
                temperature: 0.7,
                max_tokens: 1000,
            })
            .await?;
        Ok(reply
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| CHAT_FALLBACK.to_string()))
    }

    /// A short buying analysis for a product that need not be stored.
    pub async fn quick_insight(
        &self,
        title: &str,
        description: Option<&str>,
        price: Option<f64>,
    ) -> PortResult<String> {
        if title.trim().is_empty() {
            return Err(PortError::Validation("Product title is required".to_string()));
        }
        info!(%title, "Processing insights request");
        self.generate_insight(title, description, price).await
    }

    /// The stored insight for a product, regenerated when older than a day.
    pub async fn cached_insight(&self, product_id: &str) -> PortResult<String> {
        if product_id.trim().is_empty() {
            return Err(PortError::Validation("Product ID is required".to_string()));
        }
        let product = self.db.get_product_by_id(parse_product_id(product_id)?).await?;

        match self.db.get_product_insight(product.id).await {
            Ok(Some(insight))
                if Utc::now() - insight.created_at < Duration::hours(INSIGHT_TTL_HOURS) =>
            {
                return Ok(insight.insight_text);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Error reading cached insight"),
        }

        let text = self
            .generate_insight(
                &product.title,
                product.description.as_deref(),
                product.current_price,
            )
            .await?;
        if let Err(e) = self.db.save_product_insight(product.id, &text).await {
            error!(error = %e, product_id = %product.id, "Error saving product insights");
        }
        Ok(text)
    }

    async fn generate_insight(
        &self,
        title: &str,
        description: Option<&str>,
        price: Option<f64>,
    ) -> PortResult<String> {
        let reply = self
            .models
            .insight
            .complete(CompletionRequest {
                system: None,
                prompt: insight_prompt(title, description, price),
                temperature: 0.7,
                max_tokens: 500,
            })
            .await?;
        Ok(reply
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| INSIGHT_FALLBACK.to_string()))
    }

    /// Summarizes customer sentiment from the product's reviews.
    pub async fn sentiment(&self, asin: &str, country: Option<&str>) -> PortResult<SentimentReport> {
        if asin.trim().is_empty() {
            return Err(PortError::Validation("ASIN is required".to_string()));
        }
        let country = country
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_REVIEW_COUNTRY);
        let reviews = self.products.fetch_reviews(asin, country).await?;
        info!(%asin, count = reviews.len(), "Fetched reviews");

        let joined = reviews.join("\n");
        if joined.trim().is_empty() {
            return Ok(SentimentReport::empty(
                0,
                "No reviews available for sentiment analysis.",
            ));
        }

        let reply = self
            .models
            .sentiment
            .complete(CompletionRequest {
                system: None,
                prompt: sentiment_prompt(truncate_chars(&joined, MAX_REVIEW_CHARS)),
                temperature: 0.7,
                max_tokens: 1000,
            })
            .await?;
        Ok(parse_sentiment_reply(reply.as_deref(), reviews.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PricePoint, ProductInsight};
    use crate::testing::{InMemoryDatabase, ScriptedCompletion, StubProductData};

    fn product(db: &InMemoryDatabase) -> Uuid {
        let id = Uuid::new_v4();
        db.add_product(CatalogProduct {
            id,
            asin: "B08N5WRWNW".to_string(),
            title: "Echo Dot".to_string(),
            current_price: Some(49.99),
            ..Default::default()
        });
        id
    }

    fn service(
        db: Arc<InMemoryDatabase>,
        model: Arc<ScriptedCompletion>,
        reviews: Vec<String>,
    ) -> AssistantService {
        AssistantService::new(
            db,
            Arc::new(StubProductData {
                product: None,
                reviews,
            }),
            AssistantModels::shared(model),
        )
    }

    #[test]
    fn context_uses_fallbacks() {
        let p = CatalogProduct {
            title: "Kettle".to_string(),
            asin: "B000000001".to_string(),
            current_price: Some(25.0),
            ..Default::default()
        };
        let ctx = product_context(&p, None);
        assert!(ctx.contains("Current Price: $25\n"));
        assert!(ctx.contains("Original Price: $25\n"));
        assert!(ctx.contains("Lowest Recorded Price: $25\n"));
        assert!(ctx.ends_with("Description: No description available"));
    }

    #[tokio::test]
    async fn chat_sends_context_and_lowest_price() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = product(&db);
        for price in [59.99, 39.99] {
            db.add_price_point(PricePoint {
                product_id: id,
                price,
                recorded_at: Utc::now(),
            });
        }
        let model = Arc::new(ScriptedCompletion::replying("Buy it on sale."));

        let reply = service(db, model.clone(), Vec::new())
            .chat(&id.to_string(), "Is this a good deal?")
            .await
            .unwrap();

        assert_eq!(reply, "Buy it on sale.");
        let sent = &model.requests()[0];
        assert_eq!(sent.prompt, "Is this a good deal?");
        assert_eq!(sent.max_tokens, 1000);
        let system = sent.system.as_deref().unwrap();
        assert!(system.starts_with("You are SmartCart AI"));
        assert!(system.contains("Lowest Recorded Price: $39.99"));
    }

    #[tokio::test]
    async fn chat_falls_back_on_empty_reply() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = product(&db);
        let reply = service(db, Arc::new(ScriptedCompletion::silent()), Vec::new())
            .chat(&id.to_string(), "hello")
            .await
            .unwrap();
        assert_eq!(reply, CHAT_FALLBACK);
    }

    #[tokio::test]
    async fn chat_validates_inputs() {
        let db = Arc::new(InMemoryDatabase::new());
        let svc = service(db, Arc::new(ScriptedCompletion::silent()), Vec::new());
        assert!(matches!(
            svc.chat("", "hi").await,
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            svc.chat(&Uuid::new_v4().to_string(), "hi").await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn quick_insight_uses_short_budget() {
        let model = Arc::new(ScriptedCompletion::replying("Solid value."));
        let svc = service(Arc::new(InMemoryDatabase::new()), model.clone(), Vec::new());

        let text = svc.quick_insight("Kettle", None, Some(1299.0)).await.unwrap();

        assert_eq!(text, "Solid value.");
        let sent = &model.requests()[0];
        assert_eq!(sent.max_tokens, 500);
        assert!(sent.prompt.contains("Price: ₹1299\n"));
        assert!(sent.prompt.contains("Description: Not available\n"));
        assert!(matches!(
            svc.quick_insight(" ", None, None).await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn cached_insight_is_reused_within_a_day() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = product(&db);
        db.add_insight(ProductInsight {
            product_id: id,
            insight_text: "cached".to_string(),
            created_at: Utc::now() - Duration::hours(2),
        });
        let model = Arc::new(ScriptedCompletion::replying("fresh"));

        let text = service(db, model.clone(), Vec::new())
            .cached_insight(&id.to_string())
            .await
            .unwrap();

        assert_eq!(text, "cached");
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn stale_insight_is_regenerated_and_stored() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = product(&db);
        db.add_insight(ProductInsight {
            product_id: id,
            insight_text: "old".to_string(),
            created_at: Utc::now() - Duration::hours(30),
        });

        let text = service(
            db.clone(),
            Arc::new(ScriptedCompletion::replying("fresh")),
            Vec::new(),
        )
        .cached_insight(&id.to_string())
        .await
        .unwrap();

        assert_eq!(text, "fresh");
        assert_eq!(db.insight(id).map(|i| i.insight_text).as_deref(), Some("fresh"));
    }

    #[test]
    fn extracts_fenced_or_braced_json() {
        assert_eq!(
            extract_json_block("Here:\n```json\n{\"a\":1}\n```\nDone"),
            Some("{\"a\":1}")
        );
        assert_eq!(
            extract_json_block("Result: {\"a\": {\"b\": 2}} trailing"),
            Some("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn unparseable_reply_gives_default_report() {
        let report = parse_sentiment_reply(Some("I cannot help {with that}"), 7);
        assert_eq!(report.sentiment.total, 7);
        assert_eq!(report.summary, "Unable to parse sentiment analysis results.");
        assert!(report.top_positive.is_empty());
    }

    #[tokio::test]
    async fn sentiment_without_reviews_skips_the_model() {
        let model = Arc::new(ScriptedCompletion::replying("{}"));
        let report = service(Arc::new(InMemoryDatabase::new()), model.clone(), Vec::new())
            .sentiment("B08N5WRWNW", None)
            .await
            .unwrap();
        assert_eq!(report.sentiment, SentimentCounts::default());
        assert_eq!(report.summary, "No reviews available for sentiment analysis.");
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn sentiment_parses_model_json() {
        let reply = "```json\n{\"sentiment\":{\"positive\":2,\"negative\":1,\"neutral\":0,\"total\":3},\"topPositive\":[\"Great\"],\"topNegative\":[\"Broke\"],\"summary\":\"Mostly happy.\"}\n```";
        let model = Arc::new(ScriptedCompletion::replying(reply));
        let reviews = vec!["Great".to_string(), "Good".to_string(), "Broke".to_string()];

        let report = service(Arc::new(InMemoryDatabase::new()), model.clone(), reviews)
            .sentiment("B08N5WRWNW", None)
            .await
            .unwrap();

        assert_eq!(report.sentiment.positive, 2);
        assert_eq!(report.top_negative, vec!["Broke".to_string()]);
        assert_eq!(report.summary, "Mostly happy.");
        assert!(model.requests()[0].prompt.contains("Great\nGood\nBroke"));
    }

    #[test]
    fn review_text_is_truncated_on_char_boundaries() {
        let long = "é".repeat(MAX_REVIEW_CHARS + 5);
        assert_eq!(truncate_chars(&long, MAX_REVIEW_CHARS).chars().count(), MAX_REVIEW_CHARS);
    }
}
