//! services/api/src/config.rs
//!
//! Runtime settings for the SmartCart server and CLI.
//!
//! Everything comes from environment variables; a `.env` file in the working
//! directory is read first outside of tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

pub(crate) const SECONDS_PER_HOUR: u64 = 3600;

/// Why the environment could not be turned into a `Config`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings shared by the `api` and `smartcart` binaries.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub llm_api_key: Option<String>,
    pub llm_api_base: String,
    pub chat_model: String,
    pub insight_model: String,
    pub sentiment_model: String,
    pub amazon_api_key: Option<String>,
    pub amazon_api_host: String,
    /// Hours between daily price tracking runs; `None` disables the scheduler.
    pub price_tracking_interval_hours: Option<u64>,
    pub cors_origin: String,
    pub local_storage_path: PathBuf,
    pub access_token: Option<String>,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Hours between tracking runs; `0` disables the scheduler. The interval must fit in seconds.
fn parse_tracking_interval(raw: &str) -> Result<Option<u64>, ConfigError> {
    let invalid =
        |reason: String| ConfigError::InvalidValue("PRICE_TRACKING_INTERVAL_HOURS".to_string(), reason);
    let hours = raw.parse::<u64>().map_err(|e| invalid(e.to_string()))?;
    hours
        .checked_mul(SECONDS_PER_HOUR)
        .ok_or_else(|| invalid(format!("{} hours is too long an interval", hours)))?;
    Ok((hours > 0).then_some(hours))
}

impl Config {
    /// Reads the environment, applying defaults for everything but `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server and database ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Upstream credentials ---
        let llm_api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("GROQ_API_KEY"))
            .ok();
        let amazon_api_key = std::env::var("AMAZON_API_KEY").ok();

        // --- Model and product API endpoints ---
        let llm_api_base = var_or("LLM_API_BASE", "https://api.groq.com/openai/v1");
        let chat_model = var_or("CHAT_MODEL", "llama-3.3-70b-versatile");
        let insight_model = var_or("INSIGHT_MODEL", "llama-3.3-70b-versatile");
        let sentiment_model = var_or("SENTIMENT_MODEL", "llama-3.3-70b-versatile");
        let amazon_api_host = var_or("AMAZON_API_HOST", "real-time-amazon-data.p.rapidapi.com");

        // --- Scheduler and CLI ---
        let price_tracking_interval_hours =
            parse_tracking_interval(&var_or("PRICE_TRACKING_INTERVAL_HOURS", "24"))?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:5173");
        let local_storage_path = std::env::var("LOCAL_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.smartcart/local_storage.json"));
        let access_token = std::env::var("SMARTCART_ACCESS_TOKEN").ok();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            llm_api_key,
            llm_api_base,
            chat_model,
            insight_model,
            sentiment_model,
            amazon_api_key,
            amazon_api_host,
            price_tracking_interval_hours,
            cors_origin,
            local_storage_path,
            access_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_interval_accepts_hours_and_zero_disables() {
        assert_eq!(parse_tracking_interval("24").unwrap(), Some(24));
        assert_eq!(parse_tracking_interval("0").unwrap(), None);
    }

    #[test]
    fn tracking_interval_rejects_garbage_and_overflow() {
        assert!(matches!(
            parse_tracking_interval("daily"),
            Err(ConfigError::InvalidValue(name, _)) if name == "PRICE_TRACKING_INTERVAL_HOURS"
        ));
        let too_long = (u64::MAX / SECONDS_PER_HOUR + 1).to_string();
        assert!(matches!(
            parse_tracking_interval(&too_long),
            Err(ConfigError::InvalidValue(name, _)) if name == "PRICE_TRACKING_INTERVAL_HOURS"
        ));
        let longest = (u64::MAX / SECONDS_PER_HOUR).to_string();
        assert!(parse_tracking_interval(&longest).unwrap().is_some());
    }
}
