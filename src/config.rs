use crate::error::{AppError, Result};

pub const MARKET_API_URL: &str = "https://api.arsha.io";

/// Default seconds between scheduled passes — one pass every five minutes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Fixed delay between consecutive item fetches within a pass, so a pass
/// never bursts the market API.
pub const ITEM_PACING_MS: u64 = 500;

/// Per-request timeout for market API fetches (seconds). Bounds the worst-case
/// pass duration to roughly `items * (timeout + pacing)`.
pub const FETCH_TIMEOUT_SECS: u64 = 10;

/// Webhook delivery timeout (seconds).
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub market_api_url: String,
    /// Market region selecting the regional API endpoint (MARKET_REGION).
    pub region: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between scheduled passes (POLL_INTERVAL_SECS).
    pub poll_interval_secs: u64,
    /// Delay between item fetches within a pass (milliseconds).
    pub pacing_ms: u64,
    /// Webhook endpoint for price-change notifications (WEBHOOK_URL).
    /// None disables delivery — changes are still detected and logged.
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            market_api_url: std::env::var("MARKET_API_URL")
                .unwrap_or_else(|_| MARKET_API_URL.to_string()),
            region: std::env::var("MARKET_REGION").unwrap_or_else(|_| "na".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "watcher.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| DEFAULT_POLL_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            pacing_ms: std::env::var("ITEM_PACING_MS")
                .unwrap_or_else(|_| ITEM_PACING_MS.to_string())
                .parse::<u64>()
                .unwrap_or(ITEM_PACING_MS),
            webhook_url: std::env::var("WEBHOOK_URL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}
