use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{Config, FETCH_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::ItemSnapshot;

/// Read side of the central market. `Ok(None)` means the pair does not exist
/// on the market; transport, HTTP and payload failures are errors. Nothing
/// here retries — callers decide what a failed fetch means.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_item(&self, item_id: i64, sid: i64) -> Result<Option<ItemSnapshot>>;
}

// ---------------------------------------------------------------------------
// MarketApiClient
// ---------------------------------------------------------------------------

/// HTTP client for the region-scoped central market REST API.
pub struct MarketApiClient {
    client: reqwest::Client,
    base_url: String,
    region: String,
}

impl MarketApiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.market_api_url.trim_end_matches('/').to_string(),
            region: cfg.region.clone(),
        })
    }
}

#[async_trait]
impl PriceSource for MarketApiClient {
    async fn fetch_item(&self, item_id: i64, sid: i64) -> Result<Option<ItemSnapshot>> {
        let url = format!(
            "{}/v2/{}/item?id={}&sid={}",
            self.base_url, self.region, item_id, sid
        );
        debug!(item_id, sid, "fetching {url}");

        let resp = self.client.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(AppError::Fetch(format!(
                "market API returned {} for item {item_id} sid {sid}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp.json().await?;
        match parse_item_payload(&body) {
            Some(snapshot) => Ok(Some(snapshot)),
            None => Err(AppError::Fetch(format!(
                "malformed market payload for item {item_id} sid {sid}"
            ))),
        }
    }
}

/// Parse one item object from the market API.
///
/// The API is inconsistent about numeric types — prices and timestamps arrive
/// as numbers or strings depending on the route — so every field goes through
/// a string-tolerant extractor. Some routes also wrap the result in a
/// single-element array.
pub fn parse_item_payload(v: &serde_json::Value) -> Option<ItemSnapshot> {
    let v = match v.as_array() {
        Some(items) => items.first()?,
        None => v,
    };

    let name = v.get("name")?.as_str()?.to_string();
    let price = v.get("basePrice").and_then(as_i64)?;
    let stock = v.get("currentStock").and_then(as_i64).unwrap_or(0);
    let last_sold_time = v.get("lastSoldTime").and_then(as_i64).unwrap_or(0);

    Some(ItemSnapshot { name, price, stock, last_sold_time })
}

fn as_i64(v: &serde_json::Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}
