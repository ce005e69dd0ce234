use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{Config, WEBHOOK_TIMEOUT_SECS};
use crate::error::Result;
use crate::types::{NotificationOutcome, PriceChange, PriceDirection};

/// Embed accent colors (RGB) for the two directions.
const COLOR_INCREASE: u32 = 0x2ECC71;
const COLOR_DECREASE: u32 = 0xE74C3C;

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// Delivers price changes to a configured webhook endpoint, fire-and-forget.
///
/// An unset endpoint is a valid disabled state, not an error. Delivery
/// failures surface only as a `NotificationOutcome` — there is no retry, no
/// backoff, no dead-lettering. A missed alert for a price that later reverts
/// is silently lost; the next pass only re-detects if the price moves again.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, webhook_url: cfg.webhook_url.clone() })
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Deliver one change. Never raises — the outcome is a value the caller
    /// logs and drops.
    pub async fn notify(&self, change: &PriceChange) -> NotificationOutcome {
        let Some(url) = &self.webhook_url else {
            return NotificationOutcome::Disabled;
        };

        let payload = build_payload(change, now_secs());
        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => NotificationOutcome::Delivered,
            Ok(resp) => NotificationOutcome::Failed(format!("webhook returned {}", resp.status())),
            Err(e) => NotificationOutcome::Failed(e.to_string()),
        }
    }
}

/// Structured webhook body: title with a direction arrow, color tag, and
/// key/value fields for the new price, old price, stock and sale recency.
pub fn build_payload(change: &PriceChange, now_secs: i64) -> serde_json::Value {
    let (arrow, color) = match change.direction {
        PriceDirection::Increase => ("\u{25B2}", COLOR_INCREASE),
        PriceDirection::Decrease => ("\u{25BC}", COLOR_DECREASE),
    };

    serde_json::json!({
        "embeds": [{
            "title": format!("{arrow} {} — price {}", change.item_name, change.direction),
            "color": color,
            "fields": [
                {
                    "name": "New price",
                    "value": format!("{} silver", format_silver(change.new_price)),
                    "inline": true
                },
                {
                    "name": "Old price",
                    "value": format!("{} silver", format_silver(change.old_price)),
                    "inline": true
                },
                {
                    "name": "In stock",
                    "value": change.stock.to_string(),
                    "inline": true
                },
                {
                    "name": "Last sold",
                    "value": recency_label(change.last_sold_time, now_secs),
                    "inline": true
                },
            ],
        }]
    })
}

/// `1234567` → `"1,234,567"`.
pub fn format_silver(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// Humanize the gap between a sale timestamp and now.
pub fn recency_label(last_sold_time: i64, now_secs: i64) -> String {
    if last_sold_time <= 0 {
        return "never".to_string();
    }
    let delta = (now_secs - last_sold_time).max(0);
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3_600 {
        format!("{}m ago", delta / 60)
    } else if delta < 86_400 {
        format!("{}h ago", delta / 3_600)
    } else {
        format!("{}d ago", delta / 86_400)
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
