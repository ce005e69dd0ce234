use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TrackedItem
// ---------------------------------------------------------------------------

/// A marketplace item under watch. Identity is the `(item_id, sid)` pair —
/// `sid` distinguishes enhancement variants of the same base item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedItem {
    pub item_id: i64,
    pub sid: i64,
    pub name: String,
    /// Last observed listing price, in silver.
    pub last_price: i64,
    pub last_stock: i64,
    /// Unix seconds of the most recent sale (0 = never observed).
    pub last_sold_time: i64,
    /// Unix millis when tracking began. Never overwritten.
    pub added_at: i64,
}

/// Freshly fetched market state for one `(item_id, sid)` pair. Lives for a
/// single pass iteration: diffed against the stored record, written back as
/// the new baseline, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub name: String,
    pub price: i64,
    pub stock: i64,
    pub last_sold_time: i64,
}

// ---------------------------------------------------------------------------
// Price changes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    Increase,
    Decrease,
}

impl std::fmt::Display for PriceDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PriceDirection::Increase => "increase",
            PriceDirection::Decrease => "decrease",
        };
        write!(f, "{s}")
    }
}

/// Emitted by the change detector when a stored baseline and a fresh snapshot
/// disagree on price. Consumed immediately by the notifier, never persisted.
#[derive(Debug, Clone)]
pub struct PriceChange {
    pub item_id: i64,
    pub sid: i64,
    pub item_name: String,
    pub old_price: i64,
    pub new_price: i64,
    pub direction: PriceDirection,
    pub stock: i64,
    pub last_sold_time: i64,
}

// ---------------------------------------------------------------------------
// Pass reporting
// ---------------------------------------------------------------------------

/// Aggregate of one scheduler pass over the tracked set. Returned to manual
/// trigger callers and logged after every timed pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PassReport {
    pub attempted: usize,
    pub succeeded: usize,
    /// Price changes detected (whether or not delivery succeeded).
    pub changes: usize,
    /// Notifications actually delivered to the webhook.
    pub notified: usize,
    pub failed: Vec<FailedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub item_id: i64,
    pub sid: i64,
    pub reason: String,
}

/// Delivery result for a single notification. The caller logs it and moves
/// on — there is no retry path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    /// No webhook endpoint configured; delivery skipped.
    Disabled,
    Failed(String),
}
