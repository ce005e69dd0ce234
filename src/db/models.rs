//! Database row types matching the `tracked_items` schema.
//! Used by sqlx for typed queries.

use crate::types::TrackedItem;

#[derive(Debug, sqlx::FromRow)]
pub struct TrackedItemRow {
    pub item_id: i64,
    pub sid: i64,
    pub name: String,
    pub last_price: i64,
    pub last_stock: i64,
    pub last_sold_time: i64,
    pub added_at: i64,
}

impl From<TrackedItemRow> for TrackedItem {
    fn from(row: TrackedItemRow) -> Self {
        TrackedItem {
            item_id: row.item_id,
            sid: row.sid,
            name: row.name,
            last_price: row.last_price,
            last_stock: row.last_stock,
            last_sold_time: row.last_sold_time,
            added_at: row.added_at,
        }
    }
}
