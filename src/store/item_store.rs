use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::warn;

use crate::db::models::TrackedItemRow;
use crate::error::{AppError, Result};
use crate::types::{ItemSnapshot, TrackedItem};

// ---------------------------------------------------------------------------
// ItemStore
// ---------------------------------------------------------------------------

/// Durable mapping from `(item_id, sid)` to the last-known market snapshot.
///
/// The in-memory map is the authoritative read path; every mutation is
/// written through to SQLite before the call returns. A failed write is
/// logged and the in-memory state kept — durability is best-effort, not
/// transactional. Per-entry locking in the map serializes concurrent
/// read-modify-write operations from the scheduler and the HTTP API.
pub struct ItemStore {
    /// (item_id, sid) → tracked record
    items: DashMap<(i64, i64), TrackedItem>,
    pool: sqlx::SqlitePool,
}

impl ItemStore {
    /// Load all persisted records into memory and return the store.
    pub async fn load(pool: sqlx::SqlitePool) -> Result<Arc<Self>> {
        let rows: Vec<TrackedItemRow> = sqlx::query_as(
            "SELECT item_id, sid, name, last_price, last_stock, last_sold_time, added_at \
             FROM tracked_items",
        )
        .fetch_all(&pool)
        .await?;

        let items = DashMap::new();
        for row in rows {
            let item = TrackedItem::from(row);
            items.insert((item.item_id, item.sid), item);
        }

        Ok(Arc::new(Self { items, pool }))
    }

    /// All tracked records, in no particular order.
    pub fn list(&self) -> Vec<TrackedItem> {
        self.items.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get(&self, item_id: i64, sid: i64) -> Option<TrackedItem> {
        self.items.get(&(item_id, sid)).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Start tracking a pair, seeded from a fresh snapshot. Fails with
    /// `AlreadyTracked` if the pair exists; the existing record is untouched.
    pub async fn add(&self, item_id: i64, sid: i64, snapshot: &ItemSnapshot) -> Result<TrackedItem> {
        let item = TrackedItem {
            item_id,
            sid,
            name: snapshot.name.clone(),
            last_price: snapshot.price,
            last_stock: snapshot.stock,
            last_sold_time: snapshot.last_sold_time,
            added_at: now_millis(),
        };

        match self.items.entry((item_id, sid)) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AppError::AlreadyTracked { item_id, sid });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(item.clone());
            }
        }

        self.persist_upsert(&item).await;
        Ok(item)
    }

    /// Stop tracking. With `Some(sid)` removes exactly that pair; with `None`
    /// removes every variant of `item_id`. Returns whether anything was removed.
    pub async fn remove(&self, item_id: i64, sid: Option<i64>) -> bool {
        let removed: Vec<(i64, i64)> = match sid {
            Some(sid) => self
                .items
                .remove(&(item_id, sid))
                .map(|(key, _)| key)
                .into_iter()
                .collect(),
            None => {
                let keys: Vec<(i64, i64)> = self
                    .items
                    .iter()
                    .filter(|e| e.key().0 == item_id)
                    .map(|e| *e.key())
                    .collect();
                keys.into_iter()
                    .filter(|key| self.items.remove(key).is_some())
                    .collect()
            }
        };

        if removed.is_empty() {
            return false;
        }
        for (item_id, sid) in &removed {
            self.persist_delete(*item_id, *sid).await;
        }
        true
    }

    /// Overwrite the stored snapshot fields with a fresh fetch. `added_at` is
    /// kept. Returns None if the pair is not tracked — never creates a record.
    pub async fn update(
        &self,
        item_id: i64,
        sid: i64,
        snapshot: &ItemSnapshot,
    ) -> Option<TrackedItem> {
        let updated = {
            let mut entry = self.items.get_mut(&(item_id, sid))?;
            entry.name = snapshot.name.clone();
            entry.last_price = snapshot.price;
            entry.last_stock = snapshot.stock;
            entry.last_sold_time = snapshot.last_sold_time;
            entry.clone()
        };

        self.persist_upsert(&updated).await;
        Some(updated)
    }

    async fn persist_upsert(&self, item: &TrackedItem) {
        let result = sqlx::query(
            "INSERT INTO tracked_items \
               (item_id, sid, name, last_price, last_stock, last_sold_time, added_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(item_id, sid) DO UPDATE SET \
               name = excluded.name, \
               last_price = excluded.last_price, \
               last_stock = excluded.last_stock, \
               last_sold_time = excluded.last_sold_time",
        )
        .bind(item.item_id)
        .bind(item.sid)
        .bind(&item.name)
        .bind(item.last_price)
        .bind(item.last_stock)
        .bind(item.last_sold_time)
        .bind(item.added_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(item_id = item.item_id, sid = item.sid, "DB write failed: {e}");
        }
    }

    async fn persist_delete(&self, item_id: i64, sid: i64) {
        let result = sqlx::query("DELETE FROM tracked_items WHERE item_id = ? AND sid = ?")
            .bind(item_id)
            .bind(sid)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            warn!(item_id, sid, "DB delete failed: {e}");
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
