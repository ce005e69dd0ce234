use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::api::health::health;
use crate::api::latency::LatencyStats;
use crate::error::AppError;
use crate::fetcher::PriceSource;
use crate::scheduler::PollScheduler;
use crate::store::ItemStore;
use crate::types::{PassReport, TrackedItem};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<ItemStore>,
    pub scheduler: Arc<PollScheduler>,
    pub source: Arc<dyn PriceSource>,
    pub latency: Arc<LatencyStats>,
    pub notifier_enabled: bool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/items", get(list_items).post(add_item))
        .route("/items/:item_id", delete(remove_item))
        .route("/items/:item_id/:sid", get(get_item).delete(remove_variant))
        .route("/check", post(trigger_check))
        .route("/health", get(health))
        .route("/stats/latency", get(stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub item_id: i64,
    /// Enhancement variant; base item when omitted.
    #[serde(default)]
    pub sid: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_items(State(state): State<ApiState>) -> Json<Vec<TrackedItem>> {
    Json(state.store.list())
}

async fn get_item(
    State(state): State<ApiState>,
    Path((item_id, sid)): Path<(i64, i64)>,
) -> Result<Json<TrackedItem>, AppError> {
    state
        .store
        .get(item_id, sid)
        .map(Json)
        .ok_or(AppError::ItemNotFound { item_id, sid: Some(sid) })
}

/// Tracking requires a successful market fetch to seed the initial snapshot —
/// a pair the market cannot resolve is rejected with 404.
async fn add_item(
    State(state): State<ApiState>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<TrackedItem>), AppError> {
    let snapshot = state
        .source
        .fetch_item(req.item_id, req.sid)
        .await?
        .ok_or(AppError::ItemNotFound { item_id: req.item_id, sid: Some(req.sid) })?;

    let item = state.store.add(req.item_id, req.sid, &snapshot).await?;
    info!(item_id = item.item_id, sid = item.sid, "Tracking {}", item.name);
    Ok((StatusCode::CREATED, Json(item)))
}

/// Removes every tracked variant of the item.
async fn remove_item(
    State(state): State<ApiState>,
    Path(item_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.store.remove(item_id, None).await {
        info!(item_id, "Stopped tracking all variants");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::ItemNotFound { item_id, sid: None })
    }
}

async fn remove_variant(
    State(state): State<ApiState>,
    Path((item_id, sid)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    if state.store.remove(item_id, Some(sid)).await {
        info!(item_id, sid, "Stopped tracking");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::ItemNotFound { item_id, sid: Some(sid) })
    }
}

/// Run one pass synchronously. Contract is identical to a timer-driven pass;
/// 409 if a pass is already in flight.
async fn trigger_check(State(state): State<ApiState>) -> Result<Json<PassReport>, AppError> {
    let report = state.scheduler.run_pass().await?;
    Ok(Json(report))
}

async fn stats_latency(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(serde_json::json!({
        "samples": state.latency.len(),
        "p50_ms": p50,
        "p95_ms": p95,
        "p99_ms": p99,
    }))
}
