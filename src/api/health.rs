//! Service health endpoint: scheduler lifecycle and pass counters.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::routes::ApiState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub scheduler_state: String,
    pub tracked_items: usize,
    pub passes_completed: u64,
    /// Unix seconds of the last completed pass (0 = none yet).
    pub last_pass_at: u64,
    pub notifications_enabled: bool,
}

pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        scheduler_state: state.scheduler.state().to_string(),
        tracked_items: state.store.len(),
        passes_completed: state.scheduler.passes_completed(),
        last_pass_at: state.scheduler.last_pass_at_secs(),
        notifications_enabled: state.notifier_enabled,
    })
}
