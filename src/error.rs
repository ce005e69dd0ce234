use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("item {item_id} (sid {sid}) is already tracked")]
    AlreadyTracked { item_id: i64, sid: i64 },

    #[error("item {item_id} is not tracked or could not be resolved")]
    ItemNotFound { item_id: i64, sid: Option<i64> },

    #[error("a market check is already running")]
    Busy,

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::AlreadyTracked { .. } | AppError::Busy => StatusCode::CONFLICT,
            AppError::ItemNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
