mod api;
mod config;
mod db;
mod detector;
mod error;
mod fetcher;
mod notifier;
mod scheduler;
mod store;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{MarketApiClient, PriceSource};
use crate::notifier::WebhookNotifier;
use crate::scheduler::PollScheduler;
use crate::store::ItemStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Tracked items from disk ---
    let store = ItemStore::load(pool).await?;
    info!("Loaded {} tracked items (region {})", store.len(), cfg.region);

    // --- Collaborators ---
    let source: Arc<dyn PriceSource> = Arc::new(MarketApiClient::new(&cfg)?);
    let notifier = Arc::new(WebhookNotifier::new(&cfg)?);
    if notifier.is_enabled() {
        info!("Webhook notifications enabled");
    } else {
        warn!("WEBHOOK_URL not set — price changes will be logged only");
    }
    let latency = Arc::new(LatencyStats::new());

    // --- Poll scheduler ---
    let scheduler = Arc::new(PollScheduler::new(
        &cfg,
        Arc::clone(&store),
        Arc::clone(&source),
        Arc::clone(&notifier),
        Arc::clone(&latency),
    ));
    info!(
        "Polling every {}s with {}ms pacing between items",
        cfg.poll_interval_secs, cfg.pacing_ms,
    );
    tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run().await }
    });

    // --- HTTP API server ---
    let api_state = ApiState {
        store,
        scheduler,
        source,
        latency,
        notifier_enabled: notifier.is_enabled(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
