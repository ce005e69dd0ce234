use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::detector;
use crate::error::{AppError, Result};
use crate::fetcher::PriceSource;
use crate::notifier::WebhookNotifier;
use crate::store::ItemStore;
use crate::types::{FailedItem, NotificationOutcome, PassReport};

/// Scheduler lifecycle, exposed on /health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

const PASS_IDLE: u8 = 0;
const PASS_RUNNING: u8 = 1;

// ---------------------------------------------------------------------------
// PollScheduler
// ---------------------------------------------------------------------------

/// Drives the poll loop: one pass immediately on start, then one per
/// configured interval. A pass enumerates the tracked set and, strictly one
/// item at a time: fetch → detect → notify on change → unconditionally write
/// the fresh snapshot back as the new baseline → sleep the pacing delay.
///
/// The pass CAS on `pass_state` serializes timer-driven and manual passes —
/// an overlapping trigger is rejected with `Busy` instead of double-notifying.
/// A single item's failure never aborts the pass; every tracked item is
/// attempted exactly once per pass.
pub struct PollScheduler {
    store: Arc<ItemStore>,
    source: Arc<dyn PriceSource>,
    notifier: Arc<WebhookNotifier>,
    latency: Arc<LatencyStats>,
    poll_interval: Duration,
    pacing: Duration,
    pass_state: AtomicU8,
    /// Disarms the timer. Takes effect between passes — a started pass always
    /// runs to completion.
    stopped: AtomicBool,
    passes_completed: AtomicU64,
    /// Unix seconds of the last completed pass (0 = none yet).
    last_pass_at_secs: AtomicU64,
}

impl PollScheduler {
    pub fn new(
        cfg: &Config,
        store: Arc<ItemStore>,
        source: Arc<dyn PriceSource>,
        notifier: Arc<WebhookNotifier>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            latency,
            poll_interval: Duration::from_secs(cfg.poll_interval_secs.max(1)),
            pacing: Duration::from_millis(cfg.pacing_ms),
            pass_state: AtomicU8::new(PASS_IDLE),
            stopped: AtomicBool::new(false),
            passes_completed: AtomicU64::new(0),
            last_pass_at_secs: AtomicU64::new(0),
        }
    }

    /// Timer loop. The first tick completes immediately, so a full pass runs
    /// on start before the interval begins pacing the rest.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.poll_interval);

        loop {
            ticker.tick().await;
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            match self.run_pass().await {
                Ok(_) => {}
                Err(AppError::Busy) => {
                    warn!("Skipping scheduled pass: previous pass still running");
                }
                Err(e) => error!("Scheduled pass failed to start: {e}"),
            }
        }
        info!("Poll scheduler stopped");
    }

    /// Disarm the timer. The current pass, if any, runs to completion.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> SchedulerState {
        if self.pass_state.load(Ordering::SeqCst) == PASS_RUNNING {
            SchedulerState::Running
        } else if self.stopped.load(Ordering::SeqCst) {
            SchedulerState::Stopped
        } else {
            SchedulerState::Idle
        }
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::SeqCst)
    }

    pub fn last_pass_at_secs(&self) -> u64 {
        self.last_pass_at_secs.load(Ordering::SeqCst)
    }

    /// Run one full pass now. Manual triggers share this entry point with the
    /// timer; `Busy` is the only possible error.
    pub async fn run_pass(&self) -> Result<PassReport> {
        if self
            .pass_state
            .compare_exchange(PASS_IDLE, PASS_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::Busy);
        }

        let report = self.pass_inner().await;

        self.passes_completed.fetch_add(1, Ordering::SeqCst);
        self.last_pass_at_secs.store(now_secs(), Ordering::SeqCst);
        self.pass_state.store(PASS_IDLE, Ordering::SeqCst);

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            changes = report.changes,
            notified = report.notified,
            failed = report.failed.len(),
            "Pass complete: {}/{} items ok, {} changed, {} notified",
            report.succeeded,
            report.attempted,
            report.changes,
            report.notified,
        );

        Ok(report)
    }

    async fn pass_inner(&self) -> PassReport {
        let items = self.store.list();
        let mut report = PassReport { attempted: items.len(), ..PassReport::default() };

        for (i, item) in items.iter().enumerate() {
            let started = Instant::now();
            match self.source.fetch_item(item.item_id, item.sid).await {
                Ok(Some(fresh)) => {
                    self.latency.record(started.elapsed());

                    if let Some(change) = detector::detect(item, &fresh) {
                        report.changes += 1;
                        info!(
                            item_id = item.item_id,
                            sid = item.sid,
                            old_price = change.old_price,
                            new_price = change.new_price,
                            "Price {}: {} {} -> {}",
                            change.direction,
                            change.item_name,
                            change.old_price,
                            change.new_price,
                        );
                        match self.notifier.notify(&change).await {
                            NotificationOutcome::Delivered => report.notified += 1,
                            NotificationOutcome::Disabled => {}
                            NotificationOutcome::Failed(reason) => {
                                warn!(
                                    item_id = item.item_id,
                                    sid = item.sid,
                                    "Notification dropped: {reason}",
                                );
                            }
                        }
                    }

                    // The stored baseline always follows the latest fetch,
                    // change or not.
                    if self.store.update(item.item_id, item.sid, &fresh).await.is_none() {
                        debug!(
                            item_id = item.item_id,
                            sid = item.sid,
                            "Item removed mid-pass; skipping baseline update",
                        );
                    }
                    report.succeeded += 1;
                }
                Ok(None) => {
                    warn!(item_id = item.item_id, sid = item.sid, "Item not found on market; skipping");
                    report.failed.push(FailedItem {
                        item_id: item.item_id,
                        sid: item.sid,
                        reason: "not found on market".to_string(),
                    });
                }
                Err(e) => {
                    warn!(item_id = item.item_id, sid = item.sid, "Fetch failed: {e}");
                    report.failed.push(FailedItem {
                        item_id: item.item_id,
                        sid: item.sid,
                        reason: e.to_string(),
                    });
                }
            }

            if i + 1 < items.len() && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        report
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;

    use crate::types::ItemSnapshot;

    struct StubSource {
        responses: HashMap<(i64, i64), ItemSnapshot>,
        failing: HashSet<(i64, i64)>,
        delay: Duration,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                failing: HashSet::new(),
                delay: Duration::ZERO,
            }
        }

        fn respond(mut self, item_id: i64, sid: i64, name: &str, price: i64, stock: i64) -> Self {
            self.responses.insert(
                (item_id, sid),
                ItemSnapshot {
                    name: name.to_string(),
                    price,
                    stock,
                    last_sold_time: 1_700_000_100,
                },
            );
            self
        }

        fn fail(mut self, item_id: i64, sid: i64) -> Self {
            self.failing.insert((item_id, sid));
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl PriceSource for StubSource {
        async fn fetch_item(&self, item_id: i64, sid: i64) -> Result<Option<ItemSnapshot>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.contains(&(item_id, sid)) {
                return Err(AppError::Fetch("connection reset".to_string()));
            }
            Ok(self.responses.get(&(item_id, sid)).cloned())
        }
    }

    fn test_config() -> Config {
        Config {
            market_api_url: "http://localhost".to_string(),
            region: "na".to_string(),
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 3000,
            poll_interval_secs: 300,
            pacing_ms: 0,
            webhook_url: None,
        }
    }

    /// Store seeded with `(item_id, sid, name, price)` records, scheduler
    /// wired to the given stub with zero pacing and no webhook.
    async fn scheduler_with(
        source: StubSource,
        seed: &[(i64, i64, &str, i64)],
    ) -> (Arc<PollScheduler>, Arc<ItemStore>) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
        let store = ItemStore::load(pool).await.expect("load");

        for &(item_id, sid, name, price) in seed {
            store
                .add(
                    item_id,
                    sid,
                    &ItemSnapshot {
                        name: name.to_string(),
                        price,
                        stock: 10,
                        last_sold_time: 1_700_000_000,
                    },
                )
                .await
                .expect("seed");
        }

        let cfg = test_config();
        let notifier = Arc::new(WebhookNotifier::new(&cfg).expect("notifier"));
        let scheduler = Arc::new(PollScheduler::new(
            &cfg,
            Arc::clone(&store),
            Arc::new(source),
            notifier,
            Arc::new(LatencyStats::new()),
        ));
        (scheduler, store)
    }

    #[tokio::test]
    async fn increase_is_detected_and_baseline_updated() {
        let source = StubSource::new().respond(10007, 0, "Grunil Helmet", 120_000, 7);
        let (scheduler, store) = scheduler_with(source, &[(10007, 0, "Grunil Helmet", 100_000)]).await;

        let report = scheduler.run_pass().await.expect("pass");

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.changes, 1);
        assert_eq!(report.notified, 0, "webhook disabled, nothing delivered");
        assert!(report.failed.is_empty());

        let item = store.get(10007, 0).unwrap();
        assert_eq!(item.last_price, 120_000);
        assert_eq!(item.last_stock, 7);
    }

    #[tokio::test]
    async fn zero_baseline_sets_price_without_a_change() {
        let source = StubSource::new().respond(10007, 0, "Grunil Helmet", 50_000, 3);
        let (scheduler, store) = scheduler_with(source, &[(10007, 0, "Grunil Helmet", 0)]).await;

        let report = scheduler.run_pass().await.expect("pass");

        assert_eq!(report.changes, 0);
        assert_eq!(store.get(10007, 0).unwrap().last_price, 50_000);
    }

    #[tokio::test]
    async fn unchanged_price_still_refreshes_stock_and_sale_time() {
        let source = StubSource::new().respond(10007, 0, "Grunil Helmet", 100_000, 99);
        let (scheduler, store) = scheduler_with(source, &[(10007, 0, "Grunil Helmet", 100_000)]).await;

        let report = scheduler.run_pass().await.expect("pass");

        assert_eq!(report.changes, 0);
        let item = store.get(10007, 0).unwrap();
        assert_eq!(item.last_stock, 99);
        assert_eq!(item.last_sold_time, 1_700_000_100);
    }

    #[tokio::test]
    async fn one_failing_fetch_does_not_abort_the_pass() {
        let source = StubSource::new()
            .respond(1, 0, "Item A", 200, 10)
            .respond(3, 0, "Item C", 400, 10)
            .fail(2, 0);
        let (scheduler, store) = scheduler_with(
            source,
            &[(1, 0, "Item A", 100), (2, 0, "Item B", 100), (3, 0, "Item C", 100)],
        )
        .await;

        let report = scheduler.run_pass().await.expect("pass must not raise");

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].item_id, 2);
        assert!(report.failed[0].reason.contains("connection reset"));

        assert_eq!(store.get(1, 0).unwrap().last_price, 200);
        assert_eq!(store.get(3, 0).unwrap().last_price, 400);
        // The failed item keeps its old baseline.
        assert_eq!(store.get(2, 0).unwrap().last_price, 100);
    }

    #[tokio::test]
    async fn vanished_item_is_reported_and_baseline_kept() {
        let source = StubSource::new();
        let (scheduler, store) = scheduler_with(source, &[(10007, 0, "Grunil Helmet", 100_000)]).await;

        let report = scheduler.run_pass().await.expect("pass");

        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].reason, "not found on market");
        assert_eq!(store.get(10007, 0).unwrap().last_price, 100_000);
    }

    #[tokio::test]
    async fn overlapping_passes_are_rejected_as_busy() {
        let source = StubSource::new()
            .respond(10007, 0, "Grunil Helmet", 100_000, 10)
            .delayed(Duration::from_millis(50));
        let (scheduler, _store) = scheduler_with(source, &[(10007, 0, "Grunil Helmet", 100_000)]).await;

        let (first, second) = tokio::join!(scheduler.run_pass(), scheduler.run_pass());

        let busy_count = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Err(AppError::Busy)))
            .count();
        assert_eq!(busy_count, 1, "exactly one pass must be rejected");
        assert_eq!(scheduler.passes_completed(), 1);
    }

    #[tokio::test]
    async fn stop_transitions_state_and_pass_counters_survive() {
        let source = StubSource::new().respond(10007, 0, "Grunil Helmet", 100_000, 10);
        let (scheduler, _store) = scheduler_with(source, &[(10007, 0, "Grunil Helmet", 100_000)]).await;

        assert_eq!(scheduler.state(), SchedulerState::Idle);
        scheduler.run_pass().await.expect("pass");
        assert_eq!(scheduler.passes_completed(), 1);
        assert!(scheduler.last_pass_at_secs() > 0);

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        // Manual passes still work after the timer is disarmed.
        scheduler.run_pass().await.expect("manual pass");
        assert_eq!(scheduler.passes_completed(), 2);
    }
}
