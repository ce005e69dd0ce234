//! In-memory latency histogram for market API fetches.
//! The scheduler records every successful fetch; the API reads percentiles.

use std::sync::Mutex;
use std::time::Duration;

/// Shared fetch-latency stats, in milliseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    /// Tracks 1ms to 60s, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 60_000, 3)
            .expect("valid histogram bounds");
        Self { inner: Mutex::new(histogram) }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms.max(1));
        }
    }

    /// Return (p50_ms, p95_ms, p99_ms). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let Ok(h) = self.inner.lock() else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        (
            Some(h.value_at_quantile(0.5)),
            Some(h.value_at_quantile(0.95)),
            Some(h.value_at_quantile(0.99)),
        )
    }

    /// Sample count.
    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = LatencyStats::new();
        assert_eq!(stats.percentiles(), (None, None, None));
    }

    #[test]
    fn records_are_reflected_in_percentiles() {
        let stats = LatencyStats::new();
        for ms in [100u64, 200, 300] {
            stats.record(Duration::from_millis(ms));
        }
        assert_eq!(stats.len(), 3);
        let (p50, _, _) = stats.percentiles();
        let p50 = p50.unwrap();
        assert!((190..=210).contains(&p50), "p50={p50}");
    }
}
