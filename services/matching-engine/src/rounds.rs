//! Round metrics and timing
//!
//! Two lifetimes of aggregation:
//! - `RoundTally` lives for exactly one scheduling round: reset at round
//!   start, folded from per-market reports, logged and discarded at
//!   round end.
//! - `MatcherMetrics` is process-lifetime: atomic counters and latency
//!   trackers exported for Prometheus-style scraping and checked
//!   against alert thresholds.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::alerts::{Alert, AlertLevel};
use crate::matcher::MarketRoundReport;

/// Per-round aggregation of market reports.
#[derive(Debug, Clone, Default)]
pub struct RoundTally {
    pub round: u64,
    pub markets_processed: u64,
    pub markets_failed: u64,
    pub trades: u64,
    pub orders_filled: u64,
    pub wallet_rejections: u64,
    pub price_anomalies: u64,
    pub self_match_skips: u64,
    pub capped_markets: u64,
    pub duration_ns: u64,
}

impl RoundTally {
    pub fn new(round: u64) -> Self {
        Self {
            round,
            ..Self::default()
        }
    }

    /// Fold one market's report into the round totals.
    pub fn add_report(&mut self, report: &MarketRoundReport) {
        self.markets_processed += 1;
        self.trades += report.trades;
        self.orders_filled += report.orders_filled;
        self.wallet_rejections += report.wallet_rejections;
        self.price_anomalies += report.price_anomalies;
        self.self_match_skips += report.self_match_skips;
        if report.cap_reached {
            self.capped_markets += 1;
        }
    }

    /// Record a market whose round was abandoned.
    pub fn add_failure(&mut self) {
        self.markets_failed += 1;
    }

    /// Round throughput in trades per second.
    pub fn trades_per_sec(&self) -> f64 {
        if self.duration_ns == 0 {
            return 0.0;
        }
        self.trades as f64 / (self.duration_ns as f64 / 1e9)
    }
}

/// Process-lifetime matcher metrics.
pub struct MatcherMetrics {
    pub rounds_completed: AtomicU64,
    pub markets_processed: AtomicU64,
    pub markets_failed: AtomicU64,
    pub trades_executed: AtomicU64,
    pub orders_filled: AtomicU64,
    pub wallet_rejections: AtomicU64,
    pub price_anomalies: AtomicU64,
    pub round_duration_ns: Mutex<LatencyTracker>,
    pub market_duration_ns: Mutex<LatencyTracker>,
}

impl MatcherMetrics {
    pub fn new() -> Self {
        Self {
            rounds_completed: AtomicU64::new(0),
            markets_processed: AtomicU64::new(0),
            markets_failed: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            orders_filled: AtomicU64::new(0),
            wallet_rejections: AtomicU64::new(0),
            price_anomalies: AtomicU64::new(0),
            round_duration_ns: Mutex::new(LatencyTracker::new(1000)),
            market_duration_ns: Mutex::new(LatencyTracker::new(1000)),
        }
    }

    /// Record one market's report.
    pub fn record_market(&self, report: &MarketRoundReport) {
        self.markets_processed.fetch_add(1, Ordering::Relaxed);
        self.trades_executed.fetch_add(report.trades, Ordering::Relaxed);
        self.orders_filled.fetch_add(report.orders_filled, Ordering::Relaxed);
        self.wallet_rejections
            .fetch_add(report.wallet_rejections, Ordering::Relaxed);
        self.price_anomalies
            .fetch_add(report.price_anomalies, Ordering::Relaxed);
        if let Ok(mut tracker) = self.market_duration_ns.lock() {
            tracker.record(report.total_ns);
        }
    }

    /// Record a completed round.
    pub fn record_round(&self, tally: &RoundTally) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        self.markets_failed
            .fetch_add(tally.markets_failed, Ordering::Relaxed);
        if let Ok(mut tracker) = self.round_duration_ns.lock() {
            tracker.record(tally.duration_ns);
        }
    }

    /// Check alert thresholds and generate alerts.
    pub fn check_thresholds(&self, thresholds: &AlertThresholds) -> Vec<Alert> {
        let mut alerts = Vec::new();

        let failed = self.markets_failed.load(Ordering::Relaxed);
        if failed > thresholds.max_markets_failed {
            alerts.push(Alert::new(
                AlertLevel::Critical,
                "markets_failed",
                format!("Markets failed: {} > threshold {}", failed, thresholds.max_markets_failed),
            ));
        }

        let rejections = self.wallet_rejections.load(Ordering::Relaxed);
        if rejections > thresholds.max_wallet_rejections {
            alerts.push(Alert::new(
                AlertLevel::Warning,
                "wallet_rejections",
                format!(
                    "Wallet rejections: {} > threshold {}",
                    rejections, thresholds.max_wallet_rejections
                ),
            ));
        }

        if let Ok(tracker) = self.market_duration_ns.lock() {
            if let Some(p99) = tracker.percentile(99) {
                if p99 > thresholds.max_market_p99_ns {
                    alerts.push(Alert::new(
                        AlertLevel::Warning,
                        "market_duration_p99",
                        format!(
                            "Market round p99: {}ns > threshold {}ns",
                            p99, thresholds.max_market_p99_ns
                        ),
                    ));
                }
            }
        }

        alerts
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("rounds_completed".to_string(), self.rounds_completed.load(Ordering::Relaxed));
        m.insert("markets_processed".to_string(), self.markets_processed.load(Ordering::Relaxed));
        m.insert("markets_failed".to_string(), self.markets_failed.load(Ordering::Relaxed));
        m.insert("trades_executed".to_string(), self.trades_executed.load(Ordering::Relaxed));
        m.insert("orders_filled".to_string(), self.orders_filled.load(Ordering::Relaxed));
        m.insert("wallet_rejections".to_string(), self.wallet_rejections.load(Ordering::Relaxed));
        m.insert("price_anomalies".to_string(), self.price_anomalies.load(Ordering::Relaxed));
        m
    }
}

impl Default for MatcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    /// Average latency.
    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as u64)
    }

    /// Number of samples recorded.
    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Configurable alert thresholds.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    /// Max abandoned market rounds before critical alert.
    pub max_markets_failed: u64,
    /// Max wallet rejections before alert.
    pub max_wallet_rejections: u64,
    /// Max per-market round p99 latency in nanoseconds.
    pub max_market_p99_ns: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_markets_failed: 10,
            max_wallet_rejections: 1000,
            max_market_p99_ns: 500_000_000, // 500ms
        }
    }
}
