//! Concurrent matcher scheduler
//!
//! The long-lived control loop. Each round: check the kill switch,
//! decide whether this is a full pass or a dirty-only pass, partition
//! the selected markets, run partition 0 (isolated markets) to
//! completion in its own task, fan the remaining partitions out over
//! the blocking worker pool, join them all (round barrier), aggregate
//! metrics, and sleep until the next round.
//!
//! Post-round work that must not block matching (recomputing per-market
//! price ranges) is dispatched to a second, bounded set of blocking
//! tasks and joined at the start of the *next* round.
//!
//! Per-market failures never escape their partition loop; a panic
//! inside a partition is contained at the join point. Shutdown is
//! cooperative: the in-flight round always finishes.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use store::traits::MatchStore;
use store::DirtyMarkets;
use types::ids::MarketSymbol;
use types::market::Market;
use types::numeric::Price;

use crate::alerts::{Alert, AlertLevel, AlertSink};
use crate::config::MatcherConfig;
use crate::fees::FeeSchedule;
use crate::matcher::{MarketRoundReport, Matcher};
use crate::now_nanos;
use crate::partition::partition_markets;
use crate::rounds::{AlertThresholds, MatcherMetrics, RoundTally};
use crate::wallet::WalletGateway;

/// Recent price range for one market, recomputed after its trades.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRange {
    pub low: Price,
    pub high: Price,
    pub last: Price,
    pub computed_at: i64,
}

/// Shared post-processing output: the scheduler's post-round tasks
/// write, any other holder of the handle reads.
#[derive(Debug, Clone, Default)]
pub struct PriceRangeCache {
    inner: Arc<RwLock<BTreeMap<MarketSymbol, PriceRange>>>,
}

impl PriceRangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &MarketSymbol) -> Option<PriceRange> {
        self.inner.read().ok().and_then(|m| m.get(symbol).cloned())
    }

    fn put(&self, symbol: MarketSymbol, range: PriceRange) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(symbol, range);
        }
    }
}

/// External control surface for a running scheduler.
pub struct SchedulerHandle {
    enabled: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
}

impl SchedulerHandle {
    /// Flip the kill switch. While disabled the scheduler idles without
    /// processing; no orders are touched.
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.enabled.send(enabled);
    }

    /// Request a graceful stop: the in-flight round finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Result of one partition's sequential market loop.
struct PartitionOutcome {
    reports: Vec<MarketRoundReport>,
    failures: u64,
}

/// The top-level matching control loop.
pub struct ConcurrentMatcherScheduler<S, W, F> {
    store: Arc<S>,
    matcher: Arc<Matcher<S, W, F>>,
    dirty: DirtyMarkets,
    config: MatcherConfig,
    metrics: Arc<MatcherMetrics>,
    alerts: Arc<dyn AlertSink>,
    thresholds: AlertThresholds,
    price_ranges: PriceRangeCache,
    enabled: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
    round: u64,
    pending_post: Vec<JoinHandle<()>>,
}

impl<S, W, F> ConcurrentMatcherScheduler<S, W, F>
where
    S: MatchStore + 'static,
    W: WalletGateway + 'static,
    F: FeeSchedule + 'static,
{
    pub fn new(
        store: Arc<S>,
        matcher: Arc<Matcher<S, W, F>>,
        dirty: DirtyMarkets,
        config: MatcherConfig,
        metrics: Arc<MatcherMetrics>,
        alerts: Arc<dyn AlertSink>,
    ) -> (Self, SchedulerHandle) {
        let (enabled_tx, enabled_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = Self {
            store,
            matcher,
            dirty,
            config,
            metrics,
            alerts,
            thresholds: AlertThresholds::default(),
            price_ranges: PriceRangeCache::new(),
            enabled: enabled_rx,
            shutdown: shutdown_rx,
            round: 0,
            pending_post: Vec::new(),
        };
        let handle = SchedulerHandle {
            enabled: enabled_tx,
            shutdown: shutdown_tx,
        };
        (scheduler, handle)
    }

    /// Handle to the shared post-processing output.
    pub fn price_ranges(&self) -> PriceRangeCache {
        self.price_ranges.clone()
    }

    /// Run rounds until shutdown is requested.
    pub async fn run(mut self) {
        info!(version = crate::SERVICE_VERSION, "Matcher scheduler starting");
        self.alerts.notify(Alert::new(
            AlertLevel::Info,
            "lifecycle",
            "matcher scheduler started",
        ));

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if !*self.enabled.borrow() {
                debug!("Matching disabled by kill switch; idling");
                self.sleep_round().await;
                continue;
            }

            let tally = self.run_round().await;
            debug!(round = tally.round, "Round tally folded");

            if *self.shutdown.borrow() {
                break;
            }
            self.sleep_round().await;
        }

        // Never exit with post-processing in flight.
        for handle in self.pending_post.drain(..) {
            let _ = handle.await;
        }

        let exported = self.metrics.export();
        info!(
            rounds = exported.get("rounds_completed").copied().unwrap_or(0),
            trades = exported.get("trades_executed").copied().unwrap_or(0),
            markets_failed = exported.get("markets_failed").copied().unwrap_or(0),
            "Matcher scheduler stopped"
        );
        self.alerts.notify(Alert::new(
            AlertLevel::Info,
            "lifecycle",
            "matcher scheduler stopped",
        ));
    }

    /// Execute one scheduling round. Public so tests can drive rounds
    /// without the loop's pacing.
    pub async fn run_round(&mut self) -> RoundTally {
        self.round += 1;
        let mut tally = RoundTally::new(self.round);
        let started = Instant::now();

        // Join post-processing pipelined from the previous round.
        for handle in self.pending_post.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Post-processing task failed");
            }
        }

        let markets = match self.store.active_markets() {
            Ok(markets) => markets,
            Err(e) => {
                warn!(error = %e, "Could not list active markets; retrying next round");
                return tally;
            }
        };

        let full_pass = self.round == 1
            || (self.config.full_pass_every > 0 && self.round % self.config.full_pass_every == 0);
        let selected: BTreeMap<MarketSymbol, Market> = if full_pass {
            self.dirty.drain();
            markets
        } else {
            let dirty = self.dirty.drain();
            markets
                .into_iter()
                .filter(|(symbol, _)| dirty.contains(symbol))
                .collect()
        };

        if selected.is_empty() {
            tally.duration_ns = started.elapsed().as_nanos() as u64;
            self.metrics.record_round(&tally);
            return tally;
        }

        let cutoff = now_nanos();
        let mut partitions = partition_markets(&selected, self.config.workers);
        let mut processed: Vec<MarketSymbol> = Vec::new();

        // Isolated markets complete before the pool starts, so they
        // never run concurrently with anything.
        let isolated = std::mem::take(&mut partitions[0]);
        if !isolated.is_empty() {
            let outcome = self.spawn_partition(isolated, cutoff).await;
            self.fold_outcome(outcome, &mut tally, &mut processed);
        }

        let mut pool: JoinSet<PartitionOutcome> = JoinSet::new();
        for partition in partitions.into_iter().skip(1).filter(|p| !p.is_empty()) {
            let store = self.store.clone();
            let matcher = self.matcher.clone();
            let metrics = self.metrics.clone();
            let alerts = self.alerts.clone();
            pool.spawn_blocking(move || {
                run_partition(store, matcher, metrics, alerts, partition, cutoff)
            });
        }

        // Round barrier: no aggregation until every partition is done.
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(outcome) => self.fold_outcome(outcome, &mut tally, &mut processed),
                Err(e) => {
                    tally.add_failure();
                    error!(error = %e, "Partition worker panicked; round continues");
                    self.alerts.notify(Alert::new(
                        AlertLevel::Critical,
                        "partition_panic",
                        format!("partition worker panicked: {e}"),
                    ));
                }
            }
        }

        self.dispatch_post_processing(&processed).await;

        tally.duration_ns = started.elapsed().as_nanos() as u64;
        self.metrics.record_round(&tally);

        for alert in self.metrics.check_thresholds(&self.thresholds) {
            self.alerts.notify(alert);
        }

        info!(
            round = tally.round,
            markets = tally.markets_processed,
            failed = tally.markets_failed,
            trades = tally.trades,
            wallet_rejections = tally.wallet_rejections,
            duration_ms = tally.duration_ns / 1_000_000,
            trades_per_sec = %format!("{:.1}", tally.trades_per_sec()),
            "Matching round complete"
        );

        tally
    }

    async fn spawn_partition(
        &self,
        symbols: Vec<MarketSymbol>,
        cutoff: i64,
    ) -> PartitionOutcome {
        let store = self.store.clone();
        let matcher = self.matcher.clone();
        let metrics = self.metrics.clone();
        let alerts = self.alerts.clone();
        match tokio::task::spawn_blocking(move || {
            run_partition(store, matcher, metrics, alerts, symbols, cutoff)
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Isolated partition panicked");
                PartitionOutcome {
                    reports: Vec::new(),
                    failures: 1,
                }
            }
        }
    }

    fn fold_outcome(
        &self,
        outcome: PartitionOutcome,
        tally: &mut RoundTally,
        processed: &mut Vec<MarketSymbol>,
    ) {
        for report in &outcome.reports {
            tally.add_report(report);
            processed.push(report.symbol.clone());
        }
        for _ in 0..outcome.failures {
            tally.add_failure();
        }
    }

    /// Queue price-range recomputation for every processed market on
    /// the post-processing pool, keeping at most `post_queue_depth`
    /// tasks in flight.
    async fn dispatch_post_processing(&mut self, processed: &[MarketSymbol]) {
        for symbol in processed {
            if self.pending_post.len() >= self.config.post_queue_depth {
                if let Err(e) = self.pending_post.remove(0).await {
                    warn!(error = %e, "Post-processing task failed");
                }
            }

            let store = self.store.clone();
            let ranges = self.price_ranges.clone();
            let symbol = symbol.clone();
            self.pending_post.push(tokio::task::spawn_blocking(move || {
                recompute_price_range(&*store, &ranges, &symbol);
            }));
        }
    }

    async fn sleep_round(&mut self) {
        let interval = self.config.round_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = self.shutdown.changed() => {}
        }
    }
}

/// Sequentially match every market in one partition. All per-market
/// failures are contained here: logged, alerted, counted, and the loop
/// moves to the next market.
fn run_partition<S, W, F>(
    store: Arc<S>,
    matcher: Arc<Matcher<S, W, F>>,
    metrics: Arc<MatcherMetrics>,
    alerts: Arc<dyn AlertSink>,
    symbols: Vec<MarketSymbol>,
    cutoff: i64,
) -> PartitionOutcome
where
    S: MatchStore,
    W: WalletGateway,
    F: FeeSchedule,
{
    let mut outcome = PartitionOutcome {
        reports: Vec::new(),
        failures: 0,
    };

    for symbol in symbols {
        let market = match store.market(&symbol) {
            Ok(Some(market)) => market,
            Ok(None) => {
                warn!(%symbol, "Market row missing; skipping");
                continue;
            }
            Err(e) => {
                warn!(%symbol, error = %e, "Market lookup failed; retrying next round");
                outcome.failures += 1;
                continue;
            }
        };

        match matcher.run_market(&market, cutoff) {
            Ok(report) => {
                metrics.record_market(&report);
                outcome.reports.push(report);
            }
            Err(e) => {
                outcome.failures += 1;
                error!(%symbol, error = %e, "Market round abandoned");
                alerts.notify(Alert::new(
                    AlertLevel::Critical,
                    "market_failed",
                    format!("{symbol}: {e}"),
                ));
            }
        }
    }

    outcome
}

/// Recompute the recent price range for one market from its trades.
fn recompute_price_range<S: MatchStore>(
    store: &S,
    ranges: &PriceRangeCache,
    symbol: &MarketSymbol,
) {
    let trades = match store.recent_trades(symbol, 100) {
        Ok(trades) => trades,
        Err(e) => {
            warn!(%symbol, error = %e, "Price range recomputation failed");
            return;
        }
    };
    let Some(last) = trades.first() else {
        return;
    };

    let mut low = last.price;
    let mut high = last.price;
    for trade in &trades {
        if trade.price < low {
            low = trade.price;
        }
        if trade.price > high {
            high = trade.price;
        }
    }

    ranges.put(
        symbol.clone(),
        PriceRange {
            low,
            high,
            last: last.price,
            computed_at: now_nanos(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use store::traits::{MarketStore, OrderStore};
    use store::MemoryStore;
    use types::ids::AccountId;
    use types::numeric::Quantity;
    use types::order::{Order, Side};

    use crate::alerts::RecordingAlertSink;
    use crate::fees::FlatFeeSchedule;
    use crate::matcher::MatcherSettings;
    use crate::wallet::MemoryWallet;

    const T0: i64 = 1_708_123_456_789_000_000;

    type TestScheduler =
        ConcurrentMatcherScheduler<MemoryStore, MemoryWallet, FlatFeeSchedule>;

    struct Fixture {
        store: Arc<MemoryStore>,
        wallet: Arc<MemoryWallet>,
        alerts: Arc<RecordingAlertSink>,
        scheduler: TestScheduler,
        handle: SchedulerHandle,
    }

    fn fixture(config: MatcherConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let wallet = Arc::new(MemoryWallet::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let matcher = Arc::new(Matcher::new(
            store.clone(),
            wallet.clone(),
            Arc::new(FlatFeeSchedule::default()),
            MatcherSettings::default(),
        ));
        let dirty = store.dirty();
        let (scheduler, handle) = ConcurrentMatcherScheduler::new(
            store.clone(),
            matcher,
            dirty,
            config,
            Arc::new(MatcherMetrics::new()),
            alerts.clone(),
        );
        Fixture {
            store,
            wallet,
            alerts,
            scheduler,
            handle,
        }
    }

    fn fast_config() -> MatcherConfig {
        MatcherConfig {
            round_interval: Duration::from_millis(5),
            ..MatcherConfig::default()
        }
    }

    fn funded(wallet: &MemoryWallet) -> AccountId {
        let account = AccountId::new();
        wallet.deposit(account, "USDT", Decimal::from(10_000_000));
        wallet.deposit(account, "BTC", Decimal::from(1_000));
        wallet.deposit(account, "ETH", Decimal::from(10_000));
        account
    }

    fn seed_market(store: &MemoryStore, symbol: &str) {
        store
            .upsert_market(Market::new(MarketSymbol::new(symbol), 2, 8))
            .unwrap();
    }

    fn seed_cross(store: &MemoryStore, wallet: &MemoryWallet, symbol: &str, price: u64) {
        let a = funded(wallet);
        let b = funded(wallet);
        let symbol = MarketSymbol::new(symbol);
        store
            .insert_order(Order::limit(
                a,
                symbol.clone(),
                Side::Sell,
                Price::from_u64(price),
                Quantity::from_str("1.0").unwrap(),
                T0,
            ))
            .unwrap();
        store
            .insert_order(Order::limit(
                b,
                symbol,
                Side::Buy,
                Price::from_u64(price),
                Quantity::from_str("1.0").unwrap(),
                T0 + 1,
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_round_is_a_full_pass() {
        let mut f = fixture(fast_config());
        seed_market(&f.store, "BTC/USDT");
        seed_market(&f.store, "ETH/USDT");
        seed_cross(&f.store, &f.wallet, "BTC/USDT", 50000);
        seed_cross(&f.store, &f.wallet, "ETH/USDT", 3000);

        let tally = f.scheduler.run_round().await;
        assert_eq!(tally.markets_processed, 2);
        assert_eq!(tally.trades, 2);
        assert_eq!(f.store.trade_count(), 2);
    }

    #[tokio::test]
    async fn test_dirty_only_rounds_between_full_passes() {
        let config = MatcherConfig {
            full_pass_every: 1000,
            ..fast_config()
        };
        let mut f = fixture(config);
        seed_market(&f.store, "BTC/USDT");
        seed_market(&f.store, "ETH/USDT");
        seed_cross(&f.store, &f.wallet, "BTC/USDT", 50000);

        // Round 1: full pass
        let tally = f.scheduler.run_round().await;
        assert_eq!(tally.markets_processed, 2);

        // Round 2: nothing marked dirty besides BTC's own trade mark
        let tally = f.scheduler.run_round().await;
        assert!(tally.markets_processed <= 1, "idle markets are skipped");

        // New ETH orders mark ETH dirty; only it is processed
        let trades_before = f.store.trade_count();
        seed_cross(&f.store, &f.wallet, "ETH/USDT", 3000);
        let tally = f.scheduler.run_round().await;
        assert_eq!(tally.markets_processed, 1);
        assert_eq!(f.store.trade_count(), trades_before + 1);
    }

    #[tokio::test]
    async fn test_inactive_market_not_processed() {
        let mut f = fixture(fast_config());
        seed_market(&f.store, "BTC/USDT");
        seed_cross(&f.store, &f.wallet, "BTC/USDT", 50000);
        // ETH orders exist but the ETH market is paused
        seed_cross(&f.store, &f.wallet, "ETH/USDT", 3000);
        f.store
            .upsert_market({
                let mut m = Market::new(MarketSymbol::new("ETH/USDT"), 2, 8);
                m.is_active = false;
                m
            })
            .unwrap();

        let tally = f.scheduler.run_round().await;
        assert_eq!(tally.markets_processed, 1);
        assert_eq!(tally.markets_failed, 0);
    }

    #[tokio::test]
    async fn test_post_processing_fills_price_ranges() {
        let mut f = fixture(fast_config());
        seed_market(&f.store, "BTC/USDT");
        seed_cross(&f.store, &f.wallet, "BTC/USDT", 50000);
        let ranges = f.scheduler.price_ranges();

        f.scheduler.run_round().await;
        // Post-processing is pipelined: joined at the start of the next round
        f.scheduler.run_round().await;

        let range = ranges.get(&MarketSymbol::new("BTC/USDT")).unwrap();
        assert_eq!(range.last, Price::from_u64(50000));
        assert_eq!(range.low, Price::from_u64(50000));
        assert_eq!(range.high, Price::from_u64(50000));
    }

    #[tokio::test]
    async fn test_kill_switch_idles_without_processing() {
        let mut config = fast_config();
        config.round_interval = Duration::from_millis(2);
        let f = fixture(config);
        seed_market(&f.store, "BTC/USDT");
        seed_cross(&f.store, &f.wallet, "BTC/USDT", 50000);

        f.handle.set_enabled(false);
        let store = f.store.clone();
        let handle = f.handle;
        let task = tokio::spawn(f.scheduler.run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.trade_count(), 0, "disabled scheduler must not match");

        handle.set_enabled(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.trade_count(), 1);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_graceful_shutdown_emits_lifecycle_alerts() {
        let f = fixture(fast_config());
        seed_market(&f.store, "BTC/USDT");

        let alerts = f.alerts.clone();
        let handle = f.handle;
        let task = tokio::spawn(f.scheduler.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();
        task.await.unwrap();

        let messages: Vec<String> = alerts.alerts().iter().map(|a| a.message.clone()).collect();
        assert!(messages.iter().any(|m| m.contains("started")));
        assert!(messages.iter().any(|m| m.contains("stopped")));
    }
}
