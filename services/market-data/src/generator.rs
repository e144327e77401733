//! Order book generator
//!
//! For every active market: build both book sides as of one cutoff,
//! net out the bid/ask overlap the matcher is about to consume, cache
//! the result, and publish the ticker only when it changed. Markets are
//! fanned out over the blocking pool; one market's failure is logged
//! and skipped without aborting the batch.
//!
//! Runs as its own independently scheduled loop, decoupled from the
//! matcher's rounds; both derive from the same persisted state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use store::traits::{MarketStore, OrderStore, TradeStore};
use types::errors::StoreError;
use types::market::Market;
use types::order::Side;

use crate::book::OrderBook;
use crate::cache::{BookCache, BookSideView};
use crate::metrics::GeneratorMetrics;
use crate::now_nanos;
use crate::overlap::resolve_overlap;
use crate::publisher::{BookPublisher, BookTicker, ChangeGate};

/// The per-round book generator over all active markets.
///
/// Cheap to clone: every part is shared, so per-market work can move a
/// clone onto the blocking pool.
pub struct OrderBookGenerator<S, P> {
    store: Arc<S>,
    cache: Arc<BookCache>,
    publisher: Arc<P>,
    gate: Arc<ChangeGate>,
    metrics: Arc<GeneratorMetrics>,
}

impl<S, P> Clone for OrderBookGenerator<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            publisher: self.publisher.clone(),
            gate: self.gate.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S, P> OrderBookGenerator<S, P>
where
    S: OrderStore + TradeStore + MarketStore + 'static,
    P: BookPublisher + 'static,
{
    pub fn new(
        store: Arc<S>,
        cache: Arc<BookCache>,
        publisher: Arc<P>,
        metrics: Arc<GeneratorMetrics>,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            gate: Arc::new(ChangeGate::new()),
            metrics,
        }
    }

    /// Build, cache, and maybe publish both sides of one market's book.
    pub fn generate_market(&self, market: &Market, now: i64) -> Result<(), StoreError> {
        let mut sell = OrderBook::build(self.store.as_ref(), market, Side::Sell, now)?;
        let mut buy = OrderBook::build(self.store.as_ref(), market, Side::Buy, now)?;
        resolve_overlap(&mut sell, &mut buy);

        let last_trade = self.store.last_trade_price(&market.symbol)?;

        for book in [&sell, &buy] {
            let view = BookSideView {
                symbol: market.symbol.clone(),
                side: book.side(),
                best_price: book.best_price(),
                best_active_price: book.best_active_price(),
                last_active_price: book.last_active_price(),
                last_trade_price: last_trade,
                levels: book.public_levels(),
                skips: book.skips(),
                updated_at: now,
            };
            let written = self.cache.store(view, now);
            self.metrics.record_cache_write(written);
        }
        self.metrics.record_books_built(2);

        let ticker = BookTicker {
            symbol: market.symbol.clone(),
            best_bid: buy.best_active_price(),
            best_ask: sell.best_active_price(),
            last_trade_price: last_trade,
            updated_at: now,
        };
        if self.gate.should_publish(&ticker) {
            self.publisher.publish(ticker);
            self.metrics.record_publish(true);
        } else {
            self.metrics.record_publish(false);
        }

        Ok(())
    }

    /// Generate books for every active market once. Returns how many
    /// markets completed.
    pub async fn run_once(&self) -> u64 {
        let markets = match self.store.active_markets() {
            Ok(markets) => markets,
            Err(e) => {
                warn!(error = %e, "Could not list active markets; retrying next pass");
                return 0;
            }
        };
        let now = now_nanos();

        let mut pool = JoinSet::new();
        for market in markets.into_values() {
            let generator = self.clone();
            pool.spawn_blocking(move || {
                let symbol = market.symbol.clone();
                (symbol, generator.generate_market(&market, now))
            });
        }

        let mut completed = 0;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok((_, Ok(()))) => completed += 1,
                Ok((symbol, Err(e))) => {
                    warn!(%symbol, error = %e, "Book generation failed; market skipped");
                    self.metrics.record_market_skipped();
                }
                Err(e) => {
                    warn!(error = %e, "Book generation task panicked");
                    self.metrics.record_market_skipped();
                }
            }
        }
        completed
    }

    /// Generate on a fixed cadence until shutdown is requested.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(version = crate::SERVICE_VERSION, "Book generator starting");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let completed = self.run_once().await;
            debug!(markets = completed, "Book generation pass complete");

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("Book generator stopped");
    }
}
