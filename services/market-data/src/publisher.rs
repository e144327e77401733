//! Change-gated ticker publication
//!
//! The generator publishes one `BookTicker` per market per round at
//! most; the `ChangeGate` suppresses publication entirely when nothing
//! the subscriber can see has changed, so idle markets produce zero
//! downstream traffic. Transport is a broadcast channel consumed by the
//! streaming infrastructure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use types::ids::MarketSymbol;
use types::numeric::Price;

/// Best-bid/ask and last-trade snapshot for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookTicker {
    pub symbol: MarketSymbol,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub last_trade_price: Option<Price>,
    pub updated_at: i64,
}

/// Destination for ticker publications.
pub trait BookPublisher: Send + Sync {
    fn publish(&self, ticker: BookTicker);
}

/// Publisher over a tokio broadcast channel.
///
/// Sends with no live subscriber are counted, not treated as errors:
/// the generator's output is best-effort for downstream consumers.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<BookTicker>,
    dropped: AtomicU64,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribe to the ticker stream.
    pub fn subscribe(&self) -> broadcast::Receiver<BookTicker> {
        self.tx.subscribe()
    }

    /// Publications dropped for lack of subscribers.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl BookPublisher for BroadcastPublisher {
    fn publish(&self, ticker: BookTicker) {
        if self.tx.send(ticker).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Ticker published with no subscribers");
        }
    }
}

/// Suppresses republication of unchanged tickers.
///
/// Tracks the last published (bid, ask, last trade) per market; a
/// ticker differing only in `updated_at` is a no-op.
#[derive(Debug, Default)]
pub struct ChangeGate {
    last: Mutex<BTreeMap<MarketSymbol, (Option<Price>, Option<Price>, Option<Price>)>>,
}

impl ChangeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this ticker differs from the last published one for its
    /// market. Updates the gate when it does.
    pub fn should_publish(&self, ticker: &BookTicker) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return true;
        };
        let current = (ticker.best_bid, ticker.best_ask, ticker.last_trade_price);
        match last.get(&ticker.symbol) {
            Some(previous) if *previous == current => false,
            _ => {
                last.insert(ticker.symbol.clone(), current);
                true
            }
        }
    }
}
