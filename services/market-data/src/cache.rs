//! TTL-bounded book cache
//!
//! Per-market-per-side cache of the derived book view. The cache is
//! advisory, never authoritative: every value is a performance
//! optimization over rebuilding from the store. Writes are suppressed
//! when the view is unchanged and the entry is not close to expiry,
//! bounding write volume under high-frequency, low-change conditions.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use types::ids::MarketSymbol;
use types::numeric::Price;
use types::order::Side;

use crate::book::BookLevel;

/// The cached view of one side of one market's book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSideView {
    pub symbol: MarketSymbol,
    pub side: Side,
    pub best_price: Option<Price>,
    pub best_active_price: Option<Price>,
    pub last_active_price: Option<Price>,
    pub last_trade_price: Option<Price>,
    pub levels: Vec<BookLevel>,
    pub skips: usize,
    pub updated_at: i64,
}

impl BookSideView {
    /// Whether two views show the same book (timestamps ignored).
    fn same_view(&self, other: &BookSideView) -> bool {
        self.best_price == other.best_price
            && self.best_active_price == other.best_active_price
            && self.last_active_price == other.last_active_price
            && self.last_trade_price == other.last_trade_price
            && self.levels == other.levels
            && self.skips == other.skips
    }
}

#[derive(Debug, Clone)]
struct CacheSlot {
    view: BookSideView,
    expires_at: i64,
}

/// TTL cache of book views keyed by market symbol and side.
pub struct BookCache {
    ttl_ns: i64,
    refresh_margin_ns: i64,
    entries: Mutex<BTreeMap<(MarketSymbol, Side), CacheSlot>>,
}

impl BookCache {
    /// `ttl` bounds entry lifetime; entries within `refresh_margin` of
    /// expiry are rewritten even when unchanged.
    pub fn new(ttl: Duration, refresh_margin: Duration) -> Self {
        Self {
            ttl_ns: ttl.as_nanos() as i64,
            refresh_margin_ns: refresh_margin.as_nanos() as i64,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Store a view unless an identical, not-near-expiry entry already
    /// exists. Returns whether a write happened.
    pub fn store(&self, view: BookSideView, now: i64) -> bool {
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let key = (view.symbol.clone(), view.side);

        if let Some(slot) = entries.get(&key) {
            let near_expiry = now + self.refresh_margin_ns >= slot.expires_at;
            if slot.view.same_view(&view) && !near_expiry {
                return false;
            }
        }

        entries.insert(
            key,
            CacheSlot {
                view,
                expires_at: now + self.ttl_ns,
            },
        );
        true
    }

    /// Fetch a live (non-expired) entry.
    pub fn get(&self, symbol: &MarketSymbol, side: Side, now: i64) -> Option<BookSideView> {
        let entries = self.entries.lock().ok()?;
        let slot = entries.get(&(symbol.clone(), side))?;
        if now >= slot.expires_at {
            return None;
        }
        Some(slot.view.clone())
    }

    /// Number of cached entries, expired included.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
