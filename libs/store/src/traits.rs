//! Repository interfaces and the scoped unit of work
//!
//! The matching and book logic is storage-agnostic: everything it needs
//! from persistence is expressed here. Queries take an explicit cutoff
//! timestamp so a whole matching round observes one point-in-time view.

use std::collections::{BTreeMap, BTreeSet};

use types::errors::StoreError;
use types::ids::{MarketSymbol, OrderId};
use types::market::Market;
use types::numeric::Price;
use types::order::{Order, Side};
use types::trade::Trade;

/// Order persistence.
pub trait OrderStore: Send + Sync {
    /// Insert a new order, assigning its insertion sequence number.
    /// Returns the stored row.
    fn insert_order(&self, order: Order) -> Result<Order, StoreError>;

    /// Fetch a single order by id.
    fn order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// All active book-resting orders for one market side created at or
    /// before `cutoff`. Market-execution and untriggered stop orders are
    /// excluded. Iteration order is unspecified.
    fn active_orders(
        &self,
        symbol: &MarketSymbol,
        side: Side,
        cutoff: i64,
    ) -> Result<Vec<Order>, StoreError>;

    /// The highest-priority standing order for one market side:
    /// best price first (highest for buy, lowest for sell), then earliest
    /// `created_at`, then lowest `seq`. Orders in `excluded` are skipped.
    fn best_order(
        &self,
        symbol: &MarketSymbol,
        side: Side,
        cutoff: i64,
        excluded: &BTreeSet<OrderId>,
    ) -> Result<Option<Order>, StoreError>;

    /// Cancel an active order. Fails with `Conflict` if the order is
    /// already terminal.
    fn cancel_order(&self, order_id: &OrderId) -> Result<Order, StoreError>;
}

/// Trade persistence. Trades are append-only.
pub trait TradeStore: Send + Sync {
    /// Most recent trades for a market, newest first.
    fn recent_trades(&self, symbol: &MarketSymbol, limit: usize)
        -> Result<Vec<Trade>, StoreError>;

    /// Price of the market's most recent trade, if any.
    fn last_trade_price(&self, symbol: &MarketSymbol) -> Result<Option<Price>, StoreError>;
}

/// Market configuration rows.
pub trait MarketStore: Send + Sync {
    /// Insert or replace a market row.
    fn upsert_market(&self, market: Market) -> Result<(), StoreError>;

    /// Fetch one market by symbol.
    fn market(&self, symbol: &MarketSymbol) -> Result<Option<Market>, StoreError>;

    /// All markets with `is_active`, keyed by symbol (sorted).
    fn active_markets(&self) -> Result<BTreeMap<MarketSymbol, Market>, StoreError>;
}

/// Mutation handle inside one unit of work.
///
/// `lock_order` re-reads the current row with select-for-update
/// semantics: no concurrent writer can touch it until the unit of work
/// commits or rolls back.
pub trait MatchTxn {
    /// Re-read an order under lock.
    fn lock_order(&mut self, order_id: &OrderId) -> Result<Order, StoreError>;

    /// Stage an order update. Applied only on commit.
    fn update_order(&mut self, order: Order) -> Result<(), StoreError>;

    /// Stage a trade insert, assigning its sequence number.
    /// Returns the row as it will be stored.
    fn insert_trade(&mut self, trade: Trade) -> Result<Trade, StoreError>;
}

/// Scoped unit of work: run a closure under a transaction.
///
/// If the closure returns `Ok`, all staged mutations are applied
/// atomically; any `Err` discards them entirely. There is no partial
/// commit path.
pub trait UnitOfWork: Send + Sync {
    type Txn<'a>: MatchTxn
    where
        Self: 'a;

    fn unit_of_work<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: for<'a> FnOnce(&mut Self::Txn<'a>) -> Result<T, E>;
}

/// Everything the matcher needs from storage.
pub trait MatchStore: OrderStore + TradeStore + MarketStore + UnitOfWork {}

impl<S: OrderStore + TradeStore + MarketStore + UnitOfWork> MatchStore for S {}
