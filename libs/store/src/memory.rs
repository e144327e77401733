//! In-memory reference store
//!
//! `BTreeMap`-keyed state behind one `RwLock`, giving deterministic
//! iteration and, because a unit of work holds the write lock for its
//! whole scope, select-for-update semantics for `lock_order`. A poisoned
//! lock surfaces as `StoreError::Unavailable`, the transient class the
//! scheduler retries on the next round.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use types::errors::StoreError;
use types::ids::{MarketSymbol, OrderId};
use types::market::Market;
use types::numeric::Price;
use types::order::{Order, OrderStatus, Side};
use types::trade::Trade;

use crate::dirty::DirtyMarkets;
use crate::traits::{MarketStore, MatchTxn, OrderStore, TradeStore, UnitOfWork};

#[derive(Debug, Default)]
struct StoreState {
    markets: BTreeMap<MarketSymbol, Market>,
    orders: BTreeMap<OrderId, Order>,
    trades: Vec<Trade>,
    next_order_seq: u64,
    next_trade_seq: u64,
}

/// In-memory store implementing the full repository surface.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    dirty: DirtyMarkets,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_dirty(DirtyMarkets::new())
    }

    /// Create a store sharing an externally owned dirty tracker.
    pub fn with_dirty(dirty: DirtyMarkets) -> Self {
        Self {
            state: RwLock::new(StoreState {
                next_order_seq: 1,
                next_trade_seq: 1,
                ..StoreState::default()
            }),
            dirty,
        }
    }

    /// Handle to the dirty tracker this store marks.
    pub fn dirty(&self) -> DirtyMarkets {
        self.dirty.clone()
    }

    /// Total number of trades ever committed.
    pub fn trade_count(&self) -> usize {
        self.read().map(|s| s.trades.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state.read().map_err(|_| StoreError::Unavailable {
            message: "store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state.write().map_err(|_| StoreError::Unavailable {
            message: "store lock poisoned".to_string(),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `candidate` has better matching priority than `best`:
/// better price, then earlier creation, then lower insertion sequence.
fn priority_better(candidate: &Order, best: &Order, side: Side) -> bool {
    if candidate.price != best.price {
        return match side {
            Side::Buy => candidate.price > best.price,
            Side::Sell => candidate.price < best.price,
        };
    }
    if candidate.created_at != best.created_at {
        return candidate.created_at < best.created_at;
    }
    candidate.seq < best.seq
}

fn is_standing(order: &Order, symbol: &MarketSymbol, side: Side, cutoff: i64) -> bool {
    order.symbol == *symbol
        && order.side == side
        && order.status == OrderStatus::Active
        && order.execution.rests_on_book()
        && order.created_at <= cutoff
}

impl OrderStore for MemoryStore {
    fn insert_order(&self, mut order: Order) -> Result<Order, StoreError> {
        let symbol = order.symbol.clone();
        {
            let mut state = self.write()?;
            order.seq = state.next_order_seq;
            state.next_order_seq += 1;
            state.orders.insert(order.order_id, order.clone());
        }
        self.dirty.mark(&symbol);
        Ok(order)
    }

    fn order(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.read()?.orders.get(order_id).cloned())
    }

    fn active_orders(
        &self,
        symbol: &MarketSymbol,
        side: Side,
        cutoff: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let state = self.read()?;
        Ok(state
            .orders
            .values()
            .filter(|o| is_standing(o, symbol, side, cutoff))
            .cloned()
            .collect())
    }

    fn best_order(
        &self,
        symbol: &MarketSymbol,
        side: Side,
        cutoff: i64,
        excluded: &BTreeSet<OrderId>,
    ) -> Result<Option<Order>, StoreError> {
        let state = self.read()?;
        let mut best: Option<&Order> = None;
        for order in state.orders.values() {
            if !is_standing(order, symbol, side, cutoff)
                || order.unfilled().is_zero()
                || excluded.contains(&order.order_id)
            {
                continue;
            }
            best = match best {
                Some(current) if !priority_better(order, current, side) => Some(current),
                _ => Some(order),
            };
        }
        Ok(best.cloned())
    }

    fn cancel_order(&self, order_id: &OrderId) -> Result<Order, StoreError> {
        let canceled = {
            let mut state = self.write()?;
            let order = state
                .orders
                .get_mut(order_id)
                .ok_or_else(|| StoreError::OrderNotFound {
                    order_id: order_id.to_string(),
                })?;
            order.cancel().map_err(|e| StoreError::Conflict {
                reason: e.to_string(),
            })?;
            order.clone()
        };
        self.dirty.mark(&canceled.symbol);
        Ok(canceled)
    }
}

impl TradeStore for MemoryStore {
    fn recent_trades(
        &self,
        symbol: &MarketSymbol,
        limit: usize,
    ) -> Result<Vec<Trade>, StoreError> {
        let state = self.read()?;
        Ok(state
            .trades
            .iter()
            .rev()
            .filter(|t| t.symbol == *symbol)
            .take(limit)
            .cloned()
            .collect())
    }

    fn last_trade_price(&self, symbol: &MarketSymbol) -> Result<Option<Price>, StoreError> {
        let state = self.read()?;
        Ok(state
            .trades
            .iter()
            .rev()
            .find(|t| t.symbol == *symbol)
            .map(|t| t.price))
    }
}

impl MarketStore for MemoryStore {
    fn upsert_market(&self, market: Market) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.markets.insert(market.symbol.clone(), market);
        Ok(())
    }

    fn market(&self, symbol: &MarketSymbol) -> Result<Option<Market>, StoreError> {
        Ok(self.read()?.markets.get(symbol).cloned())
    }

    fn active_markets(&self) -> Result<BTreeMap<MarketSymbol, Market>, StoreError> {
        let state = self.read()?;
        Ok(state
            .markets
            .iter()
            .filter(|(_, m)| m.is_active)
            .map(|(s, m)| (s.clone(), m.clone()))
            .collect())
    }
}

/// Transaction over the in-memory state: reads see staged writes,
/// nothing touches the store until `commit`.
pub struct MemoryTxn<'a> {
    state: &'a mut StoreState,
    staged_orders: BTreeMap<OrderId, Order>,
    staged_trades: Vec<Trade>,
}

impl MemoryTxn<'_> {
    /// Apply all staged mutations. Returns the symbols touched, for
    /// dirty marking after the lock is released.
    fn commit(self) -> BTreeSet<MarketSymbol> {
        let mut touched = BTreeSet::new();
        for (order_id, order) in self.staged_orders {
            touched.insert(order.symbol.clone());
            self.state.orders.insert(order_id, order);
        }
        for trade in self.staged_trades {
            touched.insert(trade.symbol.clone());
            self.state.next_trade_seq = trade.seq + 1;
            self.state.trades.push(trade);
        }
        touched
    }
}

impl MatchTxn for MemoryTxn<'_> {
    fn lock_order(&mut self, order_id: &OrderId) -> Result<Order, StoreError> {
        if let Some(staged) = self.staged_orders.get(order_id) {
            return Ok(staged.clone());
        }
        self.state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| StoreError::OrderNotFound {
                order_id: order_id.to_string(),
            })
    }

    fn update_order(&mut self, order: Order) -> Result<(), StoreError> {
        self.staged_orders.insert(order.order_id, order);
        Ok(())
    }

    fn insert_trade(&mut self, mut trade: Trade) -> Result<Trade, StoreError> {
        trade.seq = self.state.next_trade_seq + self.staged_trades.len() as u64;
        self.staged_trades.push(trade.clone());
        Ok(trade)
    }
}

impl UnitOfWork for MemoryStore {
    type Txn<'a>
        = MemoryTxn<'a>
    where
        Self: 'a;

    fn unit_of_work<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: for<'a> FnOnce(&mut Self::Txn<'a>) -> Result<T, E>,
    {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(E::from(StoreError::Unavailable {
                    message: "store lock poisoned".to_string(),
                }))
            }
        };

        let mut txn = MemoryTxn {
            state: &mut guard,
            staged_orders: BTreeMap::new(),
            staged_trades: Vec::new(),
        };

        match f(&mut txn) {
            Ok(value) => {
                let touched = txn.commit();
                drop(guard);
                for symbol in &touched {
                    self.dirty.mark(symbol);
                }
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}
