//! Aggregated one-side order book builder
//!
//! Builds, for one market and one side, the price-sorted list of levels
//! representing currently unfilled limit-order quantity as of a cutoff
//! timestamp. A pure projection over store state: two builds with the
//! same cutoff and no intervening mutation produce identical output.
//!
//! Prices are grouped after rounding to the market's price scale, so
//! orders that quantize to the same price share a level.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use store::traits::OrderStore;
use types::errors::StoreError;
use types::ids::MarketSymbol;
use types::market::Market;
use types::numeric::Price;
use types::order::{Order, Side};

/// Public depth cap: price levels exposed to consumers.
pub const MAX_BOOK_ITEMS: usize = 20;

/// Internal working set: orders considered when building one side.
pub const MAX_ACTIVE_ORDERS: usize = 1000;

/// Cumulative order count at which a market stops being "small";
/// `last_active_price` reports the level where this is first reached.
pub const SMALL_MARKET_ORDER_COUNT: u32 = 10;

/// One aggregated price level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    /// Total unfilled amount at this level. Zeroed (not removed) when
    /// the skip-match step consumes the level.
    pub amount: Decimal,
    pub order_count: u32,
}

/// The aggregated book for one side of one market at one instant.
///
/// Levels are sorted by matching priority: ascending price for sell
/// (best ask first), descending for buy (best bid first).
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: MarketSymbol,
    side: Side,
    cutoff: i64,
    pub(crate) levels: Vec<BookLevel>,
    /// Levels fully consumed by skip-match.
    pub(crate) skips: usize,
    /// Whether skip-match found any overlap on this side.
    pub(crate) has_match: bool,
}

impl OrderBook {
    /// Build the book from active orders created at or before `cutoff`.
    pub fn build<S: OrderStore>(
        store: &S,
        market: &Market,
        side: Side,
        cutoff: i64,
    ) -> Result<Self, StoreError> {
        let mut orders = store.active_orders(&market.symbol, side, cutoff)?;

        // Matching priority: best price first, then age, then sequence.
        orders.sort_by(|a, b| {
            let price_order = match side {
                Side::Sell => a.price.cmp(&b.price),
                Side::Buy => b.price.cmp(&a.price),
            };
            price_order
                .then(a.created_at.cmp(&b.created_at))
                .then(a.seq.cmp(&b.seq))
        });
        orders.truncate(MAX_ACTIVE_ORDERS);

        let mut levels: Vec<BookLevel> = Vec::new();
        for order in &orders {
            let price = market.quantize_price(order.price);
            let unfilled = unfilled_amount(order);
            match levels.last_mut() {
                Some(level) if level.price == price => {
                    level.amount += unfilled;
                    level.order_count += 1;
                }
                _ => levels.push(BookLevel {
                    price,
                    amount: unfilled,
                    order_count: 1,
                }),
            }
        }

        Ok(Self {
            symbol: market.symbol.clone(),
            side,
            cutoff,
            levels,
            skips: 0,
            has_match: false,
        })
    }

    pub fn symbol(&self) -> &MarketSymbol {
        &self.symbol
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn cutoff(&self) -> i64 {
        self.cutoff
    }

    /// Top-of-book price ignoring skip-match consumption.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.first().map(|level| level.price)
    }

    /// Top-of-book price after skip-match: the first level with
    /// residual amount.
    pub fn best_active_price(&self) -> Option<Price> {
        self.levels
            .iter()
            .find(|level| level.amount > Decimal::ZERO)
            .map(|level| level.price)
    }

    /// The price at which cumulative order count first reaches the
    /// small-market threshold, if it does at all.
    pub fn last_active_price(&self) -> Option<Price> {
        let mut cumulative = 0u32;
        for level in &self.levels {
            cumulative += level.order_count;
            if cumulative >= SMALL_MARKET_ORDER_COUNT {
                return Some(level.price);
            }
        }
        None
    }

    /// Levels ready for external consumption: skip-consumed levels are
    /// hidden and depth is capped.
    pub fn public_levels(&self) -> Vec<BookLevel> {
        self.levels
            .iter()
            .filter(|level| level.amount > Decimal::ZERO)
            .take(MAX_BOOK_ITEMS)
            .cloned()
            .collect()
    }

    /// All levels including skip-consumed ones, best first.
    pub fn levels(&self) -> &[BookLevel] {
        &self.levels
    }

    /// Levels fully consumed by the skip-match step.
    pub fn skips(&self) -> usize {
        self.skips
    }

    /// Whether the skip-match step found overlap on this side.
    pub fn has_match(&self) -> bool {
        self.has_match
    }
}

fn unfilled_amount(order: &Order) -> Decimal {
    order.amount.as_decimal() - order.matched_amount.as_decimal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::traits::{MatchTxn, UnitOfWork};
    use store::MemoryStore;
    use types::errors::StoreError;
    use types::ids::AccountId;
    use types::numeric::Quantity;

    const T0: i64 = 1_708_123_456_789_000_000;

    fn btc_market() -> Market {
        Market::new(MarketSymbol::new("BTC/USDT"), 2, 8)
    }

    fn place(store: &MemoryStore, side: Side, price: &str, amount: &str, created_at: i64) -> Order {
        store
            .insert_order(Order::limit(
                AccountId::new(),
                MarketSymbol::new("BTC/USDT"),
                side,
                Price::from_str(price).unwrap(),
                Quantity::from_str(amount).unwrap(),
                created_at,
            ))
            .unwrap()
    }

    #[test]
    fn test_empty_book() {
        let store = MemoryStore::new();
        let book = OrderBook::build(&store, &btc_market(), Side::Sell, T0).unwrap();
        assert!(book.levels().is_empty());
        assert!(book.best_price().is_none());
        assert!(book.public_levels().is_empty());
    }

    #[test]
    fn test_sell_side_sorted_ascending() {
        let store = MemoryStore::new();
        place(&store, Side::Sell, "102", "1.0", T0);
        place(&store, Side::Sell, "100", "2.0", T0);
        place(&store, Side::Sell, "101", "3.0", T0);

        let book = OrderBook::build(&store, &btc_market(), Side::Sell, T0).unwrap();
        let prices: Vec<String> = book.levels().iter().map(|l| l.price.to_string()).collect();
        assert_eq!(prices, vec!["100", "101", "102"]);
        assert_eq!(book.best_price(), Some(Price::from_u64(100)));
    }

    #[test]
    fn test_buy_side_sorted_descending() {
        let store = MemoryStore::new();
        place(&store, Side::Buy, "98", "1.0", T0);
        place(&store, Side::Buy, "100", "2.0", T0);
        place(&store, Side::Buy, "99", "3.0", T0);

        let book = OrderBook::build(&store, &btc_market(), Side::Buy, T0).unwrap();
        let prices: Vec<String> = book.levels().iter().map(|l| l.price.to_string()).collect();
        assert_eq!(prices, vec!["100", "99", "98"]);
        assert_eq!(book.best_price(), Some(Price::from_u64(100)));
    }

    #[test]
    fn test_price_rounding_merges_levels() {
        let store = MemoryStore::new();
        // Both quantize to 100.00 at scale 2
        place(&store, Side::Sell, "100.001", "1.0", T0);
        place(&store, Side::Sell, "100.004", "2.0", T0);

        let book = OrderBook::build(&store, &btc_market(), Side::Sell, T0).unwrap();
        assert_eq!(book.levels().len(), 1);
        assert_eq!(book.levels()[0].amount, Decimal::from(3));
        assert_eq!(book.levels()[0].order_count, 2);
    }

    #[test]
    fn test_unfilled_amounts_aggregated() {
        let store = MemoryStore::new();
        let order = place(&store, Side::Sell, "100", "5.0", T0);

        // Fill 2.0 of the 5.0 through a unit of work
        store
            .unit_of_work::<_, StoreError, _>(|txn| {
                let mut row = txn.lock_order(&order.order_id)?;
                row.apply_fill(
                    Quantity::from_str("2.0").unwrap(),
                    Decimal::from(200),
                    Decimal::ZERO,
                )
                .map_err(|e| StoreError::Conflict {
                    reason: e.to_string(),
                })?;
                txn.update_order(row)?;
                Ok(())
            })
            .unwrap();

        let book = OrderBook::build(&store, &btc_market(), Side::Sell, T0).unwrap();
        assert_eq!(book.levels()[0].amount, Decimal::from(3));
    }

    #[test]
    fn test_cutoff_excludes_later_orders() {
        let store = MemoryStore::new();
        place(&store, Side::Sell, "100", "1.0", T0);
        place(&store, Side::Sell, "99", "1.0", T0 + 100);

        let book = OrderBook::build(&store, &btc_market(), Side::Sell, T0).unwrap();
        assert_eq!(book.levels().len(), 1);
        assert_eq!(book.best_price(), Some(Price::from_u64(100)));
    }

    #[test]
    fn test_idempotent_at_fixed_cutoff() {
        let store = MemoryStore::new();
        for i in 0..20 {
            place(&store, Side::Sell, "100", "1.0", T0 + i);
            place(&store, Side::Sell, "101", "0.5", T0 + i);
        }

        let first = OrderBook::build(&store, &btc_market(), Side::Sell, T0 + 100).unwrap();
        let second = OrderBook::build(&store, &btc_market(), Side::Sell, T0 + 100).unwrap();
        assert_eq!(first.public_levels(), second.public_levels());
        assert_eq!(first.best_price(), second.best_price());
    }

    #[test]
    fn test_public_levels_capped() {
        let store = MemoryStore::new();
        for i in 0..(MAX_BOOK_ITEMS as u64 + 15) {
            place(&store, Side::Sell, &(100 + i).to_string(), "1.0", T0);
        }

        let book = OrderBook::build(&store, &btc_market(), Side::Sell, T0).unwrap();
        assert!(book.levels().len() > MAX_BOOK_ITEMS);
        assert_eq!(book.public_levels().len(), MAX_BOOK_ITEMS);
    }

    #[test]
    fn test_last_active_price_threshold() {
        let store = MemoryStore::new();
        // 4 orders at 100, 4 at 101, 4 at 102: threshold of 10 reached at 102
        for price in ["100", "101", "102"] {
            for _ in 0..4 {
                place(&store, Side::Sell, price, "1.0", T0);
            }
        }

        let book = OrderBook::build(&store, &btc_market(), Side::Sell, T0).unwrap();
        assert_eq!(book.last_active_price(), Some(Price::from_u64(102)));
    }

    #[test]
    fn test_last_active_price_none_for_small_market() {
        let store = MemoryStore::new();
        place(&store, Side::Sell, "100", "1.0", T0);
        let book = OrderBook::build(&store, &btc_market(), Side::Sell, T0).unwrap();
        assert!(book.last_active_price().is_none());
    }
}
