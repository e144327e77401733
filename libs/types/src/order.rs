//! Order lifecycle types
//!
//! An order is a standing instruction to buy or sell a fixed amount of
//! base asset in one market. Orders are never deleted: the row itself,
//! together with the trades generated against it, is the audit trail.
//! The only mutations after creation are fill accounting (`apply_fill`)
//! and cancellation.

use crate::errors::OrderError;
use crate::ids::{AccountId, MarketSymbol, OrderId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// How an order executes.
///
/// Only limit orders rest on the book and participate in scheduled
/// matching rounds; market orders execute at placement time and stop
/// variants only become book-resident once triggered (both paths are
/// owned by the order-placement service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Execution {
    Limit,
    Market,
    StopLimit,
    StopMarket,
}

impl Execution {
    /// Whether orders of this execution type rest on the book.
    pub fn rests_on_book(&self) -> bool {
        matches!(self, Execution::Limit)
    }
}

/// Order status.
///
/// `Done` holds exactly when `matched_amount == amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Active,
    Done,
    Canceled,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Done | OrderStatus::Canceled)
    }
}

/// A standing buy/sell instruction in one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: MarketSymbol,
    pub side: Side,
    pub execution: Execution,
    /// Limit price. Ignored for market execution.
    pub price: Price,
    pub amount: Quantity,
    /// Cumulative filled quantity.
    pub matched_amount: Quantity,
    /// Cumulative filled notional (quote asset).
    pub matched_total_price: Decimal,
    /// Cumulative fee charged against this order.
    pub fee: Decimal,
    pub status: OrderStatus,
    /// Unix nanos at creation.
    pub created_at: i64,
    /// Store-assigned insertion sequence; tie-break at equal price and
    /// equal `created_at`.
    pub seq: u64,
}

impl Order {
    /// Create a new active order. `seq` is assigned by the store on insert.
    pub fn new(
        account_id: AccountId,
        symbol: MarketSymbol,
        side: Side,
        execution: Execution,
        price: Price,
        amount: Quantity,
        created_at: i64,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            account_id,
            symbol,
            side,
            execution,
            price,
            amount,
            matched_amount: Quantity::zero(),
            matched_total_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            status: OrderStatus::Active,
            created_at,
            seq: 0,
        }
    }

    /// Convenience constructor for a limit order.
    pub fn limit(
        account_id: AccountId,
        symbol: MarketSymbol,
        side: Side,
        price: Price,
        amount: Quantity,
        created_at: i64,
    ) -> Self {
        Self::new(account_id, symbol, side, Execution::Limit, price, amount, created_at)
    }

    /// Quantity still open for matching.
    pub fn unfilled(&self) -> Quantity {
        self.amount.saturating_sub(self.matched_amount)
    }

    /// Check the fill invariant: 0 <= matched <= amount, Done iff full.
    pub fn check_invariant(&self) -> bool {
        self.matched_amount.as_decimal() <= self.amount.as_decimal()
            && ((self.status == OrderStatus::Done)
                == (self.matched_amount == self.amount))
    }

    /// Check if order is completely filled.
    pub fn is_done(&self) -> bool {
        self.matched_amount == self.amount
    }

    /// Check if order has any fills.
    pub fn has_fills(&self) -> bool {
        !self.matched_amount.is_zero()
    }

    /// Account a fill: increment matched amount, matched notional, and
    /// fee, transitioning to `Done` when fully filled.
    ///
    /// Fails on overfill or if the order is not active; the caller is
    /// expected to have re-read the row under lock before applying.
    pub fn apply_fill(
        &mut self,
        fill_amount: Quantity,
        notional: Decimal,
        fee: Decimal,
    ) -> Result<(), OrderError> {
        if self.status != OrderStatus::Active {
            return Err(OrderError::AlreadyTerminal {
                status: format!("{:?}", self.status),
            });
        }

        let new_matched = self.matched_amount + fill_amount;
        if new_matched.as_decimal() > self.amount.as_decimal() {
            return Err(OrderError::Overfill {
                order_id: self.order_id.to_string(),
                amount: self.amount.as_decimal().to_string(),
                attempted: new_matched.as_decimal().to_string(),
            });
        }

        self.matched_amount = new_matched;
        self.matched_total_price += notional;
        self.fee += fee;

        if self.is_done() {
            self.status = OrderStatus::Done;
        }

        Ok(())
    }

    /// Cancel the order. Fails if already terminal.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal {
                status: format!("{:?}", self.status),
            });
        }
        self.status = OrderStatus::Canceled;
        Ok(())
    }
}
