//! Trade records
//!
//! A trade is the immutable record of one match between exactly one buy
//! order and one sell order. It is created once inside the matcher's
//! unit of work and never mutated or deleted afterward; settlement is
//! the wallet collaborator's concern, not state carried here.

use crate::ids::{AccountId, MarketSymbol, OrderId, TradeId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An immutable record of one match between a buy and a sell order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    /// Store-assigned monotonic sequence.
    pub seq: u64,
    pub symbol: MarketSymbol,

    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer_account_id: AccountId,
    pub seller_account_id: AccountId,

    pub price: Price,
    pub amount: Quantity,

    /// Fee charged to the buyer (quote asset units).
    pub buy_fee: Decimal,
    /// Fee charged to the seller (quote asset units).
    pub sell_fee: Decimal,

    /// Unix nanos at execution.
    pub executed_at: i64,
}

impl Trade {
    /// Create a new trade record. `seq` is assigned by the store on insert.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: MarketSymbol,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        buyer_account_id: AccountId,
        seller_account_id: AccountId,
        price: Price,
        amount: Quantity,
        buy_fee: Decimal,
        sell_fee: Decimal,
        executed_at: i64,
    ) -> Self {
        Self {
            trade_id: TradeId::new(),
            seq: 0,
            symbol,
            buy_order_id,
            sell_order_id,
            buyer_account_id,
            seller_account_id,
            price,
            amount,
            buy_fee,
            sell_fee,
            executed_at,
        }
    }

    /// Trade notional (price × amount) at full precision.
    pub fn notional(&self) -> Decimal {
        self.amount.as_decimal() * self.price.as_decimal()
    }

    /// Whether both sides belong to the same account.
    pub fn is_self_trade(&self) -> bool {
        self.buyer_account_id == self.seller_account_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        Trade::new(
            MarketSymbol::new("BTC/USDT"),
            OrderId::new(),
            OrderId::new(),
            AccountId::new(),
            AccountId::new(),
            Price::from_u64(50000),
            Quantity::from_str("0.5").unwrap(),
            Decimal::from(25),
            Decimal::from(5),
            1_708_123_456_789_000_000,
        )
    }

    #[test]
    fn test_trade_creation() {
        let trade = sample_trade();
        assert_eq!(trade.seq, 0, "seq assigned by the store");
        assert!(!trade.is_self_trade());
    }

    #[test]
    fn test_trade_notional() {
        let trade = sample_trade();
        assert_eq!(trade.notional(), Decimal::from(25000));
    }

    #[test]
    fn test_self_trade_detection() {
        let account = AccountId::new();
        let trade = Trade::new(
            MarketSymbol::new("BTC/USDT"),
            OrderId::new(),
            OrderId::new(),
            account,
            account,
            Price::from_u64(50000),
            Quantity::from_str("0.5").unwrap(),
            Decimal::ZERO,
            Decimal::ZERO,
            1_708_123_456_789_000_000,
        );
        assert!(trade.is_self_trade());
    }

    #[test]
    fn test_trade_serialization() {
        let trade = sample_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, back);
    }
}
