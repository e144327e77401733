//! Market (trading pair) configuration
//!
//! A `Market` row is created administratively and is read-mostly; the
//! matching core references markets but never owns them. `is_active` is
//! toggled by operations staff to pause a pair.

use crate::ids::MarketSymbol;
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Partitioning tier for a market.
///
/// `Isolated` markets are processed strictly sequentially in the
/// scheduler's own task and never share a worker with other markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketTier {
    /// Never runs concurrently with anything else (highest-volume pairs).
    Isolated,
    /// Eligible for the shared worker pool.
    Pooled,
}

/// A tradable pair with its quantization scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub symbol: MarketSymbol,
    pub base_asset: String,
    pub quote_asset: String,
    pub is_active: bool,
    /// Decimal places for prices on this market.
    pub price_scale: u32,
    /// Decimal places for base-asset amounts on this market.
    pub amount_scale: u32,
    pub tier: MarketTier,
}

impl Market {
    /// Create an active pooled market, deriving assets from the symbol.
    pub fn new(symbol: MarketSymbol, price_scale: u32, amount_scale: u32) -> Self {
        let (base, quote) = symbol.split();
        let base_asset = base.to_string();
        let quote_asset = quote.to_string();
        Self {
            symbol,
            base_asset,
            quote_asset,
            is_active: true,
            price_scale,
            amount_scale,
            tier: MarketTier::Pooled,
        }
    }

    /// Set the partitioning tier.
    pub fn with_tier(mut self, tier: MarketTier) -> Self {
        self.tier = tier;
        self
    }

    /// Round a price to this market's price scale (HALF-UP).
    pub fn quantize_price(&self, price: Price) -> Price {
        price.quantize(self.price_scale)
    }

    /// Round an amount to this market's amount scale (HALF-UP).
    pub fn quantize_amount(&self, amount: Quantity) -> Quantity {
        amount.quantize(self.amount_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_creation() {
        let market = Market::new(MarketSymbol::new("BTC/USDT"), 2, 8);
        assert_eq!(market.base_asset, "BTC");
        assert_eq!(market.quote_asset, "USDT");
        assert!(market.is_active);
        assert_eq!(market.tier, MarketTier::Pooled);
    }

    #[test]
    fn test_market_isolated_tier() {
        let market = Market::new(MarketSymbol::new("BTC/USDT"), 2, 8).with_tier(MarketTier::Isolated);
        assert_eq!(market.tier, MarketTier::Isolated);
    }

    #[test]
    fn test_quantize_price_to_market_scale() {
        let market = Market::new(MarketSymbol::new("BTC/USDT"), 2, 8);
        let p = Price::from_str("50000.119").unwrap();
        assert_eq!(market.quantize_price(p), Price::from_str("50000.12").unwrap());
    }

    #[test]
    fn test_quantize_amount_to_market_scale() {
        let market = Market::new(MarketSymbol::new("BTC/USDT"), 2, 4);
        let q = Quantity::from_str("0.123456").unwrap();
        assert_eq!(market.quantize_amount(q), Quantity::from_str("0.1235").unwrap());
    }

    #[test]
    fn test_market_serialization() {
        let market = Market::new(MarketSymbol::new("ETH/USDC"), 2, 6);
        let json = serde_json::to_string(&market).unwrap();
        let back: Market = serde_json::from_str(&json).unwrap();
        assert_eq!(market, back);
    }
}
