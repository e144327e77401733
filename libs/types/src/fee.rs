//! Fee rates and fee math
//!
//! Fees are computed as notional × rate at full precision; quantization
//! to the market's scales happens where values are persisted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A maker/taker fee rate pair.
///
/// The maker rate applies to the resting (earlier) order of a match,
/// the taker rate to the order that crossed it. Maker rates can be
/// negative (rebate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeRate {
    pub maker: Decimal,
    pub taker: Decimal,
}

impl FeeRate {
    pub fn new(maker: Decimal, taker: Decimal) -> Self {
        Self { maker, taker }
    }

    /// Fee charged to the maker side for a given notional.
    pub fn maker_fee(&self, notional: Decimal) -> Decimal {
        notional * self.maker
    }

    /// Fee charged to the taker side for a given notional.
    pub fn taker_fee(&self, notional: Decimal) -> Decimal {
        notional * self.taker
    }
}

/// Standard base-tier rates: 0.02% maker, 0.05% taker.
pub fn default_fee_rate() -> FeeRate {
    FeeRate {
        maker: Decimal::from_str_exact("0.0002").unwrap(),
        taker: Decimal::from_str_exact("0.0005").unwrap(),
    }
}
