//! Fee schedule collaborator
//!
//! Pure lookup of the maker/taker rate pair applying to one account on
//! one market. The schedule itself (volume tiers, promotions) is owned
//! by the exchange configuration; the matcher only reads rates.

use types::fee::{default_fee_rate, FeeRate};
use types::ids::{AccountId, MarketSymbol};

/// Fee rate lookup. No side effects.
pub trait FeeSchedule: Send + Sync {
    fn rate_for(&self, account: &AccountId, symbol: &MarketSymbol) -> FeeRate;
}

/// A single rate pair applied to every account and market.
#[derive(Debug, Clone)]
pub struct FlatFeeSchedule {
    rate: FeeRate,
}

impl FlatFeeSchedule {
    pub fn new(rate: FeeRate) -> Self {
        Self { rate }
    }
}

impl Default for FlatFeeSchedule {
    fn default() -> Self {
        Self::new(default_fee_rate())
    }
}

impl FeeSchedule for FlatFeeSchedule {
    fn rate_for(&self, _account: &AccountId, _symbol: &MarketSymbol) -> FeeRate {
        self.rate
    }
}
