//! Wallet collaborator
//!
//! The wallet ledger itself is owned elsewhere; the matcher consumes it
//! through `WalletGateway` as a single atomic capability. Settlement is
//! invoked *inside* the store unit of work, so a wallet rejection rolls
//! back the order and trade mutations with it.
//!
//! Settlement legs for one trade: the full base amount moves seller →
//! buyer and the quote notional moves buyer → seller; both fees are
//! charged in quote, the buyer's on top of the notional paid and the
//! seller's out of the notional received.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use rust_decimal::Decimal;
use types::errors::WalletError;
use types::ids::{AccountId, MarketSymbol};

/// The four-leg transfer settling one trade.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementInstruction {
    pub symbol: MarketSymbol,
    pub buyer: AccountId,
    pub seller: AccountId,
    pub base_asset: String,
    pub quote_asset: String,
    /// Base amount moving seller → buyer.
    pub base_amount: Decimal,
    /// Quote notional moving buyer → seller.
    pub quote_amount: Decimal,
    /// Fee charged to the buyer, in quote asset.
    pub buy_fee: Decimal,
    /// Fee charged to the seller, in quote asset.
    pub sell_fee: Decimal,
}

/// Atomic settlement capability.
///
/// Implementations must apply the whole instruction or nothing, and must
/// be safe to invoke inside an ongoing store transaction.
pub trait WalletGateway: Send + Sync {
    fn settle(&self, instruction: &SettlementInstruction) -> Result<(), WalletError>;
}

/// In-memory wallet: per-account-per-asset balances behind one mutex,
/// applied all-or-nothing. Reference implementation and test double.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    balances: Mutex<BTreeMap<(AccountId, String), Decimal>>,
    locked: Mutex<BTreeSet<AccountId>>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account balance (test/bootstrap path).
    pub fn deposit(&self, account: AccountId, asset: &str, amount: Decimal) {
        if let Ok(mut balances) = self.balances.lock() {
            *balances.entry((account, asset.to_string())).or_insert(Decimal::ZERO) += amount;
        }
    }

    /// Current balance for an account in one asset.
    pub fn balance(&self, account: AccountId, asset: &str) -> Decimal {
        self.balances
            .lock()
            .ok()
            .and_then(|b| b.get(&(account, asset.to_string())).copied())
            .unwrap_or(Decimal::ZERO)
    }

    /// Freeze an account; settlement against it fails with `LockedWallet`.
    pub fn lock_account(&self, account: AccountId) {
        if let Ok(mut locked) = self.locked.lock() {
            locked.insert(account);
        }
    }

    /// Unfreeze an account.
    pub fn unlock_account(&self, account: AccountId) {
        if let Ok(mut locked) = self.locked.lock() {
            locked.remove(&account);
        }
    }

    fn is_locked(&self, account: AccountId) -> bool {
        self.locked
            .lock()
            .map(|l| l.contains(&account))
            .unwrap_or(false)
    }
}

impl WalletGateway for MemoryWallet {
    fn settle(&self, instruction: &SettlementInstruction) -> Result<(), WalletError> {
        for account in [instruction.buyer, instruction.seller] {
            if self.is_locked(account) {
                return Err(WalletError::LockedWallet {
                    account: account.to_string(),
                });
            }
        }

        let mut balances = self.balances.lock().map_err(|_| WalletError::LockedWallet {
            account: instruction.buyer.to_string(),
        })?;

        let buyer_quote = (instruction.buyer, instruction.quote_asset.clone());
        let seller_base = (instruction.seller, instruction.base_asset.clone());

        // The buyer funds notional + fee in quote; the seller funds the base leg.
        let buyer_required = instruction.quote_amount + instruction.buy_fee;
        let buyer_available = balances.get(&buyer_quote).copied().unwrap_or(Decimal::ZERO);
        if buyer_available < buyer_required {
            return Err(WalletError::InsufficientBalance {
                account: instruction.buyer.to_string(),
                asset: instruction.quote_asset.clone(),
                required: buyer_required.to_string(),
                available: buyer_available.to_string(),
            });
        }

        let seller_available = balances.get(&seller_base).copied().unwrap_or(Decimal::ZERO);
        if seller_available < instruction.base_amount {
            return Err(WalletError::InsufficientBalance {
                account: instruction.seller.to_string(),
                asset: instruction.base_asset.clone(),
                required: instruction.base_amount.to_string(),
                available: seller_available.to_string(),
            });
        }

        // All checks passed; apply every leg under the same lock.
        *balances.entry(buyer_quote).or_insert(Decimal::ZERO) -= buyer_required;
        *balances.entry(seller_base).or_insert(Decimal::ZERO) -= instruction.base_amount;
        *balances
            .entry((instruction.buyer, instruction.base_asset.clone()))
            .or_insert(Decimal::ZERO) += instruction.base_amount;
        *balances
            .entry((instruction.seller, instruction.quote_asset.clone()))
            .or_insert(Decimal::ZERO) += instruction.quote_amount - instruction.sell_fee;

        Ok(())
    }
}
