//! Error taxonomy for the matching core
//!
//! Comprehensive error taxonomy using thiserror. The layering mirrors
//! the blast radius: `WalletError` aborts one match attempt,
//! `StoreError::Unavailable` defers a market to the next round, and
//! invariant violations abandon the market's round entirely. Nothing
//! escapes a single market's processing boundary.

use thiserror::Error;

/// Storage-layer errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: String },

    #[error("Market not found: {symbol}")]
    MarketNotFound { symbol: String },

    #[error("Lock re-validation failed: {reason}")]
    Conflict { reason: String },

    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },
}

/// Wallet collaborator errors.
///
/// Both variants abort only the current match attempt; the transaction
/// rolls back and the orders remain in their pre-match state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("Insufficient balance for {account} in {asset}: required {required}, available {available}")]
    InsufficientBalance {
        account: String,
        asset: String,
        required: String,
        available: String,
    },

    #[error("Wallet locked for account {account}")]
    LockedWallet { account: String },
}

/// Order state errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Fill would exceed order {order_id} amount {amount} (attempted {attempted})")]
    Overfill {
        order_id: String,
        amount: String,
        attempted: String,
    },

    #[error("Order already in terminal state: {status}")]
    AlreadyTerminal { status: String },
}

/// Errors raised while matching one market.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Invalid order data: {reason}")]
    InvalidOrder { reason: String },
}

impl MatchError {
    /// Whether this error aborts only the current match attempt (the
    /// round continues with the next pair) rather than the whole market.
    pub fn is_pair_scoped(&self) -> bool {
        matches!(
            self,
            MatchError::Wallet(_) | MatchError::Store(StoreError::Conflict { .. })
        )
    }
}
