//! Shared dirty-market tracker
//!
//! An explicit shared set with documented ownership: the store marks a
//! symbol whenever an order is inserted or canceled or a trade commits;
//! the scheduler drains the set at the start of a round to decide which
//! markets need processing. The set is advisory only: the scheduler's
//! periodic full pass is the correctness backstop, so a lost mark delays
//! a market by at most one full-pass interval.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use types::ids::MarketSymbol;

/// Cloneable handle to the shared dirty set.
#[derive(Debug, Clone, Default)]
pub struct DirtyMarkets {
    inner: Arc<Mutex<BTreeSet<MarketSymbol>>>,
}

impl DirtyMarkets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a market as potentially dirty.
    pub fn mark(&self, symbol: &MarketSymbol) {
        if let Ok(mut set) = self.inner.lock() {
            set.insert(symbol.clone());
        }
    }

    /// Take the entire dirty set, leaving it empty.
    pub fn drain(&self) -> BTreeSet<MarketSymbol> {
        match self.inner.lock() {
            Ok(mut set) => std::mem::take(&mut *set),
            Err(_) => BTreeSet::new(),
        }
    }

    /// Number of currently dirty markets.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Whether no market is marked dirty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
