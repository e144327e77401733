//! Market partitioner
//!
//! Deterministically splits the active markets into disjoint groups so
//! the scheduler can run one worker per group without two workers ever
//! touching the same market. Partition 0 is reserved for `Isolated`-tier
//! markets, which the scheduler processes on its own before the pool
//! starts; pooled markets are dealt round-robin over partitions 1..=N in
//! sorted symbol order.
//!
//! Pure function of its input: same markets and worker count, same
//! partitioning.

use std::collections::BTreeMap;

use types::ids::MarketSymbol;
use types::market::{Market, MarketTier};

/// Assign every market to exactly one partition.
///
/// The result always has `workers + 1` entries; entries may be empty.
/// Index 0 holds the isolated markets.
pub fn partition_markets(
    markets: &BTreeMap<MarketSymbol, Market>,
    workers: usize,
) -> Vec<Vec<MarketSymbol>> {
    let workers = workers.max(1);
    let mut partitions: Vec<Vec<MarketSymbol>> = vec![Vec::new(); workers + 1];

    let mut pooled_index = 0usize;
    for (symbol, market) in markets {
        match market.tier {
            MarketTier::Isolated => partitions[0].push(symbol.clone()),
            MarketTier::Pooled => {
                partitions[1 + (pooled_index % workers)].push(symbol.clone());
                pooled_index += 1;
            }
        }
    }

    partitions
}
