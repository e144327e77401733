//! Skip-match overlap resolution
//!
//! Where the best bid meets or exceeds the best ask, that overlap is
//! about to be consumed by the matcher and must not be shown as
//! standing liquidity. This walks both books from the top, consuming
//! overlapping amount from each side while the cross holds, recording
//! per side how many levels were fully consumed (`skips`) and whether
//! any overlap existed (`has_match`). Consumed levels are zeroed in
//! place so the books retain them internally.

use rust_decimal::Decimal;

use types::order::Side;

use crate::book::OrderBook;

/// Net out the bid/ask overlap between the two sides of one market.
///
/// `sell` and `buy` must be the two sides of the same market with the
/// same cutoff.
pub fn resolve_overlap(sell: &mut OrderBook, buy: &mut OrderBook) {
    debug_assert_eq!(sell.side(), Side::Sell);
    debug_assert_eq!(buy.side(), Side::Buy);
    debug_assert_eq!(sell.symbol(), buy.symbol());

    let mut sell_idx = 0;
    let mut buy_idx = 0;

    while sell_idx < sell.levels.len() && buy_idx < buy.levels.len() {
        if buy.levels[buy_idx].price < sell.levels[sell_idx].price {
            break;
        }

        let consumed = sell.levels[sell_idx]
            .amount
            .min(buy.levels[buy_idx].amount);
        sell.levels[sell_idx].amount -= consumed;
        buy.levels[buy_idx].amount -= consumed;
        sell.has_match = true;
        buy.has_match = true;

        if sell.levels[sell_idx].amount <= Decimal::ZERO {
            sell.skips += 1;
            sell_idx += 1;
        }
        if buy.levels[buy_idx].amount <= Decimal::ZERO {
            buy.skips += 1;
            buy_idx += 1;
        }
    }
}
