//! Per-market trade engine
//!
//! One `run_market` invocation is one matching round for one market:
//! repeatedly fetch the best standing buy and sell, decide whether and
//! how much to trade, and commit each match inside one store unit of
//! work. Price-time priority throughout: better price wins, ties go to
//! the earlier order, and the earlier (resting) order's price is the
//! execution price.
//!
//! The wallet settlement runs inside the same unit of work as the order
//! and trade mutations, so a wallet rejection rolls the whole match
//! back and the round moves on to the next pair.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use store::traits::{MatchStore, MatchTxn};
use types::errors::{MatchError, StoreError, WalletError};
use types::ids::{MarketSymbol, OrderId};
use types::market::Market;
use types::numeric::Price;
use types::order::{Order, OrderStatus, Side};
use types::trade::Trade;

use crate::fees::FeeSchedule;
use crate::wallet::{SettlementInstruction, WalletGateway};

/// Tunables for one matcher instance.
#[derive(Debug, Clone)]
pub struct MatcherSettings {
    /// Maximum matches committed per market per round. Backpressure:
    /// one hot market must not starve the rest of its partition.
    pub max_matches_per_round: usize,
    /// Relative deviation from the previous trade price that counts as
    /// a price anomaly (logged and counted, never rejected).
    pub price_anomaly_ratio: Decimal,
    /// Whether one account may trade against itself. When false the
    /// later order of a self-crossing pair is skipped for the round.
    pub allow_self_match: bool,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            max_matches_per_round: 200,
            price_anomaly_ratio: Decimal::from_str_exact("0.2").unwrap(),
            allow_self_match: false,
        }
    }
}

/// Outcome of one market's matching round.
#[derive(Debug, Clone)]
pub struct MarketRoundReport {
    pub symbol: MarketSymbol,
    pub trades: u64,
    /// Orders that reached `Done` during this round.
    pub orders_filled: u64,
    pub wallet_rejections: u64,
    pub price_anomalies: u64,
    pub self_match_skips: u64,
    /// The per-round match cap stopped this market early.
    pub cap_reached: bool,
    pub fetch_ns: u64,
    pub commit_ns: u64,
    pub total_ns: u64,
}

impl MarketRoundReport {
    fn new(symbol: MarketSymbol) -> Self {
        Self {
            symbol,
            trades: 0,
            orders_filled: 0,
            wallet_rejections: 0,
            price_anomalies: 0,
            self_match_skips: 0,
            cap_reached: false,
            fetch_ns: 0,
            commit_ns: 0,
            total_ns: 0,
        }
    }
}

/// The trade-execution engine for single markets.
pub struct Matcher<S, W, F> {
    store: Arc<S>,
    wallet: Arc<W>,
    fees: Arc<F>,
    settings: MatcherSettings,
}

impl<S, W, F> Matcher<S, W, F>
where
    S: MatchStore,
    W: WalletGateway,
    F: FeeSchedule,
{
    pub fn new(store: Arc<S>, wallet: Arc<W>, fees: Arc<F>, settings: MatcherSettings) -> Self {
        Self {
            store,
            wallet,
            fees,
            settings,
        }
    }

    /// Run one matching round for `market`, observing only orders
    /// created at or before `cutoff`.
    pub fn run_market(
        &self,
        market: &Market,
        cutoff: i64,
    ) -> Result<MarketRoundReport, MatchError> {
        let started = Instant::now();
        let mut report = MarketRoundReport::new(market.symbol.clone());
        let mut excluded: BTreeSet<OrderId> = BTreeSet::new();
        let mut last_price = self.store.last_trade_price(&market.symbol)?;

        let mut attempts = 0;
        loop {
            if attempts >= self.settings.max_matches_per_round {
                report.cap_reached = true;
                break;
            }
            attempts += 1;

            let fetch_started = Instant::now();
            let best_buy =
                self.store
                    .best_order(&market.symbol, Side::Buy, cutoff, &excluded)?;
            let best_sell =
                self.store
                    .best_order(&market.symbol, Side::Sell, cutoff, &excluded)?;
            report.fetch_ns += fetch_started.elapsed().as_nanos() as u64;

            let (Some(buy), Some(sell)) = (best_buy, best_sell) else {
                break;
            };
            if buy.price < sell.price {
                break;
            }

            if !self.settings.allow_self_match && buy.account_id == sell.account_id {
                // Skip the later order; the earlier one keeps its place.
                let later = if order_key(&buy) > order_key(&sell) {
                    buy.order_id
                } else {
                    sell.order_id
                };
                excluded.insert(later);
                report.self_match_skips += 1;
                debug!(symbol = %market.symbol, order_id = %later, "Skipping self-crossing order");
                continue;
            }

            let commit_started = Instant::now();
            let outcome = self.execute_pair(market, &buy, &sell, cutoff);
            report.commit_ns += commit_started.elapsed().as_nanos() as u64;

            match outcome {
                Ok((trade, filled)) => {
                    if let Some(previous) = last_price {
                        if is_price_anomaly(trade.price, previous, self.settings.price_anomaly_ratio)
                        {
                            report.price_anomalies += 1;
                            warn!(
                                symbol = %market.symbol,
                                price = %trade.price,
                                previous = %previous,
                                "Matched price deviates sharply from previous trade"
                            );
                        }
                    }
                    last_price = Some(trade.price);
                    report.trades += 1;
                    report.orders_filled += filled;
                }
                Err(MatchError::Wallet(wallet_err)) => {
                    report.wallet_rejections += 1;
                    let rejected =
                        rejected_order_id(&wallet_err, &buy, &sell).unwrap_or(buy.order_id);
                    excluded.insert(rejected);
                    warn!(
                        symbol = %market.symbol,
                        order_id = %rejected,
                        error = %wallet_err,
                        "Wallet rejected settlement; match rolled back"
                    );
                }
                Err(MatchError::Store(StoreError::Conflict { reason })) => {
                    // The pair changed under us between fetch and lock;
                    // the next fetch observes the new state.
                    debug!(symbol = %market.symbol, %reason, "Match attempt lost its pair");
                }
                Err(e) => return Err(e),
            }
        }

        report.total_ns = started.elapsed().as_nanos() as u64;
        Ok(report)
    }

    /// Commit one match between `buy` and `sell` atomically.
    ///
    /// Returns the trade and how many of the two orders reached `Done`.
    fn execute_pair(
        &self,
        market: &Market,
        buy: &Order,
        sell: &Order,
        executed_at: i64,
    ) -> Result<(Trade, u64), MatchError> {
        let buy_is_maker = order_key(buy) < order_key(sell);

        self.store.unit_of_work(|txn| {
            let mut buy_row = txn.lock_order(&buy.order_id)?;
            let mut sell_row = txn.lock_order(&sell.order_id)?;

            if buy_row.status != OrderStatus::Active || sell_row.status != OrderStatus::Active {
                return Err(MatchError::Store(StoreError::Conflict {
                    reason: "order no longer active".to_string(),
                }));
            }
            if buy_row.price < sell_row.price {
                return Err(MatchError::Store(StoreError::Conflict {
                    reason: "pair no longer crosses".to_string(),
                }));
            }

            let amount = market.quantize_amount(buy_row.unfilled().min(sell_row.unfilled()));
            if amount.is_zero() {
                return Err(MatchError::InvalidOrder {
                    reason: format!(
                        "zero matchable amount between {} and {}",
                        buy_row.order_id, sell_row.order_id
                    ),
                });
            }

            let price = market.quantize_price(if buy_is_maker {
                buy_row.price
            } else {
                sell_row.price
            });
            let notional = amount.as_decimal() * price.as_decimal();

            let buy_rate = self.fees.rate_for(&buy_row.account_id, &market.symbol);
            let sell_rate = self.fees.rate_for(&sell_row.account_id, &market.symbol);
            let buy_fee = if buy_is_maker {
                buy_rate.maker_fee(notional)
            } else {
                buy_rate.taker_fee(notional)
            };
            let sell_fee = if buy_is_maker {
                sell_rate.taker_fee(notional)
            } else {
                sell_rate.maker_fee(notional)
            };

            buy_row.apply_fill(amount, notional, buy_fee)?;
            sell_row.apply_fill(amount, notional, sell_fee)?;
            let filled = u64::from(buy_row.status == OrderStatus::Done)
                + u64::from(sell_row.status == OrderStatus::Done);

            let buyer = buy_row.account_id;
            let seller = sell_row.account_id;
            txn.update_order(buy_row)?;
            txn.update_order(sell_row)?;

            let trade = txn.insert_trade(Trade::new(
                market.symbol.clone(),
                buy.order_id,
                sell.order_id,
                buyer,
                seller,
                price,
                amount,
                buy_fee,
                sell_fee,
                executed_at,
            ))?;

            self.wallet.settle(&SettlementInstruction {
                symbol: market.symbol.clone(),
                buyer,
                seller,
                base_asset: market.base_asset.clone(),
                quote_asset: market.quote_asset.clone(),
                base_amount: amount.as_decimal(),
                quote_amount: notional,
                buy_fee,
                sell_fee,
            })?;

            Ok((trade, filled))
        })
    }
}

/// Time-priority key: creation time, then insertion sequence.
fn order_key(order: &Order) -> (i64, u64) {
    (order.created_at, order.seq)
}

fn is_price_anomaly(price: Price, previous: Price, ratio: Decimal) -> bool {
    if previous.is_zero() {
        return false;
    }
    let deviation = (price.as_decimal() - previous.as_decimal()).abs() / previous.as_decimal();
    deviation > ratio
}

/// Map a wallet rejection back to the order whose account it names.
fn rejected_order_id(err: &WalletError, buy: &Order, sell: &Order) -> Option<OrderId> {
    let account = match err {
        WalletError::InsufficientBalance { account, .. } => account,
        WalletError::LockedWallet { account } => account,
    };
    if buy.account_id.to_string() == *account {
        Some(buy.order_id)
    } else if sell.account_id.to_string() == *account {
        Some(sell.order_id)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::traits::{MarketStore, OrderStore, TradeStore};
    use store::MemoryStore;
    use types::ids::AccountId;
    use types::numeric::Quantity;

    use crate::fees::FlatFeeSchedule;
    use crate::wallet::MemoryWallet;

    const T0: i64 = 1_708_123_456_789_000_000;
    const ROUND_AT: i64 = T0 + 1_000_000;

    fn btc() -> MarketSymbol {
        MarketSymbol::new("BTC/USDT")
    }

    fn btc_market() -> Market {
        Market::new(btc(), 2, 8)
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        wallet: Arc<MemoryWallet>,
        matcher: Matcher<MemoryStore, MemoryWallet, FlatFeeSchedule>,
        market: Market,
    }

    fn fixture() -> Fixture {
        fixture_with(MatcherSettings::default())
    }

    fn fixture_with(settings: MatcherSettings) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let wallet = Arc::new(MemoryWallet::new());
        let market = btc_market();
        store.upsert_market(market.clone()).unwrap();
        let matcher = Matcher::new(
            store.clone(),
            wallet.clone(),
            Arc::new(FlatFeeSchedule::default()),
            settings,
        );
        Fixture {
            store,
            wallet,
            matcher,
            market,
        }
    }

    fn funded_account(wallet: &MemoryWallet) -> AccountId {
        let account = AccountId::new();
        wallet.deposit(account, "USDT", Decimal::from(10_000_000));
        wallet.deposit(account, "BTC", Decimal::from(1_000));
        account
    }

    fn place(
        store: &MemoryStore,
        account: AccountId,
        side: Side,
        price: u64,
        amount: &str,
        created_at: i64,
    ) -> Order {
        store
            .insert_order(Order::limit(
                account,
                btc(),
                side,
                Price::from_u64(price),
                Quantity::from_str(amount).unwrap(),
                created_at,
            ))
            .unwrap()
    }

    #[test]
    fn test_no_cross_no_trades() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);
        place(&f.store, a, Side::Buy, 49000, "1.0", T0);
        place(&f.store, b, Side::Sell, 50000, "1.0", T0);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 0);
        assert_eq!(f.store.trade_count(), 0);
    }

    #[test]
    fn test_crossing_pair_trades_at_resting_price() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);
        // Sell resting first at 50000, buy arrives later willing to pay 50100
        let sell = place(&f.store, a, Side::Sell, 50000, "1.0", T0);
        let buy = place(&f.store, b, Side::Buy, 50100, "1.0", T0 + 10);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 1);
        assert_eq!(report.orders_filled, 2);

        let trades = f.store.recent_trades(&btc(), 10).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, Price::from_u64(50000), "resting order sets the price");
        assert_eq!(trades[0].buy_order_id, buy.order_id);
        assert_eq!(trades[0].sell_order_id, sell.order_id);

        let buy_row = f.store.order(&buy.order_id).unwrap().unwrap();
        let sell_row = f.store.order(&sell.order_id).unwrap().unwrap();
        assert_eq!(buy_row.status, OrderStatus::Done);
        assert_eq!(sell_row.status, OrderStatus::Done);
        assert!(buy_row.check_invariant());
        assert!(sell_row.check_invariant());
    }

    #[test]
    fn test_price_time_priority_equal_price() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);
        let c = funded_account(&f.wallet);

        let sell_a = place(&f.store, a, Side::Sell, 100, "1.0", T0);
        let sell_b = place(&f.store, b, Side::Sell, 100, "1.0", T0 + 1);
        place(&f.store, c, Side::Buy, 100, "1.0", T0 + 2);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 1);

        let trades = f.store.recent_trades(&btc(), 10).unwrap();
        assert_eq!(trades[0].sell_order_id, sell_a.order_id, "earlier sell matches first");

        let b_row = f.store.order(&sell_b.order_id).unwrap().unwrap();
        assert!(!b_row.has_fills(), "later sell stays fully unfilled");
    }

    #[test]
    fn test_multi_fill_consumes_levels_in_order() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);
        let c = funded_account(&f.wallet);

        place(&f.store, a, Side::Sell, 100, "1.0", T0);
        place(&f.store, b, Side::Sell, 100, "2.0", T0 + 1);
        let buy = place(&f.store, c, Side::Buy, 100, "3.0", T0 + 2);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 2);

        let buy_row = f.store.order(&buy.order_id).unwrap().unwrap();
        assert_eq!(buy_row.status, OrderStatus::Done);
        assert_eq!(buy_row.matched_amount, Quantity::from_str("3.0").unwrap());

        let trades = f.store.recent_trades(&btc(), 10).unwrap();
        let total: Decimal = trades.iter().map(|t| t.amount.as_decimal()).sum();
        assert_eq!(total, Decimal::from(3));
    }

    #[test]
    fn test_trade_amount_bounded_by_unfilled() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);
        place(&f.store, a, Side::Sell, 100, "0.4", T0);
        place(&f.store, b, Side::Buy, 100, "5.0", T0 + 1);

        f.matcher.run_market(&f.market, ROUND_AT).unwrap();

        let trades = f.store.recent_trades(&btc(), 10).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].amount, Quantity::from_str("0.4").unwrap());
    }

    #[test]
    fn test_partial_fill_leaves_order_active() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);
        place(&f.store, a, Side::Sell, 100, "1.0", T0);
        let buy = place(&f.store, b, Side::Buy, 100, "2.5", T0 + 1);

        f.matcher.run_market(&f.market, ROUND_AT).unwrap();

        let buy_row = f.store.order(&buy.order_id).unwrap().unwrap();
        assert_eq!(buy_row.status, OrderStatus::Active);
        assert_eq!(buy_row.unfilled(), Quantity::from_str("1.5").unwrap());
        assert!(buy_row.check_invariant());
    }

    #[test]
    fn test_wallet_failure_rolls_back_everything() {
        let f = fixture();
        // Buyer has no quote balance at all
        let poor_buyer = AccountId::new();
        let seller = funded_account(&f.wallet);

        let sell = place(&f.store, seller, Side::Sell, 100, "1.0", T0);
        let buy = place(&f.store, poor_buyer, Side::Buy, 100, "1.0", T0 + 1);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 0);
        assert_eq!(report.wallet_rejections, 1);

        let buy_row = f.store.order(&buy.order_id).unwrap().unwrap();
        let sell_row = f.store.order(&sell.order_id).unwrap().unwrap();
        assert!(!buy_row.has_fills(), "rolled back buy must be untouched");
        assert!(!sell_row.has_fills(), "rolled back sell must be untouched");
        assert_eq!(f.store.trade_count(), 0);
    }

    #[test]
    fn test_wallet_rejection_proceeds_to_next_pair() {
        let f = fixture();
        let poor_buyer = AccountId::new();
        let rich_buyer = funded_account(&f.wallet);
        let seller = funded_account(&f.wallet);

        place(&f.store, seller, Side::Sell, 100, "1.0", T0);
        // Poor buyer has the better (higher) price and would match first
        place(&f.store, poor_buyer, Side::Buy, 101, "1.0", T0 + 1);
        let rich_buy = place(&f.store, rich_buyer, Side::Buy, 100, "1.0", T0 + 2);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.wallet_rejections, 1);
        assert_eq!(report.trades, 1, "round continues past the rejected pair");

        let trades = f.store.recent_trades(&btc(), 10).unwrap();
        assert_eq!(trades[0].buy_order_id, rich_buy.order_id);
    }

    #[test]
    fn test_locked_wallet_rejection() {
        let f = fixture();
        let buyer = funded_account(&f.wallet);
        let seller = funded_account(&f.wallet);
        f.wallet.lock_account(seller);

        place(&f.store, seller, Side::Sell, 100, "1.0", T0);
        place(&f.store, buyer, Side::Buy, 100, "1.0", T0 + 1);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 0);
        assert_eq!(report.wallet_rejections, 1);
        assert_eq!(f.store.trade_count(), 0);
    }

    #[test]
    fn test_round_cap_backpressure() {
        let f = fixture_with(MatcherSettings {
            max_matches_per_round: 1,
            ..MatcherSettings::default()
        });
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);

        place(&f.store, a, Side::Sell, 100, "1.0", T0);
        place(&f.store, a, Side::Sell, 100, "1.0", T0 + 1);
        place(&f.store, b, Side::Buy, 100, "1.0", T0 + 2);
        place(&f.store, b, Side::Buy, 100, "1.0", T0 + 3);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 1);
        assert!(report.cap_reached);

        // The next round picks up where this one stopped
        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 1);
    }

    #[test]
    fn test_self_match_skipped() {
        let f = fixture();
        let account = funded_account(&f.wallet);
        let other = funded_account(&f.wallet);

        place(&f.store, account, Side::Sell, 100, "1.0", T0);
        place(&f.store, account, Side::Buy, 100, "1.0", T0 + 1);
        let other_buy = place(&f.store, other, Side::Buy, 100, "1.0", T0 + 2);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.self_match_skips, 1);
        assert_eq!(report.trades, 1);

        let trades = f.store.recent_trades(&btc(), 10).unwrap();
        assert_eq!(trades[0].buy_order_id, other_buy.order_id);
    }

    #[test]
    fn test_price_anomaly_counted() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);

        // Establish a last trade price of 100
        place(&f.store, a, Side::Sell, 100, "1.0", T0);
        place(&f.store, b, Side::Buy, 100, "1.0", T0 + 1);
        f.matcher.run_market(&f.market, ROUND_AT).unwrap();

        // Next match at 200: a 100% deviation
        place(&f.store, a, Side::Sell, 200, "1.0", T0 + 2);
        place(&f.store, b, Side::Buy, 200, "1.0", T0 + 3);
        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();

        assert_eq!(report.trades, 1);
        assert_eq!(report.price_anomalies, 1);
    }

    #[test]
    fn test_orders_after_cutoff_invisible() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);

        place(&f.store, a, Side::Sell, 100, "1.0", T0);
        place(&f.store, b, Side::Buy, 100, "1.0", ROUND_AT + 1);

        let report = f.matcher.run_market(&f.market, ROUND_AT).unwrap();
        assert_eq!(report.trades, 0);
    }

    #[test]
    fn test_fees_recorded_on_orders_and_trade() {
        let f = fixture();
        let a = funded_account(&f.wallet);
        let b = funded_account(&f.wallet);

        let sell = place(&f.store, a, Side::Sell, 50000, "1.0", T0);
        let buy = place(&f.store, b, Side::Buy, 50000, "1.0", T0 + 1);

        f.matcher.run_market(&f.market, ROUND_AT).unwrap();

        // Notional 50000: maker (sell) 0.02% = 10, taker (buy) 0.05% = 25
        let trades = f.store.recent_trades(&btc(), 10).unwrap();
        assert_eq!(trades[0].sell_fee, Decimal::from(10));
        assert_eq!(trades[0].buy_fee, Decimal::from(25));

        let sell_row = f.store.order(&sell.order_id).unwrap().unwrap();
        let buy_row = f.store.order(&buy.order_id).unwrap().unwrap();
        assert_eq!(sell_row.fee, Decimal::from(10));
        assert_eq!(buy_row.fee, Decimal::from(25));
        assert_eq!(buy_row.matched_total_price, Decimal::from(50000));
    }
}
