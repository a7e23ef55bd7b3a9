//! Single-strategy backtest driver: walks a strategy bar-by-bar against a
//! [`Portfolio`], producing the equity curve later fed into
//! [`crate::manager::PortfolioManager::update_weights`].
//!
//! Each strategy is backtested independently of the others — the manager
//! only ever sees the resulting equity curves, never re-simulates fills
//! itself.

use crate::portfolio::{CostModel, Portfolio, compute_metrics, metrics::Metrics};
use crate::strategy::{Allocation, Bar, OwnPosition, Strategy};
use crate::types::Symbol;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// One period of market data: one bar per traded symbol. Missing symbols
/// (no bar this period) are simply absent from the slice.
pub type Period = Vec<Bar>;

/// Tunables for a backtest run.
#[derive(Clone, Copy, Debug)]
pub struct BacktestConfig {
    /// Starting cash, in cents.
    pub initial_capital: i64,
    /// Periods to hold flat (no rebalancing) before the first allocation,
    /// so the strategy has enough history to compute a meaningful signal.
    pub warmup_periods: usize,
    /// Re-evaluate the strategy every this many periods after warmup.
    pub rebalance_every: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 1_000_000_00,
            warmup_periods: 30,
            rebalance_every: 5,
        }
    }
}

/// The result of a single-strategy backtest run.
#[derive(Clone, Debug)]
pub struct BacktestResult {
    pub equity_curve: Vec<i64>,
    pub returns: Vec<f64>,
    pub metrics: Option<Metrics>,
}

thread_local! {
    static IN_BACKTEST: AtomicBool = const { AtomicBool::new(false) };
}

/// Returns true while a backtest is executing on the current thread.
///
/// A strategy or cost model can use this to branch on simulated vs. live
/// execution if it genuinely needs to (e.g. to skip a live-only safety
/// check), without the backtest driver threading an explicit flag through
/// every call.
pub fn in_backtest() -> bool {
    IN_BACKTEST.with(|flag| flag.load(Ordering::Relaxed))
}

/// Clears the in-backtest flag on drop, even if the driver panics or
/// returns early — a stuck `true` would silently make a later live tick
/// behave as if it were still simulated.
struct BacktestGuard;

impl BacktestGuard {
    fn enter() -> Self {
        IN_BACKTEST.with(|flag| flag.store(true, Ordering::Relaxed));
        Self
    }
}

impl Drop for BacktestGuard {
    fn drop(&mut self) {
        IN_BACKTEST.with(|flag| flag.store(false, Ordering::Relaxed));
    }
}

/// Run `strategy` against `periods`, one bar-set per period, in isolation.
///
/// Warmup periods only record equity (at flat positions) so the equity
/// curve's length matches `periods.len()`; no order is placed until
/// `warmup_periods` have elapsed, and thereafter only every
/// `rebalance_every` periods.
pub fn run_backtest(
    strategy: &dyn Strategy,
    periods: &[Period],
    cost_model: CostModel,
    config: &BacktestConfig,
) -> BacktestResult {
    let _guard = BacktestGuard::enter();
    let mut portfolio = Portfolio::new(config.initial_capital, cost_model);

    for (i, bars) in periods.iter().enumerate() {
        let prices: Vec<(Symbol, i64)> = bars.iter().map(|b| (b.symbol, b.close)).collect();

        if i >= config.warmup_periods && (i - config.warmup_periods) % config.rebalance_every == 0 {
            let own_positions: Vec<OwnPosition> = portfolio
                .positions()
                .map(|(sym, pos)| OwnPosition {
                    symbol: *sym,
                    quantity: pos.quantity,
                })
                .collect();

            match strategy.trade(bars, &own_positions) {
                Allocation::None => {}
                Allocation::Weights(weights) => {
                    let targets: Vec<(Symbol, f64)> = weights.into_iter().collect();
                    portfolio.rebalance_simple(&targets, &prices);
                }
                Allocation::Orders(orders) => {
                    let price_map: FxHashMap<Symbol, i64> = prices.iter().copied().collect();
                    for order in orders {
                        if let Some(&price) = price_map.get(&order.symbol) {
                            portfolio.apply_order(order.symbol, order.delta_shares, price);
                        }
                    }
                }
            }
        }

        portfolio.record_return(&prices);
    }

    let returns = portfolio.returns().to_vec();
    let metrics = compute_metrics(&returns, 252.0, 0.0);

    BacktestResult {
        equity_curve: portfolio.equity_curve().to_vec(),
        returns,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Frequency;
    use rustc_hash::FxHashMap;

    struct BuyAndHoldHalf;

    impl Strategy for BuyAndHoldHalf {
        fn name(&self) -> &str {
            "buy_and_hold_half"
        }
        fn assets(&self) -> &[Symbol] {
            &[]
        }
        fn frequency(&self) -> Frequency {
            Frequency::new("daily")
        }
        fn trade(&self, bars: &[Bar], _own_positions: &[OwnPosition]) -> Allocation {
            let mut w = FxHashMap::default();
            if let Some(bar) = bars.first() {
                w.insert(bar.symbol, 0.5);
            }
            Allocation::Weights(w)
        }
    }

    struct NeverTrades;

    impl Strategy for NeverTrades {
        fn name(&self) -> &str {
            "never_trades"
        }
        fn assets(&self) -> &[Symbol] {
            &[]
        }
        fn frequency(&self) -> Frequency {
            Frequency::new("daily")
        }
        fn trade(&self, _bars: &[Bar], _own_positions: &[OwnPosition]) -> Allocation {
            Allocation::None
        }
    }

    fn flat_periods(n: usize, symbol: Symbol, price: i64) -> Vec<Period> {
        (0..n)
            .map(|_| {
                vec![Bar {
                    symbol,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                }]
            })
            .collect()
    }

    #[test]
    fn equity_curve_length_matches_periods() {
        let sym = Symbol::new("AAPL");
        let periods = flat_periods(40, sym, 100_00);
        let config = BacktestConfig::default();
        let result = run_backtest(&BuyAndHoldHalf, &periods, CostModel::zero(), &config);
        assert_eq!(result.equity_curve.len(), periods.len() + 1); // + initial
    }

    #[test]
    fn warmup_periods_place_no_orders() {
        let sym = Symbol::new("AAPL");
        let periods = flat_periods(10, sym, 100_00);
        let config = BacktestConfig {
            warmup_periods: 30,
            ..Default::default()
        };
        let result = run_backtest(&BuyAndHoldHalf, &periods, CostModel::zero(), &config);
        // All flat: equity curve should be constant at initial capital
        assert!(result.equity_curve.iter().all(|&e| e == config.initial_capital));
    }

    #[test]
    fn never_trades_keeps_flat_equity() {
        let sym = Symbol::new("AAPL");
        let periods = flat_periods(50, sym, 100_00);
        let config = BacktestConfig::default();
        let result = run_backtest(&NeverTrades, &periods, CostModel::zero(), &config);
        assert!(result.equity_curve.iter().all(|&e| e == config.initial_capital));
    }

    #[test]
    fn backtest_flag_clears_after_run() {
        assert!(!in_backtest());
        let sym = Symbol::new("AAPL");
        let periods = flat_periods(5, sym, 100_00);
        let _ = run_backtest(&NeverTrades, &periods, CostModel::zero(), &BacktestConfig::default());
        assert!(!in_backtest());
    }

    #[test]
    fn empty_periods_yields_only_initial_equity() {
        let result = run_backtest(&NeverTrades, &[], CostModel::zero(), &BacktestConfig::default());
        assert_eq!(result.equity_curve, vec![1_000_000_00]);
        assert!(result.returns.is_empty());
    }
}
