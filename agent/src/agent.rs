//! The live portfolio agent: a scheduler loop that ties a
//! [`PortfolioManager`] and its registered strategies to a real (or
//! paper-trading) broker.
//!
//! Callers own the process: `run` loops until the caller clears a shared
//! `running` flag (e.g. from a `ctrl_c` handler wired up at the binary's
//! own entry point — this crate carries no signal-handling dependency of
//! its own, and no forced flatten happens on shutdown, matching a clean
//! `Ctrl-C` break in the original control loop).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use portfolio_broker::{BrokerFacade, OrderFillPolicy, Ticket, Timeframe};
use portfolio_core::adapter::weights_to_orders;
use portfolio_core::backtest::{run_backtest, BacktestConfig, Period};
use portfolio_core::manager::PortfolioManager;
use portfolio_core::optimizer::EquityCurveMatrix;
use portfolio_core::portfolio::CostModel;
use portfolio_core::strategy::{Allocation, Bar, OwnPosition, Strategy, CASH_SYMBOL};
use portfolio_core::types::Symbol;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::audit::{self, AuditLog};
use crate::error::{AgentError, Result};
use crate::state::{AgentState, StateStore};

/// Hard floor on rebalance frequency, regardless of how short a
/// configured `rebalance_interval` is — an anti-thrash backstop, not the
/// cadence itself.
const MIN_REBALANCE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How often the control loop wakes to check whether a tick is due.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Daily bars fetched for the per-strategy lookback backtest that drives
/// each rebalance.
const REBALANCE_LOOKBACK_BARS: usize = 90;

/// Notional starting capital for the lookback backtest. Strategies are
/// compared on equal footing regardless of the live portfolio's actual
/// size, matching a frictionless paper run.
const REBALANCE_NOTIONAL_CAPITAL: i64 = 100_000_00;

/// A rebalance aborts (keeping previous weights, leaving
/// `last_rebalance_ts` unset) unless at least this many strategies
/// produced a usable backtest equity curve.
const MIN_SUCCESSFUL_BACKTESTS: usize = 2;

/// Pause after toggling the façade out of backtest mode and before any
/// live order is placed, so a façade that only settles its mode flag
/// asynchronously has time to catch up.
const BACKTEST_SETTLE_PAUSE: Duration = Duration::from_millis(500);

/// Where the live agent's control loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Starting,
    Flattening,
    Running,
    Stopping,
}

/// Net positions opened under `magic`, netted per symbol from the
/// broker's unfiltered ticket list — per-strategy attribution happens
/// here, not inside the broker façade.
pub fn positions_for_magic(tickets: &[Ticket], magic: u32) -> FxHashMap<Symbol, OwnPosition> {
    let mut out: FxHashMap<Symbol, OwnPosition> = FxHashMap::default();
    for ticket in tickets {
        if ticket.magic != Some(magic) {
            continue;
        }
        out.entry(ticket.symbol)
            .and_modify(|p| p.quantity += ticket.quantity)
            .or_insert(OwnPosition {
                symbol: ticket.symbol,
                quantity: ticket.quantity,
            });
    }
    out
}

/// Ties a [`PortfolioManager`] and its strategies to a broker and durable state.
pub struct LiveAgent<B: BrokerFacade> {
    broker: B,
    manager: PortfolioManager,
    slots: FxHashMap<String, Box<dyn Strategy>>,
    state_store: StateStore,
    state: AgentState,
    audit: Option<AuditLog>,
    /// Configurable rebalance cadence. Must also clear
    /// `min_rebalance_interval` before a rebalance actually fires.
    rebalance_interval: Duration,
    /// Hard anti-thrash floor, independent of `rebalance_interval`.
    min_rebalance_interval: Duration,
    phase: AgentPhase,
}

impl<B: BrokerFacade> LiveAgent<B> {
    /// Construct an agent. `strategies` must have exactly one entry per
    /// name in `manager`'s roster (in any order) — a mismatch is a
    /// configuration error caught here rather than a confusing runtime
    /// failure later when a magic number can't be resolved to a strategy.
    pub fn new(
        broker: B,
        manager: PortfolioManager,
        strategies: Vec<Box<dyn Strategy>>,
        state_path: impl Into<std::path::PathBuf>,
    ) -> Result<Self> {
        let mut slots: FxHashMap<String, Box<dyn Strategy>> = FxHashMap::default();
        for strategy in strategies {
            slots.insert(strategy.name().to_string(), strategy);
        }

        for handle in manager.handles() {
            if !slots.contains_key(&handle.name) {
                return Err(AgentError::Configuration(format!(
                    "no strategy registered for manager slot {:?}",
                    handle.name
                )));
            }
        }

        let state_store = StateStore::new(state_path);
        let state = state_store.load_or_default();

        Ok(Self {
            broker,
            manager,
            slots,
            state_store,
            state,
            audit: None,
            rebalance_interval: MIN_REBALANCE_INTERVAL,
            min_rebalance_interval: MIN_REBALANCE_INTERVAL,
            phase: AgentPhase::Starting,
        })
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set the rebalance cadence. Still gated by `min_rebalance_interval`
    /// underneath — a cadence shorter than the hard floor never fires
    /// more often than the floor allows.
    pub fn with_rebalance_interval(mut self, interval: Duration) -> Self {
        self.rebalance_interval = interval;
        self
    }

    /// Override the hard anti-thrash floor. Only useful for tests —
    /// production callers should rely on the default 5-minute floor.
    pub fn with_min_rebalance_interval(mut self, interval: Duration) -> Self {
        self.min_rebalance_interval = interval;
        self
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    fn log_audit(&mut self, f: impl FnOnce(&mut AuditLog) -> Result<()>) {
        if let Some(audit) = &mut self.audit {
            if let Err(e) = f(audit) {
                warn!("audit log write failed: {e}");
            }
        }
    }

    /// Run the full control loop until `running` is cleared.
    ///
    /// `STARTING` -> flatten all open tickets -> `RUNNING`: an immediate
    /// trade tick, then poll every second, firing a rebalance tick whenever
    /// `min_rebalance_interval` has elapsed. No forced flatten on shutdown.
    pub fn run(&mut self, running: Arc<AtomicBool>) -> Result<()> {
        self.broker.connect()?;
        self.phase = AgentPhase::Flattening;
        self.startup_flatten();

        self.phase = AgentPhase::Running;
        info!("agent entering RUNNING phase with {} strategies", self.slots.len());
        self.log_audit(|a| audit::log_run_started(a, self.manager.handles().len()));

        self.trade_tick();

        while running.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let due = match self.state.last_rebalance_ts {
                None => true,
                Some(last) => {
                    let elapsed = Utc::now().signed_duration_since(last).to_std().unwrap_or(Duration::ZERO);
                    elapsed >= self.rebalance_interval && elapsed >= self.min_rebalance_interval
                }
            };

            if due {
                self.rebalance_tick();
            }
            self.trade_tick();
        }

        self.phase = AgentPhase::Stopping;
        info!("agent stopping; no forced flatten on shutdown");
        Ok(())
    }

    /// Close every open ticket individually, trying fill policies in
    /// `[Return, Ioc, Fok]` order. A ticket that fails under all three is
    /// logged and left open — a startup flatten that can't fully clear
    /// the book is not treated as fatal, since the agent still has a
    /// correct (if non-empty) view of current positions to rebalance from.
    fn startup_flatten(&mut self) {
        let tickets = match self.broker.positions_get() {
            Ok(t) => t,
            Err(e) => {
                warn!("startup flatten: failed to list positions: {e}");
                return;
            }
        };

        for ticket in tickets {
            let mut closed = false;
            for policy in OrderFillPolicy::FALLBACK_ORDER {
                match self.broker.close_ticket(ticket.id, policy) {
                    Ok(()) => {
                        closed = true;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "startup flatten: ticket {} under {policy:?} failed: {e}",
                            ticket.id
                        );
                    }
                }
            }
            if !closed {
                warn!("startup flatten: ticket {} could not be closed, left open", ticket.id);
            }
            self.log_audit(|a| audit::log_ticket_closed(a, ticket.symbol.as_str(), ticket.id, closed));
        }
    }

    /// Every asset traded by any registered strategy, deduped and sorted
    /// for deterministic iteration.
    fn all_assets(&self) -> Vec<Symbol> {
        let set: FxHashSet<Symbol> = self.slots.values().flat_map(|s| s.assets().iter().copied()).collect();
        let mut assets: Vec<Symbol> = set.into_iter().collect();
        assets.sort();
        assets
    }

    /// One pass over every strategy: fetch its bars and own positions,
    /// ask it for an allocation, size and submit orders.
    ///
    /// Skips the whole tick if the market is closed, checked against the
    /// first traded asset — a strategy roster with no assets never blocks.
    fn trade_tick(&mut self) {
        let assets_in_play = self.all_assets();
        if let Some(&first) = assets_in_play.first() {
            match self.broker.is_market_open(first) {
                Ok(true) => {}
                Ok(false) => {
                    info!("trade tick: market closed, skipping tick");
                    return;
                }
                Err(e) => {
                    warn!("trade tick: is_market_open failed, skipping tick: {e}");
                    return;
                }
            }
        }

        let total_equity_cents = match self.broker.account_info() {
            Ok(info) => info.equity_cents,
            Err(e) => {
                warn!("trade tick: account_info failed, skipping tick: {e}");
                return;
            }
        };
        self.state.total_equity_cents = total_equity_cents;

        let allocations = self.manager.allocate_capital(total_equity_cents);

        let tickets = match self.broker.positions_get() {
            Ok(t) => t,
            Err(e) => {
                warn!("trade tick: positions_get failed, skipping tick: {e}");
                return;
            }
        };

        let handles = self.manager.handles().to_vec();
        for handle in handles {
            let Some(slot) = self.slots.get(&handle.name) else {
                continue;
            };
            let assets = slot.assets().to_vec();
            if assets.is_empty() {
                continue;
            }

            let bars_by_symbol = match self.broker.get_multi_bars(&assets, Timeframe::D1, 1) {
                Ok(b) => b,
                Err(e) => {
                    warn!("trade tick: {}: get_multi_bars failed: {e}", handle.name);
                    continue;
                }
            };
            let bars: Vec<Bar> = bars_by_symbol
                .values()
                .filter_map(|bars| bars.last())
                .map(|b| Bar {
                    symbol: b.symbol,
                    open: b.open,
                    high: b.high,
                    low: b.low,
                    close: b.close,
                })
                .collect();

            let positions_by_symbol = positions_for_magic(&tickets, handle.magic);
            let own_positions: Vec<OwnPosition> = assets
                .iter()
                .filter_map(|sym| positions_by_symbol.get(sym).copied())
                .filter(|p| p.quantity != 0)
                .collect();

            let strategy_equity = allocations.get(&handle.name).copied().unwrap_or(0);

            let allocation = self.slots[&handle.name].trade(&bars, &own_positions);
            self.submit_allocation(&handle.name, handle.magic, strategy_equity, allocation, &bars, &own_positions);
        }
    }

    fn submit_allocation(
        &mut self,
        name: &str,
        magic: u32,
        strategy_equity_cents: i64,
        allocation: Allocation,
        bars: &[Bar],
        own_positions: &[OwnPosition],
    ) {
        let orders: Vec<(Symbol, i64)> = match allocation {
            Allocation::None => Vec::new(),
            Allocation::Orders(orders) => orders.into_iter().map(|o| (o.symbol, o.delta_shares)).collect(),
            Allocation::Weights(weights) => {
                if weights.keys().all(|s| s.as_str() == CASH_SYMBOL) {
                    Vec::new()
                } else {
                    let prices: FxHashMap<Symbol, i64> = bars.iter().map(|b| (b.symbol, b.close)).collect();
                    let current: FxHashMap<Symbol, i64> =
                        own_positions.iter().map(|p| (p.symbol, p.quantity)).collect();
                    let lot_steps: FxHashMap<Symbol, i64> = prices
                        .keys()
                        .filter_map(|&sym| self.broker.lot_step(sym).ok().map(|step| (sym, step)))
                        .collect();

                    weights_to_orders(&weights, strategy_equity_cents, &current, &prices, &lot_steps)
                        .into_iter()
                        .map(|o| (o.symbol, o.delta_shares))
                        .collect()
                }
            }
        };

        for (symbol, delta) in orders {
            let result = if delta > 0 {
                self.broker.buy_order(symbol, delta, magic)
            } else {
                self.broker.sell_order(symbol, -delta, magic)
            };
            match result {
                Ok(_) => {
                    self.log_audit(|a| audit::log_order_submitted(a, symbol.as_str(), delta, magic));
                }
                Err(e) => warn!("{name}: order for {symbol} ({delta} shares) failed: {e}"),
            }
        }
    }

    /// Fetch `REBALANCE_LOOKBACK_BARS` daily bars for `assets` and align
    /// them into time-ordered periods, one bar per traded symbol per
    /// period. Returns `None` if any symbol has no data at all.
    fn fetch_lookback_periods(&self, assets: &[Symbol]) -> Option<Vec<Period>> {
        if assets.is_empty() {
            return None;
        }
        let by_symbol = self
            .broker
            .get_multi_bars(assets, Timeframe::D1, REBALANCE_LOOKBACK_BARS)
            .ok()?;
        let len = assets.iter().filter_map(|s| by_symbol.get(s).map(Vec::len)).min().unwrap_or(0);
        if len == 0 {
            return None;
        }

        let mut periods = Vec::with_capacity(len);
        for i in 0..len {
            let bars: Vec<Bar> = assets
                .iter()
                .filter_map(|sym| by_symbol.get(sym))
                .map(|hist| {
                    let b = &hist[hist.len() - len + i];
                    Bar {
                        symbol: b.symbol,
                        open: b.open,
                        high: b.high,
                        low: b.low,
                        close: b.close,
                    }
                })
                .collect();
            periods.push(bars);
        }
        Some(periods)
    }

    /// Re-optimize weights by backtesting every registered strategy over
    /// the same lookback window at notional capital, then feeding the
    /// resulting equity curves to the manager.
    ///
    /// Aborts (keeping previous weights, leaving `last_rebalance_ts`
    /// unset so the next tick retries) unless at least
    /// `MIN_SUCCESSFUL_BACKTESTS` strategies produced usable data.
    fn rebalance_tick(&mut self) {
        self.broker.set_backtest_mode(true);

        let mut curves: Vec<(String, Vec<i64>)> = Vec::new();
        for handle in self.manager.handles().to_vec() {
            let Some(strategy) = self.slots.get(&handle.name) else {
                continue;
            };
            let assets = strategy.assets().to_vec();
            let Some(periods) = self.fetch_lookback_periods(&assets) else {
                continue;
            };
            let config = BacktestConfig {
                initial_capital: REBALANCE_NOTIONAL_CAPITAL,
                ..Default::default()
            };
            let result = run_backtest(strategy.as_ref(), &periods, CostModel::zero(), &config);
            if result.equity_curve.is_empty() {
                continue;
            }
            curves.push((handle.name.clone(), result.equity_curve));
        }

        self.broker.set_backtest_mode(false);
        thread::sleep(BACKTEST_SETTLE_PAUSE);

        if curves.len() < MIN_SUCCESSFUL_BACKTESTS {
            warn!(
                "rebalance tick: only {} of {} strategies produced a backtest, keeping previous weights",
                curves.len(),
                self.manager.handles().len()
            );
            self.log_audit(|a| audit::log_degraded(a, "manager", "too few successful backtests"));
            return;
        }

        let len = curves.iter().map(|(_, c)| c.len()).min().unwrap_or(0);
        let columns: Vec<String> = curves.iter().map(|(name, _)| name.clone()).collect();
        let rows: Vec<Vec<f64>> = (0..len)
            .map(|i| curves.iter().map(|(_, c)| c[c.len() - len + i] as f64).collect())
            .collect();

        self.manager.update_weights(&EquityCurveMatrix::new(columns, rows));

        self.state.weights = self
            .manager
            .weights()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        self.state.current_leverage = self.manager.current_leverage();
        self.state.realized_volatility = self.manager.realized_volatility();
        self.state.last_rebalance_ts = Some(Utc::now());

        let successful_backtests = curves.len();
        self.log_audit(|a| {
            audit::log_rebalance(a, self.state.total_equity_cents, self.state.current_leverage, successful_backtests)
        });

        if let Err(e) = self.state_store.save(&self.state) {
            warn!("failed to persist agent state: {e}");
        } else {
            let path = self.state_store.path_display();
            self.log_audit(|a| audit::log_state_saved(a, &path));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_broker::mock::MockBrokerFacade;
    use portfolio_broker::HistoricalBar;
    use portfolio_core::manager::PortfolioManager;
    use portfolio_core::optimizer::EqualWeightOptimizer;
    use portfolio_core::strategy::Frequency;

    struct BuyFixedShares {
        name: String,
        asset: Symbol,
        shares: i64,
    }

    impl Strategy for BuyFixedShares {
        fn name(&self) -> &str {
            &self.name
        }
        fn assets(&self) -> &[Symbol] {
            std::slice::from_ref(&self.asset)
        }
        fn frequency(&self) -> Frequency {
            Frequency::new("daily")
        }
        fn trade(&self, _bars: &[Bar], _own_positions: &[OwnPosition]) -> Allocation {
            Allocation::Orders(vec![portfolio_core::strategy::RebalanceOrder {
                symbol: self.asset,
                delta_shares: self.shares,
            }])
        }
    }

    fn aapl() -> Symbol {
        Symbol::new("AAPL")
    }

    fn bars(symbol: Symbol, close: i64) -> Vec<HistoricalBar> {
        vec![HistoricalBar {
            symbol,
            timestamp: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }]
    }

    fn make_agent(dir: &std::path::Path) -> LiveAgent<MockBrokerFacade> {
        let broker = MockBrokerFacade::builder()
            .with_bars(aapl(), bars(aapl(), 100_00))
            .with_account(1_000_000_00, 1_000_000_00, 1_000_000_00)
            .build();
        let manager = PortfolioManager::new(
            vec!["buy_aapl".to_string()],
            Box::new(EqualWeightOptimizer),
            0.1,
            2.0,
            None,
        )
        .unwrap();
        let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(BuyFixedShares {
            name: "buy_aapl".to_string(),
            asset: aapl(),
            shares: 10,
        })];
        LiveAgent::new(broker, manager, strategies, dir.join("state.json")).unwrap()
    }

    #[test]
    fn construction_rejects_missing_strategy() {
        let broker = MockBrokerFacade::builder().build();
        let manager = PortfolioManager::new(
            vec!["a".to_string(), "b".to_string()],
            Box::new(EqualWeightOptimizer),
            0.1,
            2.0,
            None,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = LiveAgent::new(broker, manager, vec![], dir.path().join("state.json")).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[test]
    fn startup_flatten_closes_all_tickets() {
        let broker = MockBrokerFacade::builder()
            .with_position(aapl(), 50, 10_000)
            .with_account(1_000_000_00, 1_000_000_00, 1_000_000_00)
            .build();
        let manager = PortfolioManager::new(
            vec!["buy_aapl".to_string()],
            Box::new(EqualWeightOptimizer),
            0.1,
            2.0,
            None,
        )
        .unwrap();
        let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(BuyFixedShares {
            name: "buy_aapl".to_string(),
            asset: aapl(),
            shares: 10,
        })];
        let dir = tempfile::tempdir().unwrap();
        let mut agent = LiveAgent::new(broker, manager, strategies, dir.path().join("state.json")).unwrap();
        agent.broker.connect().unwrap();
        agent.startup_flatten();
        assert!(agent.broker.positions_get().unwrap().is_empty());
    }

    #[test]
    fn trade_tick_submits_strategy_orders() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = make_agent(dir.path());
        agent.broker.connect().unwrap();
        agent.trade_tick();
        let orders = agent.broker.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].quantity, 10);
        assert_eq!(orders[0].magic, 10_000);
    }

    #[test]
    fn trade_tick_skips_when_market_closed() {
        let dir = tempfile::tempdir().unwrap();
        let broker = MockBrokerFacade::builder()
            .with_bars(aapl(), bars(aapl(), 100_00))
            .with_account(1_000_000_00, 1_000_000_00, 1_000_000_00)
            .market_closed()
            .build();
        let manager = PortfolioManager::new(
            vec!["buy_aapl".to_string()],
            Box::new(EqualWeightOptimizer),
            0.1,
            2.0,
            None,
        )
        .unwrap();
        let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(BuyFixedShares {
            name: "buy_aapl".to_string(),
            asset: aapl(),
            shares: 10,
        })];
        let mut agent = LiveAgent::new(broker, manager, strategies, dir.path().join("state.json")).unwrap();
        agent.broker.connect().unwrap();
        agent.trade_tick();
        assert!(agent.broker.orders().is_empty());
    }

    fn make_two_strategy_agent(dir: &std::path::Path) -> LiveAgent<MockBrokerFacade> {
        let msft = Symbol::new("MSFT");
        let broker = MockBrokerFacade::builder()
            .with_bars(aapl(), bars(aapl(), 100_00))
            .with_bars(msft, bars(msft, 200_00))
            .with_account(1_000_000_00, 1_000_000_00, 1_000_000_00)
            .build();
        let manager = PortfolioManager::new(
            vec!["buy_aapl".to_string(), "buy_msft".to_string()],
            Box::new(EqualWeightOptimizer),
            0.1,
            2.0,
            None,
        )
        .unwrap();
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(BuyFixedShares {
                name: "buy_aapl".to_string(),
                asset: aapl(),
                shares: 10,
            }),
            Box::new(BuyFixedShares {
                name: "buy_msft".to_string(),
                asset: msft,
                shares: 5,
            }),
        ];
        LiveAgent::new(broker, manager, strategies, dir.join("state.json")).unwrap()
    }

    #[test]
    fn rebalance_tick_aborts_with_fewer_than_two_successful_backtests() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = make_agent(dir.path());
        agent.broker.connect().unwrap();
        agent.rebalance_tick();
        assert!(agent.state.last_rebalance_ts.is_none());
        assert!(!agent.broker.is_backtest_mode());
    }

    #[test]
    fn rebalance_tick_runs_with_two_successful_backtests() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = make_two_strategy_agent(dir.path());
        agent.broker.connect().unwrap();
        agent.rebalance_tick();
        assert!(agent.state.last_rebalance_ts.is_some());
        assert!(!agent.broker.is_backtest_mode());
    }

    #[test]
    fn positions_for_magic_nets_same_symbol_tickets() {
        let sym = aapl();
        let tickets = vec![
            Ticket {
                id: 1,
                symbol: sym,
                quantity: 10,
                magic: Some(10_000),
            },
            Ticket {
                id: 2,
                symbol: sym,
                quantity: 5,
                magic: Some(10_000),
            },
            Ticket {
                id: 3,
                symbol: sym,
                quantity: 100,
                magic: Some(99_999),
            },
        ];
        let positions = positions_for_magic(&tickets, 10_000);
        assert_eq!(positions.get(&sym).unwrap().quantity, 15);
        assert_eq!(positions.len(), 1);
    }
}
