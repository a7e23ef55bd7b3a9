//! A configurable in-memory [`BrokerFacade`] for tests — no network calls.
//!
//! ```ignore
//! use portfolio_broker::mock::MockBrokerFacade;
//! use portfolio_core::types::Symbol;
//!
//! let broker = MockBrokerFacade::builder()
//!     .with_position(Symbol::new("AAPL"), 100, 10_000)
//!     .with_account(1_000_000_00, 500_000_00, 500_000_00)
//!     .build();
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use portfolio_core::types::Symbol;
use rustc_hash::FxHashMap;

use crate::error::BrokerError;
use crate::types::{AccountInfo, HistoricalBar, OrderFillPolicy, Ticket, Timeframe};
use crate::BrokerFacade;

/// A recorded order submission, kept for test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedOrder {
    pub symbol: Symbol,
    /// Positive = buy, negative = sell.
    pub quantity: i64,
    pub magic: u32,
}

pub struct MockBrokerFacadeBuilder {
    tickets: Vec<Ticket>,
    bars: FxHashMap<Symbol, Vec<HistoricalBar>>,
    lot_steps: FxHashMap<Symbol, i64>,
    account: AccountInfo,
    market_open: bool,
    reject_fill_policies: Vec<OrderFillPolicy>,
    next_ticket_id: u64,
}

impl MockBrokerFacadeBuilder {
    pub fn with_position(mut self, symbol: Symbol, quantity: i64, magic: u32) -> Self {
        let id = self.next_ticket_id;
        self.next_ticket_id += 1;
        self.tickets.push(Ticket {
            id,
            symbol,
            quantity,
            magic: Some(magic),
        });
        self
    }

    pub fn with_bars(mut self, symbol: Symbol, bars: Vec<HistoricalBar>) -> Self {
        self.bars.insert(symbol, bars);
        self
    }

    pub fn with_lot_step(mut self, symbol: Symbol, step: i64) -> Self {
        self.lot_steps.insert(symbol, step);
        self
    }

    pub fn with_account(mut self, equity_cents: i64, cash_cents: i64, buying_power_cents: i64) -> Self {
        self.account = AccountInfo {
            equity_cents,
            cash_cents,
            buying_power_cents,
        };
        self
    }

    pub fn market_closed(mut self) -> Self {
        self.market_open = false;
        self
    }

    /// Make `close_ticket` fail for these fill policies, to exercise the
    /// live agent's `[Return, Ioc, Fok]` fallback order.
    pub fn reject_fill_policies(mut self, policies: Vec<OrderFillPolicy>) -> Self {
        self.reject_fill_policies = policies;
        self
    }

    pub fn build(self) -> MockBrokerFacade {
        MockBrokerFacade {
            connected: AtomicBool::new(false),
            backtest_mode: AtomicBool::new(false),
            tickets: Mutex::new(self.tickets),
            bars: self.bars,
            lot_steps: self.lot_steps,
            account: self.account,
            market_open: self.market_open,
            reject_fill_policies: self.reject_fill_policies,
            next_ticket_id: AtomicU64::new(self.next_ticket_id),
            orders: Mutex::new(Vec::new()),
        }
    }
}

/// An in-memory broker double. `Send + Sync` via interior mutability
/// (`Mutex`/atomics), matching the shared-reference-only methods on
/// [`BrokerFacade`] other than `connect`.
pub struct MockBrokerFacade {
    connected: AtomicBool,
    backtest_mode: AtomicBool,
    tickets: Mutex<Vec<Ticket>>,
    bars: FxHashMap<Symbol, Vec<HistoricalBar>>,
    lot_steps: FxHashMap<Symbol, i64>,
    account: AccountInfo,
    market_open: bool,
    reject_fill_policies: Vec<OrderFillPolicy>,
    next_ticket_id: AtomicU64,
    orders: Mutex<Vec<RecordedOrder>>,
}

impl MockBrokerFacade {
    pub fn builder() -> MockBrokerFacadeBuilder {
        MockBrokerFacadeBuilder {
            tickets: Vec::new(),
            bars: FxHashMap::default(),
            lot_steps: FxHashMap::default(),
            account: AccountInfo {
                equity_cents: 1_000_000_00,
                cash_cents: 1_000_000_00,
                buying_power_cents: 1_000_000_00,
            },
            market_open: true,
            reject_fill_policies: Vec::new(),
            next_ticket_id: 1,
        }
    }

    /// Orders submitted via `buy_order`/`sell_order`, for test assertions.
    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.orders.lock().unwrap().clone()
    }

    fn require_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn submit(&self, symbol: Symbol, quantity: i64, magic: u32) -> Result<Ticket, BrokerError> {
        self.require_connected()?;
        self.orders.lock().unwrap().push(RecordedOrder {
            symbol,
            quantity,
            magic,
        });
        let id = self.next_ticket_id.fetch_add(1, Ordering::SeqCst);
        let ticket = Ticket {
            id,
            symbol,
            quantity,
            magic: Some(magic),
        };
        self.tickets.lock().unwrap().push(ticket);
        Ok(ticket)
    }
}

impl BrokerFacade for MockBrokerFacade {
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn account_info(&self) -> Result<AccountInfo, BrokerError> {
        self.require_connected()?;
        Ok(self.account)
    }

    fn get_bars(
        &self,
        symbol: Symbol,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<HistoricalBar>, BrokerError> {
        self.require_connected()?;
        let bars = self.bars.get(&symbol).cloned().unwrap_or_default();
        let start = bars.len().saturating_sub(count);
        Ok(bars[start..].to_vec())
    }

    fn get_multi_bars(
        &self,
        symbols: &[Symbol],
        timeframe: Timeframe,
        count: usize,
    ) -> Result<FxHashMap<Symbol, Vec<HistoricalBar>>, BrokerError> {
        self.require_connected()?;
        let mut out = FxHashMap::default();
        for &sym in symbols {
            let bars = self.get_bars(sym, timeframe, count)?;
            if !bars.is_empty() {
                out.insert(sym, bars);
            }
        }
        Ok(out)
    }

    fn lot_step(&self, symbol: Symbol) -> Result<i64, BrokerError> {
        self.require_connected()?;
        Ok(self.lot_steps.get(&symbol).copied().unwrap_or(1))
    }

    fn get_shares(&self, symbol: Symbol) -> Result<i64, BrokerError> {
        self.require_connected()?;
        let tickets = self.tickets.lock().unwrap();
        Ok(tickets.iter().filter(|t| t.symbol == symbol).map(|t| t.quantity).sum())
    }

    fn positions_get(&self) -> Result<Vec<Ticket>, BrokerError> {
        self.require_connected()?;
        Ok(self.tickets.lock().unwrap().clone())
    }

    fn buy_order(&self, symbol: Symbol, quantity: i64, magic: u32) -> Result<Ticket, BrokerError> {
        if quantity <= 0 {
            return Err(BrokerError::Order("buy quantity must be positive".into()));
        }
        self.submit(symbol, quantity, magic)
    }

    fn sell_order(&self, symbol: Symbol, quantity: i64, magic: u32) -> Result<Ticket, BrokerError> {
        if quantity <= 0 {
            return Err(BrokerError::Order("sell quantity must be positive".into()));
        }
        self.submit(symbol, -quantity, magic)
    }

    fn close_ticket(&self, ticket_id: u64, fill_policy: OrderFillPolicy) -> Result<(), BrokerError> {
        self.require_connected()?;
        if self.reject_fill_policies.contains(&fill_policy) {
            return Err(BrokerError::Order(format!("fill policy {fill_policy:?} rejected")));
        }
        let mut tickets = self.tickets.lock().unwrap();
        let before = tickets.len();
        tickets.retain(|t| t.id != ticket_id);
        if tickets.len() == before {
            return Err(BrokerError::UnknownTicket(ticket_id));
        }
        Ok(())
    }

    fn is_market_open(&self, _symbol: Symbol) -> Result<bool, BrokerError> {
        self.require_connected()?;
        Ok(self.market_open)
    }

    fn set_backtest_mode(&self, enabled: bool) {
        self.backtest_mode.store(enabled, Ordering::SeqCst);
    }

    fn is_backtest_mode(&self) -> bool {
        self.backtest_mode.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> Symbol {
        Symbol::new("AAPL")
    }

    fn connected_broker() -> MockBrokerFacade {
        let mut broker = MockBrokerFacade::builder()
            .with_position(aapl(), 100, 10_000)
            .with_account(1_000_000_00, 500_000_00, 500_000_00)
            .build();
        broker.connect().unwrap();
        broker
    }

    #[test]
    fn not_connected_errors() {
        let broker = MockBrokerFacade::builder().build();
        assert!(broker.account_info().is_err());
    }

    #[test]
    fn get_shares_sums_across_whole_account() {
        let broker = connected_broker();
        assert_eq!(broker.get_shares(aapl()).unwrap(), 100);
        assert_eq!(broker.get_shares(Symbol::new("MSFT")).unwrap(), 0);
    }

    #[test]
    fn buy_and_sell_orders_recorded() {
        let broker = connected_broker();
        broker.buy_order(aapl(), 10, 10_000).unwrap();
        broker.sell_order(aapl(), 5, 10_000).unwrap();
        let orders = broker.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].quantity, 10);
        assert_eq!(orders[1].quantity, -5);
    }

    #[test]
    fn zero_or_negative_quantity_rejected() {
        let broker = connected_broker();
        assert!(broker.buy_order(aapl(), 0, 1).is_err());
        assert!(broker.sell_order(aapl(), -1, 1).is_err());
    }

    #[test]
    fn close_ticket_removes_it() {
        let broker = connected_broker();
        let tickets = broker.positions_get().unwrap();
        let id = tickets[0].id;
        broker.close_ticket(id, OrderFillPolicy::Return).unwrap();
        assert!(broker.positions_get().unwrap().is_empty());
    }

    #[test]
    fn close_ticket_unknown_id_errors() {
        let broker = connected_broker();
        assert!(matches!(
            broker.close_ticket(999, OrderFillPolicy::Return),
            Err(BrokerError::UnknownTicket(999))
        ));
    }

    #[test]
    fn fallback_through_fill_policies() {
        let broker_builder = MockBrokerFacade::builder()
            .with_position(aapl(), 100, 10_000)
            .reject_fill_policies(vec![OrderFillPolicy::Return, OrderFillPolicy::Ioc]);
        let mut broker = broker_builder.build();
        broker.connect().unwrap();
        let ticket_id = broker.positions_get().unwrap()[0].id;

        let mut result = Err(BrokerError::Other("unused".into()));
        for policy in OrderFillPolicy::FALLBACK_ORDER {
            result = broker.close_ticket(ticket_id, policy);
            if result.is_ok() {
                break;
            }
        }
        assert!(result.is_ok(), "FOK should have succeeded after Return and Ioc were rejected");
    }

    #[test]
    fn backtest_mode_flag_round_trips() {
        let broker = MockBrokerFacade::builder().build();
        assert!(!broker.is_backtest_mode());
        broker.set_backtest_mode(true);
        assert!(broker.is_backtest_mode());
    }

    #[test]
    fn bars_return_last_count() {
        let sym = aapl();
        let bars: Vec<HistoricalBar> = (0..10)
            .map(|i| HistoricalBar {
                symbol: sym,
                timestamp: i,
                open: 100_00,
                high: 101_00,
                low: 99_00,
                close: 100_00 + i,
                volume: 1000,
            })
            .collect();
        let mut broker = MockBrokerFacade::builder().with_bars(sym, bars).build();
        broker.connect().unwrap();
        let recent = broker.get_bars(sym, Timeframe::D1, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent.last().unwrap().close, 109_00);
    }
}
