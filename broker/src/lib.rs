//! The broker/market-data façade the portfolio core and live agent trade
//! against, plus a configurable mock implementation for tests.
//!
//! [`BrokerFacade`] is deliberately thin: no order-book microstructure, no
//! partial-fill tracking beyond what the broker itself reports. Connecting
//! to a real venue (IBKR, a crypto exchange, ...) means implementing this
//! trait once per venue; nothing upstream (manager, adapter, agent) needs
//! to know which venue it's talking to.

pub mod error;
pub mod mock;
pub mod types;

pub use error::BrokerError;
pub use types::*;

use portfolio_core::types::Symbol;
use rustc_hash::FxHashMap;

/// A broker connection: account state, historical data, and order entry.
///
/// `buy_order`/`sell_order` are atomic — a caller never needs to separately
/// validate then submit, unlike APIs that expose a `check_order` +
/// `send_order` pair. Validation the broker itself requires (lot size,
/// buying power, market hours) happens inside the single call and surfaces
/// as a [`BrokerError`].
pub trait BrokerFacade: Send + Sync {
    /// Establish the broker connection. Idempotent: calling this while
    /// already connected is not an error.
    fn connect(&mut self) -> Result<(), BrokerError>;

    /// Current account equity, cash, and buying power.
    fn account_info(&self) -> Result<AccountInfo, BrokerError>;

    /// Fetch the most recent `count` historical bars for one symbol.
    fn get_bars(
        &self,
        symbol: Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<HistoricalBar>, BrokerError>;

    /// Fetch historical bars for several symbols in one round trip.
    /// Symbols with no data are simply absent from the result map, not an error.
    fn get_multi_bars(
        &self,
        symbols: &[Symbol],
        timeframe: Timeframe,
        count: usize,
    ) -> Result<FxHashMap<Symbol, Vec<HistoricalBar>>, BrokerError>;

    /// The minimum tradeable share increment for `symbol`. A non-positive
    /// return means "no lot constraint" to the weight-to-order adapter.
    fn lot_step(&self, symbol: Symbol) -> Result<i64, BrokerError>;

    /// Net share count currently held in `symbol`, across the whole account.
    /// Per-strategy attribution is the caller's job — see
    /// `portfolio_agent::agent::positions_for_magic`.
    fn get_shares(&self, symbol: Symbol) -> Result<i64, BrokerError>;

    /// All open tickets for the whole account, unfiltered.
    fn positions_get(&self) -> Result<Vec<Ticket>, BrokerError>;

    /// Submit a buy order for `quantity` shares, tagged with `magic`.
    fn buy_order(&self, symbol: Symbol, quantity: i64, magic: u32) -> Result<Ticket, BrokerError>;

    /// Submit a sell order for `quantity` shares, tagged with `magic`.
    fn sell_order(&self, symbol: Symbol, quantity: i64, magic: u32) -> Result<Ticket, BrokerError>;

    /// Close a single open ticket under the given fill policy.
    fn close_ticket(&self, ticket_id: u64, fill_policy: OrderFillPolicy) -> Result<(), BrokerError>;

    /// Whether the market for `symbol` is currently open for trading.
    fn is_market_open(&self, symbol: Symbol) -> Result<bool, BrokerError>;

    /// Toggle backtest mode. A real broker implementation ignores this;
    /// it exists so a shared façade instance used in both live and
    /// simulated paths can report which mode it's in.
    fn set_backtest_mode(&self, enabled: bool);

    /// Whether backtest mode is currently set.
    fn is_backtest_mode(&self) -> bool;
}

/// The last traded price for `symbol`, derived from the single most recent
/// minute bar rather than exposed as its own façade method — every
/// implementation already has to serve `get_bars`, so a dedicated
/// "current price" endpoint would just be a special case of it.
pub fn last_price(broker: &dyn BrokerFacade, symbol: Symbol) -> Result<i64, BrokerError> {
    let bars = broker.get_bars(symbol, Timeframe::M1, 1)?;
    bars.last()
        .map(|b| b.close)
        .ok_or_else(|| BrokerError::NoData(symbol.as_str().to_string()))
}
