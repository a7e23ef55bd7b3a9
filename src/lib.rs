// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! # portfolio-core
//!
//! The multi-strategy portfolio orchestration core: converts a roster of
//! strategies into a single blended allocation, and that allocation into
//! orders, with no knowledge of how those orders actually reach a broker.
//!
//! This crate is the shared foundation for two callers: a backtester that
//! simulates fills against historical bars, and a live agent
//! (`portfolio-agent`) that drives a real broker via a façade trait defined
//! in `portfolio-broker`. Both build on the same pieces:
//!
//! - [`strategy`] — the `Strategy` trait strategies implement, and the
//!   `Allocation` they hand back each tick.
//! - [`optimizer`] — turns a matrix of per-strategy equity curves into
//!   blended weights (equal-weight or Sharpe-maximizing).
//! - [`manager`] — owns the strategy roster, applies an optimizer, and
//!   scales total exposure to a target volatility via a leverage factor.
//! - [`adapter`] — quantizes target weights into lot-sized, dead-zoned
//!   share orders against current positions.
//! - [`backtest`] — walks a single strategy bar-by-bar against a simulated
//!   [`portfolio::Portfolio`] to produce the equity curve the manager
//!   optimizes over.
//! - [`portfolio`] — the notional ledger (positions, cash, cost model,
//!   metrics) both the backtester and a live agent's trade tick use.
//!
//! ## Quick start: backtesting one strategy
//!
//! ```
//! use portfolio_core::backtest::{run_backtest, BacktestConfig};
//! use portfolio_core::portfolio::CostModel;
//! use portfolio_core::strategy::{Allocation, Bar, OwnPosition, Strategy, Frequency};
//! use portfolio_core::types::Symbol;
//! use rustc_hash::FxHashMap;
//!
//! struct EqualWeightAapl;
//!
//! impl Strategy for EqualWeightAapl {
//!     fn name(&self) -> &str { "equal_weight_aapl" }
//!     fn assets(&self) -> &[Symbol] { &[] }
//!     fn frequency(&self) -> Frequency { Frequency::new("daily") }
//!     fn trade(&self, bars: &[Bar], _own_positions: &[OwnPosition]) -> Allocation {
//!         let mut weights = FxHashMap::default();
//!         if let Some(bar) = bars.first() {
//!             weights.insert(bar.symbol, 1.0);
//!         }
//!         Allocation::Weights(weights)
//!     }
//! }
//!
//! let symbol = Symbol::new("AAPL");
//! let periods: Vec<Vec<Bar>> = (0..40i64)
//!     .map(|i| vec![Bar { symbol, open: 100_00, high: 100_00, low: 100_00, close: 100_00 + i }])
//!     .collect();
//!
//! let result = run_backtest(&EqualWeightAapl, &periods, CostModel::zero(), &BacktestConfig::default());
//! assert_eq!(result.equity_curve.len(), periods.len() + 1);
//! ```
//!
//! ## Weight-to-order sizing
//!
//! ```
//! use portfolio_core::adapter::weights_to_orders;
//! use portfolio_core::types::Symbol;
//! use rustc_hash::FxHashMap;
//!
//! let nvda = Symbol::new("NVDA");
//! let mut weights = FxHashMap::default();
//! weights.insert(nvda, 0.6);
//! let mut prices = FxHashMap::default();
//! prices.insert(nvda, 100_00);
//!
//! let orders = weights_to_orders(&weights, 10_000_00, &FxHashMap::default(), &prices, &FxHashMap::default());
//! assert_eq!(orders[0].delta_shares, 60); // $6,000 / $100 = 60 shares
//! ```
//!
//! ## Price Representation
//!
//! Monetary values are [`i64`] in the smallest currency unit (cents), to
//! avoid floating-point error accumulating across a long-running agent:
//!
//! ```
//! use portfolio_core::types::Price;
//!
//! let price = Price(100_50); // $100.50
//! assert_eq!(format!("{}", price), "$100.50");
//! ```

pub mod adapter;
pub mod backtest;
mod error;
pub mod manager;
pub mod optimizer;
pub mod portfolio;
pub mod strategy;
pub mod types;

pub use adapter::{OrderIntent, weights_to_orders};
pub use error::ValidationError;
pub use manager::{ManagerError, PortfolioManager, PortfolioStatus, StrategyHandle};
pub use optimizer::{EqualWeightOptimizer, EquityCurveMatrix, Optimizer, SharpeOptimizer};
pub use portfolio::{CostModel, Metrics, Portfolio, PortfolioSnapshot};
pub use strategy::{Allocation, Bar, Frequency, OwnPosition, RebalanceOrder, Strategy, CASH_SYMBOL};
pub use types::{OrderId, Price, Quantity, Symbol, SymbolError, Timestamp, TradeId};
