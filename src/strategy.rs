//! The strategy contract: turning a price history and current positions into
//! a desired allocation, without knowledge of order sizing or broker details.
//!
//! A strategy is deliberately narrow — it never sees cash balances, lot
//! sizes, or the broker façade. Converting its output into orders is the
//! job of the weight-to-order adapter (see [`crate::adapter`]).

use crate::types::Symbol;
use rustc_hash::FxHashMap;
use std::fmt;

/// One bar of OHLC price history for a single symbol.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bar {
    pub symbol: Symbol,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
}

/// A strategy's own view of a position, scoped to shares it is responsible
/// for (magic-number filtered at the agent level — see [`crate::manager`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OwnPosition {
    pub symbol: Symbol,
    /// Signed share count; positive long, negative short.
    pub quantity: i64,
}

/// How often a strategy wants to be re-evaluated.
///
/// An opaque wrapper around a scheduling string (`"daily"`, `"weekly"`,
/// `"4h"`, ...) rather than a closed enum: strategies and the live agent's
/// scheduler both only need to compare and display the value, never branch
/// on a fixed set of cases, and a new cadence should never require a crate
/// release.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frequency(String);

impl Frequency {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The minimum time between rebalances this frequency implies, in seconds.
    ///
    /// Falls back to the live agent's hard floor (5 minutes) for labels it
    /// doesn't recognize, rather than erroring — an unrecognized frequency
    /// string is a strategy-author typo, not a fatal condition.
    pub fn min_interval_secs(&self) -> u64 {
        match self.0.as_str() {
            "minute" | "1m" => 60,
            "5m" => 5 * 60,
            "15m" => 15 * 60,
            "hourly" | "1h" => 60 * 60,
            "4h" => 4 * 60 * 60,
            "daily" => 24 * 60 * 60,
            "weekly" => 7 * 24 * 60 * 60,
            "monthly" => 30 * 24 * 60 * 60,
            _ => 5 * 60,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The allocation a strategy produces on a given tick.
///
/// A discriminated union rather than always-a-weight-map: a strategy may
/// have nothing new to say this tick (`None`), may want to express
/// conviction directly as share counts (`Orders`), or — the common case —
/// may hand back target portfolio weights for the adapter to size
/// (`Weights`). Cash is tracked as an ordinary entry in the weight map
/// under [`CASH_SYMBOL`] and is never turned into an order.
#[derive(Clone, Debug, PartialEq)]
pub enum Allocation {
    /// No change this tick — leave existing positions untouched.
    None,
    /// Directly specified share-count orders, bypassing the adapter's sizing.
    Orders(Vec<RebalanceOrder>),
    /// Target weights, summing to at most 1.0 including any cash entry.
    Weights(FxHashMap<Symbol, f64>),
}

/// A single desired trade, expressed as a signed share delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RebalanceOrder {
    pub symbol: Symbol,
    /// Positive to buy, negative to sell.
    pub delta_shares: i64,
}

/// The ticker reserved for the cash weight inside an [`Allocation::Weights`] map.
pub const CASH_SYMBOL: &str = "CASH";

/// A pluggable trading strategy.
///
/// Implementors are given only what they need to decide an allocation:
/// their own price history and their own previously-assigned positions.
/// They never see the portfolio manager's leverage factor, other
/// strategies' positions, or the broker façade.
pub trait Strategy: Send + Sync {
    /// A short, stable name used for logging and magic-number attribution.
    fn name(&self) -> &str;

    /// The symbols this strategy trades. Bars for any other symbol are
    /// never passed to [`Strategy::trade`].
    fn assets(&self) -> &[Symbol];

    /// How often this strategy wants to be re-evaluated.
    fn frequency(&self) -> Frequency;

    /// Decide an allocation given the latest bar per asset and the
    /// strategy's own current positions.
    ///
    /// `bars` contains at most one entry per symbol in [`Strategy::assets`];
    /// a symbol missing from `bars` had no fresh data this tick.
    fn trade(&self, bars: &[Bar], own_positions: &[OwnPosition]) -> Allocation;
}
