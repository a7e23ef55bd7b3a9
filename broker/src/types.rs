//! Shared broker types: account info, historical bars, tickets, orders.

use portfolio_core::types::Symbol;

/// Account summary from the broker.
#[derive(Debug, Clone, Copy)]
pub struct AccountInfo {
    pub equity_cents: i64,
    pub cash_cents: i64,
    pub buying_power_cents: i64,
}

/// Bar timeframe for historical data requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

/// One bar of historical OHLCV data, timestamped in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalBar {
    pub symbol: Symbol,
    pub timestamp: i64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: u64,
}

/// How to handle a close/cancel when the broker's matching engine doesn't
/// support the requested quantity exactly, e.g. a resting order larger than
/// the position being closed. Brokers that speak this protocol (most
/// MetaTrader-style venues) reject unsupported policies outright rather
/// than silently downgrading, so callers fall back through
/// `[Return, Ioc, Fok]` in order — see the live agent's startup flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFillPolicy {
    /// Return any unfilled quantity as a new resting order.
    Return,
    /// Immediate-or-cancel: fill what's available now, cancel the rest.
    Ioc,
    /// Fill-or-kill: fill the entire quantity or cancel it entirely.
    Fok,
}

impl OrderFillPolicy {
    /// The broker-agnostic fallback order the live agent tries a close in.
    pub const FALLBACK_ORDER: [OrderFillPolicy; 3] = [
        OrderFillPolicy::Return,
        OrderFillPolicy::Ioc,
        OrderFillPolicy::Fok,
    ];
}

/// A broker-side open position or order ticket.
///
/// Brokers that track individual tickets (rather than one net position per
/// symbol) return one `Ticket` per open order; the live agent's startup
/// flatten closes each individually instead of closing a netted total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub id: u64,
    pub symbol: Symbol,
    /// Positive = long, negative = short.
    pub quantity: i64,
    /// Magic number the ticket was opened under, if any.
    pub magic: Option<u32>,
}
