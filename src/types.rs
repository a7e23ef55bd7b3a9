//! Core types: Symbol, Price, Quantity, Timestamp, OrderId, TradeId

use std::fmt;

/// An asset ticker, packed into 8 bytes so it is `Copy` and cheap to use as a
/// hash-map key across strategies, positions, and order books.
///
/// Holds up to 8 ASCII bytes, left-aligned and zero-padded. Longer tickers
/// (ADRs, futures contract codes) are rejected by [`Symbol::try_new`]; most
/// callers use [`Symbol::new`], which panics on the same condition, since a
/// symbol is normally a compile-time-known constant in test and strategy code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Symbol {
    bytes: [u8; 8],
    len: u8,
}

impl Symbol {
    /// Maximum ticker length this type can represent.
    pub const MAX_LEN: usize = 8;

    /// Build a symbol from an ASCII ticker, panicking if it doesn't fit.
    ///
    /// # Panics
    /// Panics if `ticker` is empty, longer than [`Symbol::MAX_LEN`] bytes, or
    /// contains non-ASCII bytes.
    pub fn new(ticker: &str) -> Self {
        Self::try_new(ticker).unwrap_or_else(|e| panic!("invalid symbol {ticker:?}: {e}"))
    }

    /// Build a symbol from an ASCII ticker, returning an error instead of panicking.
    pub fn try_new(ticker: &str) -> Result<Self, SymbolError> {
        if ticker.is_empty() {
            return Err(SymbolError::Empty);
        }
        if !ticker.is_ascii() {
            return Err(SymbolError::NonAscii);
        }
        if ticker.len() > Self::MAX_LEN {
            return Err(SymbolError::TooLong(ticker.len()));
        }
        let mut bytes = [0u8; 8];
        bytes[..ticker.len()].copy_from_slice(ticker.as_bytes());
        Ok(Self {
            bytes,
            len: ticker.len() as u8,
        })
    }

    /// The ticker as a string slice.
    pub fn as_str(&self) -> &str {
        // Safety: constructed only from validated ASCII in `try_new`.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl std::str::FromStr for Symbol {
    type Err = SymbolError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_new(&s)
    }
}

impl From<Symbol> for String {
    fn from(sym: Symbol) -> Self {
        sym.as_str().to_owned()
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Errors constructing a [`Symbol`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol cannot be empty")]
    Empty,
    #[error("symbol must be ASCII")]
    NonAscii,
    #[error("symbol longer than {} bytes (got {0})", Symbol::MAX_LEN)]
    TooLong(usize),
}

/// Price in smallest units (e.g., cents, basis points).
///
/// `Price(10050)` represents $100.50 if tick size is $0.01.
/// Using fixed-point avoids floating-point errors in financial calculations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Price(pub i64);

impl Price {
    pub const ZERO: Price = Price(0);
    pub const MAX: Price = Price(i64::MAX);
    pub const MIN: Price = Price(i64::MIN);
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display as dollars.cents assuming cents
        let dollars = self.0 / 100;
        let cents = (self.0 % 100).abs();
        if self.0 < 0 {
            write!(f, "-${}.{:02}", dollars.abs(), cents)
        } else {
            write!(f, "${}.{:02}", dollars, cents)
        }
    }
}

/// Quantity of shares/contracts. Always positive.
pub type Quantity = u64;

/// Timestamp in nanoseconds since exchange start.
/// Monotonically increasing, assigned by exchange.
pub type Timestamp = u64;

/// Unique order identifier assigned by exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// Unique trade identifier assigned by exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}
