//! Core order primitives.
//!
//! Prices are fixed-point integers in minor units; binary floats never
//! participate in priority comparisons or wire formatting.

use super::status::OrderStatus;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of implied decimal places in a [`Price`].
pub const PRICE_DECIMALS: u32 = 4;

/// Scaling factor between a decimal price and its minor-unit representation.
pub const PRICE_SCALE: u64 = 10_u64.pow(PRICE_DECIMALS);

/// Maximum symbol length in bytes.
pub const SYMBOL_CAPACITY: usize = 12;

/// Unique order identifier assigned by the submitter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct OrderId(u64);

impl OrderId {
    /// Wrap a raw `u64` identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw `u64` value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for OrderId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error constructing a [`Symbol`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// The symbol string was empty.
    #[error("symbol must not be empty")]
    Empty,
    /// The symbol exceeds [`SYMBOL_CAPACITY`] bytes.
    #[error("symbol '{0}' exceeds {SYMBOL_CAPACITY} bytes")]
    TooLong(String),
}

/// A short instrument identifier stored inline.
///
/// Equality and hashing are by byte value, so `Symbol` behaves like an
/// interned token while remaining `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol {
    bytes: [u8; SYMBOL_CAPACITY],
    len: u8,
}

impl Symbol {
    /// Build a symbol from a string slice.
    pub fn new(s: &str) -> Result<Self, SymbolError> {
        if s.is_empty() {
            return Err(SymbolError::Empty);
        }
        if s.len() > SYMBOL_CAPACITY {
            return Err(SymbolError::TooLong(s.to_string()));
        }
        let mut bytes = [0u8; SYMBOL_CAPACITY];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self {
            bytes,
            len: s.len() as u8,
        })
    }

    /// View the symbol as a string slice.
    pub fn as_str(&self) -> &str {
        // Construction only accepts valid UTF-8 of this exact length.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SymbolVisitor;

        impl Visitor<'_> for SymbolVisitor {
            type Value = Symbol;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a symbol string of at most {SYMBOL_CAPACITY} bytes")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Symbol, E> {
                Symbol::new(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(SymbolVisitor)
    }
}

/// Error parsing a decimal price string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceParseError {
    /// The input was empty or contained non-digit characters.
    #[error("invalid price literal '{0}'")]
    Invalid(String),
    /// More fractional digits than [`PRICE_DECIMALS`].
    #[error("price '{0}' has more than {PRICE_DECIMALS} decimal places")]
    TooPrecise(String),
    /// The value does not fit the minor-unit representation.
    #[error("price '{0}' out of range")]
    Overflow(String),
}

/// A fixed-point price in minor units (`value × 10^4`).
///
/// Ordering and equality operate on the raw integer, which makes `Price`
/// safe for priority decisions. Decimal conversion only happens at the
/// protocol boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Price(u64);

impl Price {
    /// The zero price. Only legal on market orders.
    pub const ZERO: Price = Price(0);

    /// Wrap raw minor units.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw minor-unit value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this price is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Notional value of `quantity` units at this price, in minor units.
    pub fn notional(self, quantity: u64) -> u128 {
        self.0 as u128 * quantity as u128
    }

    /// Parse a decimal string (`"10"`, `"10.5"`, `"10.0001"`) into minor
    /// units without going through floating point.
    pub fn from_decimal_str(s: &str) -> Result<Self, PriceParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PriceParseError::Invalid(s.to_string()));
        }
        let (integral, fraction) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if integral.is_empty() && fraction.is_empty() {
            return Err(PriceParseError::Invalid(s.to_string()));
        }
        if fraction.len() > PRICE_DECIMALS as usize {
            return Err(PriceParseError::TooPrecise(s.to_string()));
        }
        let whole: u64 = if integral.is_empty() {
            0
        } else {
            integral
                .parse()
                .map_err(|_| PriceParseError::Invalid(s.to_string()))?
        };
        let mut frac: u64 = if fraction.is_empty() {
            0
        } else {
            fraction
                .parse()
                .map_err(|_| PriceParseError::Invalid(s.to_string()))?
        };
        frac *= 10_u64.pow(PRICE_DECIMALS - fraction.len() as u32);

        whole
            .checked_mul(PRICE_SCALE)
            .and_then(|w| w.checked_add(frac))
            .map(Price)
            .ok_or_else(|| PriceParseError::Overflow(s.to_string()))
    }

    /// Render as a decimal string with trailing fractional zeros trimmed.
    pub fn to_decimal_string(self) -> String {
        let whole = self.0 / PRICE_SCALE;
        let frac = self.0 % PRICE_SCALE;
        if frac == 0 {
            return whole.to_string();
        }
        let mut s = format!("{whole}.{frac:04}");
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl FromStr for Price {
    type Err = PriceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal_str(s)
    }
}

/// Which side of the book an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy order (bid side).
    Buy,
    /// Sell order (ask side).
    Sell,
}

impl Side {
    /// The opposite side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// How an order interacts with resting liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Take whatever the book offers; never rests.
    Market,
    /// Match what crosses, rest the remainder.
    Limit,
    /// Immediate-or-cancel: match what crosses, cancel the remainder.
    Ioc,
    /// Fill-or-kill: fill the full quantity immediately or reject.
    Fok,
}

impl OrderKind {
    /// Whether the order carries a limit price.
    pub fn has_price(self) -> bool {
        !matches!(self, OrderKind::Market)
    }

    /// Whether any unfilled remainder must not rest in the book.
    pub fn is_immediate(self) -> bool {
        !matches!(self, OrderKind::Limit)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::Ioc => write!(f, "IOC"),
            OrderKind::Fok => write!(f, "FOK"),
        }
    }
}

/// A live order record.
///
/// Invariants: `filled <= quantity`; `status == Filled` exactly when
/// `filled == quantity`; priced kinds carry a non-zero price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Submitter-assigned identifier, unique among live orders.
    pub id: OrderId,
    /// Instrument this order trades.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: Side,
    /// Market, limit, IOC or FOK.
    pub kind: OrderKind,
    /// Limit price in minor units; zero for market orders.
    pub price: Price,
    /// Requested quantity.
    pub quantity: u64,
    /// Quantity filled so far.
    pub filled: u64,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// Monotonic arrival timestamp in nanoseconds, stamped at ingress.
    pub arrival_time: u64,
}

impl Order {
    /// Create a fresh order in `Pending` state. The arrival timestamp is
    /// stamped by the engine at ingress.
    pub fn new(
        id: OrderId,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        price: Price,
        quantity: u64,
    ) -> Self {
        Self {
            id,
            symbol,
            side,
            kind,
            price,
            quantity,
            filled: 0,
            status: OrderStatus::Pending,
            arrival_time: 0,
        }
    }

    /// Convenience constructor for a limit order.
    pub fn limit(id: OrderId, symbol: Symbol, side: Side, price: Price, quantity: u64) -> Self {
        Self::new(id, symbol, side, OrderKind::Limit, price, quantity)
    }

    /// Convenience constructor for a market order.
    pub fn market(id: OrderId, symbol: Symbol, side: Side, quantity: u64) -> Self {
        Self::new(id, symbol, side, OrderKind::Market, Price::ZERO, quantity)
    }

    /// Remaining unfilled quantity.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.quantity.saturating_sub(self.filled)
    }

    /// Whether the order has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a fill of `quantity` units, advancing the status machine.
    ///
    /// Panics in debug builds when the fill exceeds the remaining quantity
    /// or the order is already terminal; both indicate an engine bug.
    pub(crate) fn apply_fill(&mut self, quantity: u64) {
        debug_assert!(quantity > 0);
        debug_assert!(quantity <= self.remaining());
        debug_assert!(!self.status.is_terminal() || self.status == OrderStatus::PartiallyFilled);
        self.filled += quantity;
        self.status = if self.filled == self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }

    /// Whether this order is marketable against a resting price on the
    /// opposite side.
    #[inline]
    pub fn crosses(&self, resting_price: Price) -> bool {
        match self.kind {
            OrderKind::Market => true,
            _ => match self.side {
                Side::Buy => self.price >= resting_price,
                Side::Sell => self.price <= resting_price,
            },
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}@{} filled={} status={}",
            self.id, self.symbol, self.side, self.quantity, self.price, self.filled, self.status
        )
    }
}
