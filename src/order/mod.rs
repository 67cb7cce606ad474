//! Order domain types: identifiers, symbols, fixed-point prices, sides,
//! order kinds and the live order record.

mod base;
mod status;

pub use base::{
    Order, OrderId, OrderKind, Price, PriceParseError, Side, Symbol, SymbolError, PRICE_DECIMALS,
    PRICE_SCALE, SYMBOL_CAPACITY,
};
pub use status::OrderStatus;
