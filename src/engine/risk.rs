//! Order validation and the pre-trade risk gate.
//!
//! Validation covers the static shape of an order (price, quantity,
//! notional); the risk gate tracks net positions per symbol and enforces
//! the position ceiling. The checks are deliberately simple, but every
//! order passes through both before it can touch a book.

use super::report::RejectReason;
use crate::order::{Order, Price, Side, Symbol};
use std::collections::HashMap;

/// Static ceilings applied to every incoming order.
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    /// Exclusive upper bound on limit prices.
    pub max_price: Price,
    /// Inclusive upper bound on order quantity.
    pub max_quantity: u64,
    /// Inclusive upper bound on price × quantity, in minor units.
    pub per_order_notional_limit: u128,
    /// Inclusive bound on the absolute net position per symbol.
    pub per_symbol_position_limit: i64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_price: Price::from_raw(1_000_000 * crate::order::PRICE_SCALE),
            max_quantity: 1_000_000,
            per_order_notional_limit: 10_000_000 * crate::order::PRICE_SCALE as u128,
            per_symbol_position_limit: 10_000_000,
        }
    }
}

/// Pre-trade gate owned by the matching thread.
#[derive(Debug)]
pub struct RiskGate {
    limits: RiskLimits,
    positions: HashMap<Symbol, i64>,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            positions: HashMap::new(),
        }
    }

    /// Validate the static shape of an order.
    pub fn validate(&self, order: &Order) -> Result<(), RejectReason> {
        if order.quantity == 0 || order.quantity > self.limits.max_quantity {
            return Err(RejectReason::InvalidQuantity);
        }
        if order.kind.has_price() {
            if order.price.is_zero() || order.price >= self.limits.max_price {
                return Err(RejectReason::InvalidPrice);
            }
            if order.price.notional(order.quantity) > self.limits.per_order_notional_limit {
                return Err(RejectReason::NotionalTooLarge);
            }
        } else if !order.price.is_zero() {
            // Market orders must not smuggle a price in.
            return Err(RejectReason::InvalidPrice);
        }
        Ok(())
    }

    /// Position ceiling check against the projected post-fill position.
    pub fn check(&self, order: &Order) -> Result<(), RejectReason> {
        let position = self.positions.get(&order.symbol).copied().unwrap_or(0);
        let delta = order.quantity.min(i64::MAX as u64) as i64;
        let projected = match order.side {
            Side::Buy => position.saturating_add(delta),
            Side::Sell => position.saturating_sub(delta),
        };
        if projected.unsigned_abs() > self.limits.per_symbol_position_limit.unsigned_abs() {
            return Err(RejectReason::PositionLimit);
        }
        Ok(())
    }

    /// Record a fill against the aggressor's net position.
    pub fn on_fill(&mut self, symbol: Symbol, side: Side, quantity: u64) {
        let delta = quantity.min(i64::MAX as u64) as i64;
        let entry = self.positions.entry(symbol).or_insert(0);
        *entry = match side {
            Side::Buy => entry.saturating_add(delta),
            Side::Sell => entry.saturating_sub(delta),
        };
    }

    /// Current net position for a symbol.
    pub fn position(&self, symbol: Symbol) -> i64 {
        self.positions.get(&symbol).copied().unwrap_or(0)
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }
}
