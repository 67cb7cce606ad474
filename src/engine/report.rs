//! Value types emitted by the matching engine: fills, execution reports
//! and reject reasons.

use crate::order::{Order, OrderId, OrderStatus, Price, Side, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single match between an aggressive and a passive order.
///
/// The price is always the passive (resting) order's price: the aggressor
/// pays the touch and never trades through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// The incoming order that crossed the spread.
    pub aggressive_id: OrderId,
    /// The resting order that was hit.
    pub passive_id: OrderId,
    /// Instrument traded.
    pub symbol: Symbol,
    /// Execution price (the passive order's price).
    pub price: Price,
    /// Quantity exchanged.
    pub quantity: u64,
    /// Monotonic timestamp in nanoseconds at match time.
    pub timestamp_ns: u64,
}

/// Why an order was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Price is zero, negative-equivalent or above the configured cap.
    InvalidPrice,
    /// Quantity is zero or above the configured cap.
    InvalidQuantity,
    /// Price × quantity exceeds the per-order notional ceiling.
    NotionalTooLarge,
    /// The symbol is not registered with the venue.
    UnknownSymbol,
    /// The projected position would exceed the per-symbol ceiling.
    PositionLimit,
    /// Fill-or-kill or market order could not be satisfied.
    InsufficientLiquidity,
    /// An order with this id is already live.
    DuplicateOrderId,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::InvalidPrice => "INVALID_PRICE",
            RejectReason::InvalidQuantity => "INVALID_QUANTITY",
            RejectReason::NotionalTooLarge => "NOTIONAL_TOO_LARGE",
            RejectReason::UnknownSymbol => "UNKNOWN_SYMBOL",
            RejectReason::PositionLimit => "POSITION_LIMIT",
            RejectReason::InsufficientLiquidity => "INSUFFICIENT_LIQUIDITY",
            RejectReason::DuplicateOrderId => "DUPLICATE_ORDER_ID",
        };
        f.write_str(name)
    }
}

/// Terminal summary of one command's effect on an order.
///
/// Reports are emitted in submission order; the fills inside a report are
/// listed in match order and `filled_quantity` equals their sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The order this report describes.
    pub order_id: OrderId,
    /// Instrument.
    pub symbol: Symbol,
    /// Side of the reported order.
    pub side: Side,
    /// Status after this processing step.
    pub status: OrderStatus,
    /// Originally requested quantity.
    pub original_quantity: u64,
    /// Cumulative filled quantity.
    pub filled_quantity: u64,
    /// Quantity still unfilled.
    pub remaining_quantity: u64,
    /// Volume-weighted average fill price; zero when nothing filled.
    pub avg_price: Price,
    /// Fills produced by this processing step, in match order.
    pub fills: Vec<Fill>,
    /// Venue-assigned execution id.
    pub execution_id: Uuid,
    /// Monotonic timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Populated on `Rejected` reports.
    pub reject_reason: Option<RejectReason>,
}

impl ExecutionReport {
    /// Build a report from an order's current state and its fills.
    pub fn from_order(
        order: &Order,
        fills: Vec<Fill>,
        execution_id: Uuid,
        timestamp_ns: u64,
    ) -> Self {
        let avg_price = volume_weighted_price(&fills);
        Self {
            order_id: order.id,
            symbol: order.symbol,
            side: order.side,
            status: order.status,
            original_quantity: order.quantity,
            filled_quantity: order.filled,
            remaining_quantity: order.remaining(),
            avg_price,
            fills,
            execution_id,
            timestamp_ns,
            reject_reason: None,
        }
    }

    /// Build a `Rejected` report carrying the reason code.
    pub fn rejected(
        order: &Order,
        reason: RejectReason,
        execution_id: Uuid,
        timestamp_ns: u64,
    ) -> Self {
        let mut report = Self::from_order(order, Vec::new(), execution_id, timestamp_ns);
        report.status = OrderStatus::Rejected;
        report.reject_reason = Some(reason);
        report
    }
}

/// Volume-weighted average price over a fill list, computed in integer
/// minor units. Returns zero for an empty list.
pub fn volume_weighted_price(fills: &[Fill]) -> Price {
    let mut notional: u128 = 0;
    let mut quantity: u128 = 0;
    for fill in fills {
        notional += fill.price.notional(fill.quantity);
        quantity += fill.quantity as u128;
    }
    if quantity == 0 {
        Price::ZERO
    } else {
        Price::from_raw((notional / quantity) as u64)
    }
}
