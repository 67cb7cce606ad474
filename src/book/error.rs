//! Order book error types

use crate::order::OrderId;
use std::fmt;

/// Errors that can occur while mutating or inspecting an order book.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BookError {
    /// An order with this id is already indexed in the book. Resting the
    /// same id twice is a caller bug, surfaced as a reject upstream.
    DuplicateOrderId(OrderId),

    /// The order id is not indexed in this book.
    OrderNotFound(OrderId),

    /// Attempted to rest an order with no remaining quantity.
    NothingToRest {
        /// The order that had nothing left to rest
        order_id: OrderId,
    },

    /// A fill was applied that exceeds the order's remaining quantity.
    FillExceedsRemaining {
        /// The resting order being filled
        order_id: OrderId,
        /// Quantity the caller tried to fill
        requested: u64,
        /// Quantity actually remaining
        remaining: u64,
    },

    /// Internal book state disagrees with itself (index without a level
    /// entry, level sums off, crossed book). Fatal for the engine.
    IntegrityViolation {
        /// Description of the violated invariant
        message: String,
    },
}

impl fmt::Display for BookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookError::DuplicateOrderId(id) => write!(f, "duplicate order id: {id}"),
            BookError::OrderNotFound(id) => write!(f, "order not found: {id}"),
            BookError::NothingToRest { order_id } => {
                write!(f, "order {order_id} has no remaining quantity to rest")
            }
            BookError::FillExceedsRemaining {
                order_id,
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "fill of {requested} exceeds remaining {remaining} on order {order_id}"
                )
            }
            BookError::IntegrityViolation { message } => {
                write!(f, "book integrity violation: {message}")
            }
        }
    }
}

impl std::error::Error for BookError {}
