//! Order lifecycle states and the legal transition graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an order.
///
/// Legal transitions:
/// `Pending → PartiallyFilled → Filled`,
/// `Pending | PartiallyFilled → Cancelled`,
/// `Pending → Rejected`.
/// `Filled`, `Cancelled` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted but not yet (fully) matched.
    Pending,
    /// Some quantity has filled; the rest is live.
    PartiallyFilled,
    /// The full quantity has filled.
    Filled,
    /// Cancelled by the submitter or by immediate-order semantics.
    Cancelled,
    /// Refused by validation or the risk gate; never entered a book.
    Rejected,
}

impl OrderStatus {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, PartiallyFilled)
                | (Pending, Filled)
                | (Pending, Cancelled)
                | (Pending, Rejected)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}
