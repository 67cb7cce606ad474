//! Commands carried by the ingress queue into the matching worker.

use crate::order::{Order, OrderId, Price};
use serde::{Deserialize, Serialize};

/// A command submitted for total-ordered execution on the matching thread.
///
/// Enqueueing is the only fallible step on the submission path; the sole
/// transient failure is a full ring, surfaced to the caller as
/// backpressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Submit a new order.
    Submit(Order),

    /// Cancel a resting order by id.
    Cancel(OrderId),

    /// Replace a resting order's price and quantity. Executed as a cancel
    /// followed by a resubmission under a fresh id, which forfeits time
    /// priority.
    Modify {
        /// The resting order to replace.
        order_id: OrderId,
        /// Replacement limit price.
        new_price: Price,
        /// Replacement quantity.
        new_quantity: u64,
    },
}
