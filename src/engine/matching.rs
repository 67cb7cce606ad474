//! The match walk: crossing an incoming order against resting liquidity.
//!
//! Fills always print at the passive (resting) price. The walk consumes
//! levels in best-first order and stops at the first level the incoming
//! order is no longer marketable against. The configured algorithm only
//! changes how quantity is allocated *within* a level; across levels,
//! price priority is absolute.

use crate::book::{Book, BookError, FrontEntry};
use crate::engine::report::Fill;
use crate::order::Order;
use serde::{Deserialize, Serialize};

/// Intra-level allocation policy, selectable at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MatchingAlgorithm {
    /// Best price first, FIFO within a level (default).
    #[default]
    PriceTime,
    /// Best price first, proportional allocation within a level.
    ProRata,
    /// Best price first, largest resting order first within a level.
    SizePriority,
    /// Strict arrival order within a level. Equivalent to price-time for
    /// a book that queues arrivals, kept as an explicit policy name.
    TimePriority,
}

/// Cross `incoming` against `book` until it stops being marketable or is
/// fully filled. Fills are appended to `fills` in match order; `scratch`
/// is a reusable level buffer for the allocation variants.
///
/// Book errors from the reduce path indicate corrupted internal state and
/// are propagated for the engine to treat as fatal.
pub(crate) fn execute_match(
    book: &mut Book,
    incoming: &mut Order,
    algorithm: MatchingAlgorithm,
    now_ns: u64,
    fills: &mut Vec<Fill>,
    scratch: &mut Vec<FrontEntry>,
) -> Result<(), BookError> {
    match algorithm {
        MatchingAlgorithm::PriceTime | MatchingAlgorithm::TimePriority => {
            match_fifo(book, incoming, now_ns, fills)
        }
        MatchingAlgorithm::ProRata => match_levels(book, incoming, now_ns, fills, scratch, false),
        MatchingAlgorithm::SizePriority => {
            match_levels(book, incoming, now_ns, fills, scratch, true)
        }
    }
}

/// The hot path: take the head of the best opposing level, fill, repeat.
fn match_fifo(
    book: &mut Book,
    incoming: &mut Order,
    now_ns: u64,
    fills: &mut Vec<Fill>,
) -> Result<(), BookError> {
    let book_side = incoming.side.opposite();
    while incoming.remaining() > 0 {
        let Some(front) = book.front(book_side) else {
            break;
        };
        if !incoming.crosses(front.price) {
            break;
        }
        let quantity = incoming.remaining().min(front.remaining);
        book.reduce(front.order_id, quantity)?;
        incoming.apply_fill(quantity);
        fills.push(Fill {
            aggressive_id: incoming.id,
            passive_id: front.order_id,
            symbol: incoming.symbol,
            price: front.price,
            quantity,
            timestamp_ns: now_ns,
        });
    }
    Ok(())
}

/// Level-at-a-time walk for the allocation variants. `by_size` selects
/// largest-first ordering; otherwise quantity is split pro rata with the
/// integer remainder handed out in arrival order.
fn match_levels(
    book: &mut Book,
    incoming: &mut Order,
    now_ns: u64,
    fills: &mut Vec<Fill>,
    scratch: &mut Vec<FrontEntry>,
    by_size: bool,
) -> Result<(), BookError> {
    let book_side = incoming.side.opposite();
    while incoming.remaining() > 0 {
        book.collect_best_level(book_side, scratch);
        let Some(first) = scratch.first() else {
            break;
        };
        if !incoming.crosses(first.price) {
            break;
        }

        let level_total: u64 = scratch.iter().map(|e| e.remaining).sum();
        let wanted = incoming.remaining();

        if by_size {
            scratch.sort_by(|a, b| b.remaining.cmp(&a.remaining));
        } else if level_total > wanted {
            // Pro-rata: floor shares first, then top up in arrival order.
            let mut allocated: u64 = 0;
            for entry in scratch.iter_mut() {
                let share = (wanted as u128 * entry.remaining as u128 / level_total as u128) as u64;
                allocated += share;
                entry.remaining = share;
            }
            let mut leftover = wanted - allocated;
            // A second pass needs the true remainders; re-read them lazily
            // from the book while topping up.
            for entry in scratch.iter_mut() {
                if leftover == 0 {
                    break;
                }
                let live = book
                    .order(entry.order_id)
                    .map(|o| o.remaining())
                    .unwrap_or(0);
                let headroom = live.saturating_sub(entry.remaining);
                let extra = headroom.min(leftover);
                entry.remaining += extra;
                leftover -= extra;
            }
        }

        for entry in scratch.iter() {
            if incoming.remaining() == 0 {
                break;
            }
            if entry.remaining == 0 {
                continue;
            }
            let quantity = incoming.remaining().min(entry.remaining);
            book.reduce(entry.order_id, quantity)?;
            incoming.apply_fill(quantity);
            fills.push(Fill {
                aggressive_id: incoming.id,
                passive_id: entry.order_id,
                symbol: incoming.symbol,
                price: entry.price,
                quantity,
                timestamp_ns: now_ns,
            });
        }
        // The scratch buffer is stale once the level mutated.
        scratch.clear();
    }
    Ok(())
}
