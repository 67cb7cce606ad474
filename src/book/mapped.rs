//! Ordered-map order book backend.
//!
//! A plain `BTreeMap` ladder per side with a `VecDeque` FIFO at each
//! level and a `HashMap` of live order records. Cancel-by-id is O(level)
//! here; the arena backend in [`super::indexed`] is the default for hot
//! deployments, this one trades constant factors for simplicity.

use super::error::BookError;
use super::level::PriceLevel;
use super::{DepthLevel, FrontEntry, ReduceOutcome, TopOfBook};
use crate::order::{Order, OrderId, Price, Side, Symbol};
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};

/// The ordered-map book backend.
#[derive(Debug)]
pub struct MappedBook {
    symbol: Symbol,
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    orders: HashMap<OrderId, Order>,
    top_cache: Cell<Option<TopOfBook>>,
}

impl MappedBook {
    /// Create an empty book for `symbol`.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
            top_cache: Cell::new(None),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    fn invalidate_cache(&self) {
        self.top_cache.set(None);
    }

    fn top(&self) -> TopOfBook {
        if let Some(top) = self.top_cache.get() {
            return top;
        }
        let top = TopOfBook {
            bid: self.bids.keys().next_back().copied(),
            ask: self.asks.keys().next().copied(),
        };
        self.top_cache.set(Some(top));
        top
    }

    fn side_levels(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Rest an order at its price level, appending to the level FIFO.
    pub fn add(&mut self, order: Order) -> Result<(), BookError> {
        debug_assert_eq!(order.symbol, self.symbol);
        if self.orders.contains_key(&order.id) {
            return Err(BookError::DuplicateOrderId(order.id));
        }
        let remaining = order.remaining();
        if remaining == 0 {
            return Err(BookError::NothingToRest { order_id: order.id });
        }
        let level = self
            .side_levels(order.side)
            .entry(order.price)
            .or_insert_with(|| PriceLevel::new(order.price));
        level.push_back(order.id, remaining);
        self.orders.insert(order.id, order);
        self.invalidate_cache();
        Ok(())
    }

    /// Remove an order by id, returning its final record.
    pub fn cancel(&mut self, order_id: OrderId) -> Result<Order, BookError> {
        let order = self
            .orders
            .remove(&order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;
        let levels = self.side_levels(order.side);
        if let Some(level) = levels.get_mut(&order.price) {
            if !level.remove(order_id) {
                return Err(BookError::IntegrityViolation {
                    message: format!("order {order_id} indexed but absent from level FIFO"),
                });
            }
            if level.is_empty() {
                levels.remove(&order.price);
            }
        } else {
            return Err(BookError::IntegrityViolation {
                message: format!("order {order_id} indexed at a missing level"),
            });
        }
        self.invalidate_cache();
        Ok(order)
    }

    /// Apply a passive fill to a resting order; removes it (and possibly
    /// its level) when the remaining quantity reaches zero.
    pub(crate) fn reduce(
        &mut self,
        order_id: OrderId,
        quantity: u64,
    ) -> Result<ReduceOutcome, BookError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;
        let remaining = order.remaining();
        if quantity > remaining {
            return Err(BookError::FillExceedsRemaining {
                order_id,
                requested: quantity,
                remaining,
            });
        }
        order.apply_fill(quantity);
        let (side, price, updated) = (order.side, order.price, *order);

        let levels = self.side_levels(side);
        let level = levels
            .get_mut(&price)
            .ok_or_else(|| BookError::IntegrityViolation {
                message: format!("order {order_id} indexed at a missing level"),
            })?;
        let left = level
            .reduce(order_id, quantity)
            .ok_or_else(|| BookError::IntegrityViolation {
                message: format!("order {order_id} indexed but absent from level FIFO"),
            })?;
        if level.is_empty() {
            levels.remove(&price);
        }

        let removed = left == 0;
        if removed {
            self.orders.remove(&order_id);
        }
        self.invalidate_cache();
        Ok(ReduceOutcome {
            order: updated,
            removed,
        })
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.top().bid
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.top().ask
    }

    /// Snapshot of up to `k` levels on one side with aggregated quantity.
    pub fn depth(&self, side: Side, k: usize) -> Vec<DepthLevel> {
        let iter: Box<dyn Iterator<Item = (&Price, &PriceLevel)>> = match side {
            Side::Buy => Box::new(self.bids.iter().rev()),
            Side::Sell => Box::new(self.asks.iter()),
        };
        iter.take(k)
            .map(|(price, level)| DepthLevel {
                price: *price,
                quantity: level.total_quantity,
                orders: level.order_count(),
            })
            .collect()
    }

    /// Quantity matchable on the opposite side for a `taker_side` order of
    /// `quantity` units, bounded by `limit`.
    pub fn peek_match(&self, taker_side: Side, quantity: u64, limit: Option<Price>) -> u64 {
        let iter: Box<dyn Iterator<Item = (&Price, &PriceLevel)>> = match taker_side {
            Side::Buy => Box::new(self.asks.iter()),
            Side::Sell => Box::new(self.bids.iter().rev()),
        };
        let mut matched = 0u64;
        for (&price, level) in iter {
            if matched >= quantity {
                break;
            }
            if let Some(limit) = limit {
                let marketable = match taker_side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if !marketable {
                    break;
                }
            }
            matched = matched.saturating_add(level.total_quantity.min(quantity - matched));
        }
        matched
    }

    /// Head of the best level on `book_side` (the side being hit).
    pub(crate) fn front(&self, book_side: Side) -> Option<FrontEntry> {
        let (&price, level) = match book_side {
            Side::Buy => self.bids.iter().next_back()?,
            Side::Sell => self.asks.iter().next()?,
        };
        let entry = level.front()?;
        Some(FrontEntry {
            order_id: entry.order_id,
            price,
            remaining: entry.remaining,
        })
    }

    /// Collect the best level of `book_side` in FIFO order into `out`.
    pub(crate) fn collect_best_level(&self, book_side: Side, out: &mut Vec<FrontEntry>) {
        out.clear();
        let Some((&price, level)) = (match book_side {
            Side::Buy => self.bids.iter().next_back(),
            Side::Sell => self.asks.iter().next(),
        }) else {
            return;
        };
        out.extend(level.queue.iter().map(|entry| FrontEntry {
            order_id: entry.order_id,
            price,
            remaining: entry.remaining,
        }));
    }

    /// Resting orders at one price level in FIFO order, as
    /// `(order_id, remaining)` pairs.
    pub fn orders_at(&self, side: Side, price: Price) -> Vec<(OrderId, u64)> {
        let ladder = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        ladder
            .get(&price)
            .map(|level| {
                level
                    .queue
                    .iter()
                    .map(|entry| (entry.order_id, entry.remaining))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy of the live order record, if indexed.
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.orders.get(&order_id).copied()
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.orders.contains_key(&order_id)
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Walk the whole structure and verify its internal invariants.
    pub fn verify_integrity(&self) -> Result<(), BookError> {
        let violation = |message: String| BookError::IntegrityViolation { message };

        let mut seen = 0usize;
        for (side, ladder) in [(Side::Buy, &self.bids), (Side::Sell, &self.asks)] {
            for (&price, level) in ladder {
                let mut sum = 0u64;
                for entry in &level.queue {
                    let order = self.orders.get(&entry.order_id).ok_or_else(|| {
                        violation(format!("level entry {} has no order record", entry.order_id))
                    })?;
                    if order.side != side || order.price != price {
                        return Err(violation(format!("order {} misfiled", order.id)));
                    }
                    if order.remaining() != entry.remaining {
                        return Err(violation(format!(
                            "order {} remaining {} disagrees with level entry {}",
                            order.id,
                            order.remaining(),
                            entry.remaining
                        )));
                    }
                    sum += entry.remaining;
                    seen += 1;
                }
                if sum != level.total_quantity {
                    return Err(violation(format!("level {price} total mismatch")));
                }
            }
        }
        if seen != self.orders.len() {
            return Err(violation(format!(
                "{} orders indexed but {} found in levels",
                self.orders.len(),
                seen
            )));
        }
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask())
            && bid >= ask
        {
            return Err(violation(format!("crossed book: bid {bid} >= ask {ask}")));
        }
        Ok(())
    }
}
