//! Arena-backed order book with an intrusive per-level FIFO.
//!
//! Orders and price levels live in `slab` arenas, so steady-state
//! operation performs no per-order allocation: cancels return slots to the
//! freelist and the next add reuses them. Each level threads its resting
//! orders through `prev`/`next` links stored on the slots, making
//! cancel-by-id and fill-from-front both O(1); level insertion is
//! O(log P) through the `BTreeMap` ladder.

use super::error::BookError;
use super::{DepthLevel, FrontEntry, ReduceOutcome, TopOfBook};
use crate::order::{Order, OrderId, Price, Side, Symbol};
use slab::Slab;
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct OrderSlot {
    order: Order,
    level: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct LevelSlot {
    price: Price,
    total_quantity: u64,
    order_count: usize,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LevelSlot {
    fn new(price: Price) -> Self {
        Self {
            price,
            total_quantity: 0,
            order_count: 0,
            head: None,
            tail: None,
        }
    }
}

/// The indexed (arena) book backend. See the module docs for the layout.
#[derive(Debug)]
pub struct IndexedBook {
    symbol: Symbol,
    slots: Slab<OrderSlot>,
    levels: Slab<LevelSlot>,
    bids: BTreeMap<Price, usize>,
    asks: BTreeMap<Price, usize>,
    index: HashMap<OrderId, usize>,
    top_cache: Cell<Option<TopOfBook>>,
}

impl IndexedBook {
    /// Create an empty book for `symbol`, pre-sizing the arenas.
    pub fn new(symbol: Symbol) -> Self {
        Self::with_capacity(symbol, 1024)
    }

    /// Create an empty book with explicit arena pre-allocation.
    pub fn with_capacity(symbol: Symbol, orders: usize) -> Self {
        Self {
            symbol,
            slots: Slab::with_capacity(orders),
            levels: Slab::with_capacity(orders / 8 + 1),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::with_capacity(orders),
            top_cache: Cell::new(None),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    fn ladder(&self, side: Side) -> &BTreeMap<Price, usize> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
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

    /// Rest an order at its price level, appending to the level FIFO.
    pub fn add(&mut self, order: Order) -> Result<(), BookError> {
        debug_assert_eq!(order.symbol, self.symbol);
        if self.index.contains_key(&order.id) {
            return Err(BookError::DuplicateOrderId(order.id));
        }
        let remaining = order.remaining();
        if remaining == 0 {
            return Err(BookError::NothingToRest { order_id: order.id });
        }

        let ladder = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level_idx = *ladder
            .entry(order.price)
            .or_insert_with(|| self.levels.insert(LevelSlot::new(order.price)));

        let level = &mut self.levels[level_idx];
        let slot_idx = self.slots.insert(OrderSlot {
            order,
            level: level_idx,
            prev: level.tail,
            next: None,
        });
        if let Some(tail) = level.tail {
            self.slots[tail].next = Some(slot_idx);
        } else {
            level.head = Some(slot_idx);
        }
        let level = &mut self.levels[level_idx];
        level.tail = Some(slot_idx);
        level.total_quantity += remaining;
        level.order_count += 1;

        self.index.insert(order.id, slot_idx);
        self.invalidate_cache();
        Ok(())
    }

    /// Unlink a slot from its level FIFO and drop the level if it empties.
    fn unlink(&mut self, slot_idx: usize) -> OrderSlot {
        let slot = self.slots.remove(slot_idx);
        let level = &mut self.levels[slot.level];
        match slot.prev {
            Some(prev) => self.slots[prev].next = slot.next,
            None => level.head = slot.next,
        }
        let level = &mut self.levels[slot.level];
        match slot.next {
            Some(next) => self.slots[next].prev = slot.prev,
            None => level.tail = slot.prev,
        }
        let level = &mut self.levels[slot.level];
        level.total_quantity -= slot.order.remaining();
        level.order_count -= 1;

        if level.order_count == 0 {
            let price = level.price;
            let side = slot.order.side;
            self.levels.remove(slot.level);
            match side {
                Side::Buy => self.bids.remove(&price),
                Side::Sell => self.asks.remove(&price),
            };
        }
        slot
    }

    /// Remove an order by id, returning its final record.
    pub fn cancel(&mut self, order_id: OrderId) -> Result<Order, BookError> {
        let slot_idx = self
            .index
            .remove(&order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;
        let slot = self.unlink(slot_idx);
        self.invalidate_cache();
        Ok(slot.order)
    }

    /// Apply a passive fill to a resting order; removes it (and possibly
    /// its level) when the remaining quantity reaches zero.
    pub(crate) fn reduce(
        &mut self,
        order_id: OrderId,
        quantity: u64,
    ) -> Result<ReduceOutcome, BookError> {
        let slot_idx = *self
            .index
            .get(&order_id)
            .ok_or(BookError::OrderNotFound(order_id))?;
        let slot = &mut self.slots[slot_idx];
        let remaining = slot.order.remaining();
        if quantity > remaining {
            return Err(BookError::FillExceedsRemaining {
                order_id,
                requested: quantity,
                remaining,
            });
        }
        slot.order.apply_fill(quantity);
        let level_idx = slot.level;
        self.levels[level_idx].total_quantity -= quantity;

        let removed = self.slots[slot_idx].order.remaining() == 0;
        let order = if removed {
            self.index.remove(&order_id);
            self.unlink(slot_idx).order
        } else {
            self.slots[slot_idx].order
        };
        self.invalidate_cache();
        Ok(ReduceOutcome { order, removed })
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.top().bid
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.top().ask
    }

    /// Snapshot of up to `k` levels on one side with aggregated quantity.
    pub fn depth(&self, side: Side, k: usize) -> Vec<DepthLevel> {
        let iter: Box<dyn Iterator<Item = (&Price, &usize)>> = match side {
            Side::Buy => Box::new(self.bids.iter().rev()),
            Side::Sell => Box::new(self.asks.iter()),
        };
        iter.take(k)
            .map(|(price, &level_idx)| {
                let level = &self.levels[level_idx];
                DepthLevel {
                    price: *price,
                    quantity: level.total_quantity,
                    orders: level.order_count,
                }
            })
            .collect()
    }

    /// Quantity matchable on the opposite side for a `taker_side` order of
    /// `quantity` units, bounded by `limit`. Pure inspection; used for
    /// fill-or-kill pre-flight.
    pub fn peek_match(&self, taker_side: Side, quantity: u64, limit: Option<Price>) -> u64 {
        let book_side = taker_side.opposite();
        let iter: Box<dyn Iterator<Item = (&Price, &usize)>> = match book_side {
            Side::Buy => Box::new(self.bids.iter().rev()),
            Side::Sell => Box::new(self.asks.iter()),
        };
        let mut matched = 0u64;
        for (&price, &level_idx) in iter {
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
            let available = self.levels[level_idx].total_quantity;
            matched = matched.saturating_add(available.min(quantity - matched));
        }
        matched
    }

    /// Head of the best level on `book_side` (the side being hit).
    pub(crate) fn front(&self, book_side: Side) -> Option<FrontEntry> {
        let (&price, &level_idx) = match book_side {
            Side::Buy => self.bids.iter().next_back()?,
            Side::Sell => self.asks.iter().next()?,
        };
        let head = self.levels[level_idx].head?;
        let slot = &self.slots[head];
        Some(FrontEntry {
            order_id: slot.order.id,
            price,
            remaining: slot.order.remaining(),
        })
    }

    /// Collect the best level of `book_side` in FIFO order into `out`.
    pub(crate) fn collect_best_level(&self, book_side: Side, out: &mut Vec<FrontEntry>) {
        out.clear();
        let Some((&price, &level_idx)) = (match book_side {
            Side::Buy => self.bids.iter().next_back(),
            Side::Sell => self.asks.iter().next(),
        }) else {
            return;
        };
        let mut cursor = self.levels[level_idx].head;
        while let Some(idx) = cursor {
            let slot = &self.slots[idx];
            out.push(FrontEntry {
                order_id: slot.order.id,
                price,
                remaining: slot.order.remaining(),
            });
            cursor = slot.next;
        }
    }

    /// Resting orders at one price level in FIFO order, as
    /// `(order_id, remaining)` pairs.
    pub fn orders_at(&self, side: Side, price: Price) -> Vec<(OrderId, u64)> {
        let Some(&level_idx) = self.ladder(side).get(&price) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(self.levels[level_idx].order_count);
        let mut cursor = self.levels[level_idx].head;
        while let Some(idx) = cursor {
            let slot = &self.slots[idx];
            out.push((slot.order.id, slot.order.remaining()));
            cursor = slot.next;
        }
        out
    }

    /// Copy of the live order record, if indexed.
    pub fn order(&self, order_id: OrderId) -> Option<Order> {
        self.index
            .get(&order_id)
            .map(|&slot_idx| self.slots[slot_idx].order)
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Walk the whole structure and verify its internal invariants.
    pub fn verify_integrity(&self) -> Result<(), BookError> {
        let violation = |message: String| BookError::IntegrityViolation { message };

        if self.index.len() != self.slots.len() {
            return Err(violation(format!(
                "index has {} entries but arena holds {} orders",
                self.index.len(),
                self.slots.len()
            )));
        }
        for (side, ladder) in [(Side::Buy, &self.bids), (Side::Sell, &self.asks)] {
            for (&price, &level_idx) in ladder {
                let level = self
                    .levels
                    .get(level_idx)
                    .ok_or_else(|| violation(format!("ladder points at missing level {price}")))?;
                let mut sum = 0u64;
                let mut count = 0usize;
                let mut cursor = level.head;
                let mut last_arrival = 0u64;
                while let Some(idx) = cursor {
                    let slot = &self.slots[idx];
                    if slot.order.side != side || slot.order.price != price {
                        return Err(violation(format!(
                            "order {} misfiled at level {price}",
                            slot.order.id
                        )));
                    }
                    if self.index.get(&slot.order.id) != Some(&idx) {
                        return Err(violation(format!("order {} not indexed", slot.order.id)));
                    }
                    if slot.order.arrival_time < last_arrival {
                        return Err(violation(format!(
                            "arrival order broken at level {price}"
                        )));
                    }
                    last_arrival = slot.order.arrival_time;
                    sum += slot.order.remaining();
                    count += 1;
                    cursor = slot.next;
                }
                if sum != level.total_quantity || count != level.order_count {
                    return Err(violation(format!(
                        "level {price} totals mismatch: sum {sum}/{}, count {count}/{}",
                        level.total_quantity, level.order_count
                    )));
                }
            }
        }
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask())
            && bid >= ask
        {
            return Err(violation(format!("crossed book: bid {bid} >= ask {ask}")));
        }
        Ok(())
    }
}
