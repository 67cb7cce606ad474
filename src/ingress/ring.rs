//! Bounded lock-free ring buffer carrying commands into the matching
//! worker.
//!
//! The layout follows the classic sequence-per-slot design: every slot
//! carries its own sequence counter, so producers and the consumer never
//! compare raw head/tail values across threads. Multiple producers claim
//! slots with a CAS on the enqueue cursor; the single consumer advances
//! its cursor with plain stores and stays wait-free under non-empty.
//! Head and tail live on separate cache lines.

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returned by [`RingBuffer::try_enqueue`] when the ring is at capacity.
/// Carries the rejected value back to the caller; backpressure handling
/// belongs to the admission layer, never to the queue.
pub struct QueueFull<T>(pub T);

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ingress queue full")
    }
}

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded multi-producer, single-consumer ring buffer.
///
/// Capacity must be a power of two. All storage is allocated up front;
/// enqueue and dequeue never allocate.
pub struct RingBuffer<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    enqueue_pos: CachePadded<AtomicUsize>,
    dequeue_pos: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Create a ring with the given capacity.
    ///
    /// # Panics
    /// Panics when `capacity` is zero or not a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity >= 2 && capacity.is_power_of_two(),
            "ring capacity must be a power of two, got {capacity}"
        );
        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buffer,
            mask: capacity - 1,
            enqueue_pos: CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Attempt to enqueue `value`. Never blocks; a full ring hands the
    /// value back inside [`QueueFull`].
    pub fn try_enqueue(&self, value: T) -> Result<(), QueueFull<T>> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos) as isize;
            if diff == 0 {
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // The slot is exclusively ours until the sequence
                        // store below publishes it.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence.store(pos.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return Err(QueueFull(value));
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempt to dequeue one value.
    ///
    /// Contract: exactly one consumer thread calls this. The consumer
    /// cursor is advanced with a plain store, so the operation is
    /// wait-free under non-empty.
    pub fn try_dequeue(&self) -> Option<T> {
        let pos = self.dequeue_pos.load(Ordering::Relaxed);
        let slot = &self.buffer[pos & self.mask];
        let seq = slot.sequence.load(Ordering::Acquire);
        let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;
        if diff < 0 {
            return None;
        }
        debug_assert!(diff == 0, "second consumer detected on SPSC ring");
        self.dequeue_pos
            .store(pos.wrapping_add(1), Ordering::Relaxed);
        // The producer's Release store on `sequence` happens-before this
        // read; the slot is ours until we bump its sequence.
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        slot.sequence
            .store(pos.wrapping_add(self.mask + 1), Ordering::Release);
        Some(value)
    }

    /// Attempt to dequeue one value with multiple competing consumers.
    ///
    /// Used by the decoder's worker pools, where several threads drain the
    /// same ring; the consumer cursor is claimed with a CAS instead of a
    /// plain store. The matching worker uses [`Self::try_dequeue`].
    pub fn try_dequeue_shared(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;
            if diff == 0 {
                match self.dequeue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence
                            .store(pos.wrapping_add(self.mask + 1), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Approximate number of queued elements. Exact only when producers
    /// and consumer are quiescent.
    pub fn len(&self) -> usize {
        let head = self.enqueue_pos.load(Ordering::Relaxed);
        let tail = self.dequeue_pos.load(Ordering::Relaxed);
        head.wrapping_sub(tail)
    }

    /// Whether the ring currently appears empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The fixed capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Occupancy as a ratio of capacity, for the admission controller.
    pub fn depth_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        while self.try_dequeue().is_some() {}
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
