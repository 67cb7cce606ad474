//! Matching statistics: relaxed atomic accumulators updated on the
//! matching thread, snapshot value types for observers.
//!
//! Counters use `Ordering::Relaxed` throughout; exact values are only
//! guaranteed after the engine has quiesced (stopped or drained).

use crate::order::Symbol;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global matching counters.
#[derive(Debug, Default)]
pub struct MatchingStats {
    orders_processed: AtomicU64,
    orders_matched: AtomicU64,
    orders_rejected: AtomicU64,
    total_fills: AtomicU64,
    total_volume: AtomicU64,
    total_notional: AtomicU64,
    avg_match_latency_ns: AtomicU64,
    max_match_latency_ns: AtomicU64,
    matching_operations: AtomicU64,
    queue_drops: AtomicU64,
}

impl MatchingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_processed(&self) {
        self.orders_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.orders_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_match(&self, fills: u64, volume: u64, notional: u128) {
        self.orders_matched.fetch_add(1, Ordering::Relaxed);
        self.total_fills.fetch_add(fills, Ordering::Relaxed);
        self.total_volume.fetch_add(volume, Ordering::Relaxed);
        let clamped = notional.min(u64::MAX as u128) as u64;
        self.total_notional.fetch_add(clamped, Ordering::Relaxed);
    }

    /// Incremental average plus running maximum, matching-thread only.
    pub(crate) fn record_latency(&self, latency_ns: u64) {
        let ops = self.matching_operations.fetch_add(1, Ordering::Relaxed);
        let avg = self.avg_match_latency_ns.load(Ordering::Relaxed);
        let new_avg = (avg.saturating_mul(ops).saturating_add(latency_ns)) / (ops + 1);
        self.avg_match_latency_ns.store(new_avg, Ordering::Relaxed);
        self.max_match_latency_ns
            .fetch_max(latency_ns, Ordering::Relaxed);
    }

    /// Count a command dropped at ingress because the ring was full.
    pub(crate) fn record_queue_drop(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative ingress drops, for the admission controller.
    pub fn queue_drops(&self) -> u64 {
        self.queue_drops.load(Ordering::Relaxed)
    }

    /// Best-effort value copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            orders_processed: self.orders_processed.load(Ordering::Relaxed),
            orders_matched: self.orders_matched.load(Ordering::Relaxed),
            orders_rejected: self.orders_rejected.load(Ordering::Relaxed),
            total_fills: self.total_fills.load(Ordering::Relaxed),
            total_volume: self.total_volume.load(Ordering::Relaxed),
            total_notional: self.total_notional.load(Ordering::Relaxed),
            avg_match_latency_ns: self.avg_match_latency_ns.load(Ordering::Relaxed),
            max_match_latency_ns: self.max_match_latency_ns.load(Ordering::Relaxed),
            matching_operations: self.matching_operations.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
        }
    }
}

/// Value copy of [`MatchingStats`] at one observation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct StatsSnapshot {
    /// Commands that reached the matching loop.
    pub orders_processed: u64,
    /// Orders that produced at least one fill.
    pub orders_matched: u64,
    /// Orders refused by validation or risk.
    pub orders_rejected: u64,
    /// Individual fills generated.
    pub total_fills: u64,
    /// Units traded.
    pub total_volume: u64,
    /// Notional traded, in price minor units (saturating).
    pub total_notional: u64,
    /// Incremental average match latency.
    pub avg_match_latency_ns: u64,
    /// Worst observed match latency.
    pub max_match_latency_ns: u64,
    /// Number of latency observations.
    pub matching_operations: u64,
    /// Commands rejected at ingress because the ring was full.
    pub queue_drops: u64,
}

/// Per-symbol counters, updated by the matching thread after each order.
#[derive(Debug, Default)]
pub struct SymbolStats {
    orders_processed: AtomicU64,
    orders_matched: AtomicU64,
    total_volume: AtomicU64,
    total_notional: AtomicU64,
    avg_match_latency_ns: AtomicU64,
    max_match_latency_ns: AtomicU64,
    operations: AtomicU64,
}

impl SymbolStats {
    pub(crate) fn record(&self, matched: bool, volume: u64, notional: u128, latency_ns: u64) {
        self.orders_processed.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.orders_matched.fetch_add(1, Ordering::Relaxed);
            self.total_volume.fetch_add(volume, Ordering::Relaxed);
            let clamped = notional.min(u64::MAX as u128) as u64;
            self.total_notional.fetch_add(clamped, Ordering::Relaxed);
        }
        let ops = self.operations.fetch_add(1, Ordering::Relaxed);
        let avg = self.avg_match_latency_ns.load(Ordering::Relaxed);
        let new_avg = (avg.saturating_mul(ops).saturating_add(latency_ns)) / (ops + 1);
        self.avg_match_latency_ns.store(new_avg, Ordering::Relaxed);
        self.max_match_latency_ns
            .fetch_max(latency_ns, Ordering::Relaxed);
    }

    /// Value copy of this symbol's counters.
    pub fn snapshot(&self) -> SymbolStatsSnapshot {
        SymbolStatsSnapshot {
            orders_processed: self.orders_processed.load(Ordering::Relaxed),
            orders_matched: self.orders_matched.load(Ordering::Relaxed),
            total_volume: self.total_volume.load(Ordering::Relaxed),
            total_notional: self.total_notional.load(Ordering::Relaxed),
            avg_match_latency_ns: self.avg_match_latency_ns.load(Ordering::Relaxed),
            max_match_latency_ns: self.max_match_latency_ns.load(Ordering::Relaxed),
        }
    }
}

/// Value copy of one symbol's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct SymbolStatsSnapshot {
    /// Orders processed for this symbol.
    pub orders_processed: u64,
    /// Orders that produced at least one fill.
    pub orders_matched: u64,
    /// Units traded.
    pub total_volume: u64,
    /// Notional traded, in price minor units (saturating).
    pub total_notional: u64,
    /// Incremental average match latency.
    pub avg_match_latency_ns: u64,
    /// Worst observed match latency.
    pub max_match_latency_ns: u64,
}

/// Concurrent registry of per-symbol counters.
///
/// The matching thread inserts and updates; observer threads read
/// snapshots without coordinating with the writer.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    symbols: DashMap<Symbol, Arc<SymbolStats>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entry(&self, symbol: Symbol) -> Arc<SymbolStats> {
        self.symbols
            .entry(symbol)
            .or_insert_with(|| Arc::new(SymbolStats::default()))
            .clone()
    }

    /// Snapshot one symbol's counters, if the symbol has traded.
    pub fn snapshot(&self, symbol: Symbol) -> Option<SymbolStatsSnapshot> {
        self.symbols.get(&symbol).map(|stats| stats.snapshot())
    }

    /// Symbols with recorded activity.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(|entry| *entry.key()).collect()
    }
}
