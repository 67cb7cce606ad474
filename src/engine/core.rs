//! Engine core and its threaded runtime.
//!
//! [`MatchingCore`] is the single-writer state: every book, the order
//! location index, the risk gate and the dispatch bus. It processes one
//! [`Command`] at a time and is driven either directly (tests, replay) or
//! by the worker thread that [`MatchingEngine`] manages.

use super::matching::{MatchingAlgorithm, execute_match};
use super::report::{ExecutionReport, RejectReason};
use super::risk::{RiskGate, RiskLimits};
use super::stats::{MatchingStats, StatsRegistry};
use crate::book::{Book, BookError, FrontEntry};
use crate::config::{ConfigError, VenueConfig};
use crate::dispatch::DispatchBus;
use crate::ingress::{Command, QueueFull, RingBuffer};
use crate::order::{Order, OrderId, OrderKind, OrderStatus, Symbol};
use crate::timebase::Timebase;
use crate::utils::UuidFactory;
use crossbeam::utils::Backoff;
use hdrhistogram::sync::Recorder;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{error, info, trace, warn};

/// Replacement orders created by `Modify` get ids from this namespace so
/// they can never collide with submitter-assigned ids.
const REPLACEMENT_ID_BASE: u64 = 1 << 63;

/// Throughput is logged roughly once per this many processed commands.
const THROUGHPUT_LOG_EVERY: u64 = 10_000;

/// Errors surfaced on the engine's public control and submission paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The ingress ring is full; the command was not accepted.
    #[error("ingress queue full")]
    Backpressure,
    /// The engine halted after a fatal fault and accepts no commands.
    #[error("engine halted after fatal fault")]
    Halted,
    /// `start` was called twice without an intervening `stop`.
    #[error("engine already started")]
    AlreadyStarted,
    /// The worker thread could not be spawned.
    #[error("failed to spawn matching worker: {0}")]
    Spawn(String),
}

/// The single-writer matching state.
pub struct MatchingCore {
    books: HashMap<Symbol, Book>,
    order_locations: HashMap<OrderId, Symbol>,
    algorithm: MatchingAlgorithm,
    risk: RiskGate,
    bus: DispatchBus,
    stats: Arc<MatchingStats>,
    registry: Arc<StatsRegistry>,
    timebase: Timebase,
    uuid_factory: UuidFactory,
    next_replacement_id: u64,
    recorder: Option<Recorder<u64>>,
    scratch: Vec<FrontEntry>,
    halted: Arc<AtomicBool>,
    commands_since_log: u64,
    last_log_ns: u64,
}

impl MatchingCore {
    /// Build a core from validated configuration, creating one book per
    /// configured symbol.
    pub fn new(
        config: &VenueConfig,
        bus: DispatchBus,
        timebase: Timebase,
        stats: Arc<MatchingStats>,
        registry: Arc<StatsRegistry>,
    ) -> Result<Self, ConfigError> {
        let mut books = HashMap::new();
        for name in &config.symbols {
            let symbol: Symbol = name
                .parse()
                .map_err(|_| ConfigError::InvalidSymbol(name.clone()))?;
            books.insert(symbol, Book::new(symbol, config.use_indexed_book));
        }
        Ok(Self {
            books,
            order_locations: HashMap::new(),
            algorithm: config.matching_algorithm,
            risk: RiskGate::new(RiskLimits {
                max_price: config.max_price,
                max_quantity: config.max_quantity,
                per_order_notional_limit: config.per_order_notional_limit,
                per_symbol_position_limit: config.per_symbol_position_limit,
            }),
            bus,
            stats,
            registry,
            timebase,
            uuid_factory: UuidFactory::default(),
            next_replacement_id: REPLACEMENT_ID_BASE,
            recorder: None,
            scratch: Vec::with_capacity(64),
            halted: Arc::new(AtomicBool::new(false)),
            commands_since_log: 0,
            last_log_ns: timebase.now_ns(),
        })
    }

    /// Register an additional symbol. Only legal before processing starts.
    pub fn add_symbol(&mut self, symbol: Symbol, use_indexed: bool) {
        self.books
            .entry(symbol)
            .or_insert_with(|| Book::new(symbol, use_indexed));
    }

    /// Attach the latency recorder feeding the admission controller.
    pub fn set_latency_recorder(&mut self, recorder: Recorder<u64>) {
        self.recorder = Some(recorder);
    }

    /// The book for `symbol`, if registered.
    pub fn book(&self, symbol: Symbol) -> Option<&Book> {
        self.books.get(&symbol)
    }

    /// Net aggressor flow for `symbol` as tracked by the risk gate.
    pub fn position(&self, symbol: Symbol) -> i64 {
        self.risk.position(symbol)
    }

    /// Shared halt flag, raised on fatal faults.
    pub(crate) fn halted_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halted)
    }

    /// Whether a fatal fault has halted this core.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    /// Execute one command. Side effects occur in contract order: book
    /// mutation, per-fill callbacks in match order, execution-report
    /// callback, statistics.
    pub fn process(&mut self, command: Command) {
        if self.is_halted() {
            trace!("command dropped, engine halted");
            return;
        }
        match command {
            Command::Submit(order) => self.process_submit(order),
            Command::Cancel(order_id) => self.process_cancel(order_id),
            Command::Modify {
                order_id,
                new_price,
                new_quantity,
            } => self.process_modify(order_id, new_price, new_quantity),
        }
        self.log_throughput();
    }

    fn process_submit(&mut self, mut order: Order) {
        let started = self.timebase.cycles();
        if order.arrival_time == 0 {
            order.arrival_time = self.timebase.now_ns();
        }
        self.stats.record_processed();

        if let Err(reason) = self
            .risk
            .validate(&order)
            .and_then(|_| self.risk.check(&order))
        {
            self.reject(order, reason);
            return;
        }
        let Some(mut book) = self.books.remove(&order.symbol) else {
            self.reject(order, RejectReason::UnknownSymbol);
            return;
        };
        let symbol = order.symbol;
        self.run_submit(&mut book, order, started);
        self.books.insert(symbol, book);
    }

    fn run_submit(&mut self, book: &mut Book, mut order: Order, started_cycles: u64) {
        if book.contains(order.id) || self.order_locations.contains_key(&order.id) {
            self.reject(order, RejectReason::DuplicateOrderId);
            return;
        }

        // Fill-or-kill pre-flights the book and either fills completely
        // below or rejects here without touching any level.
        if order.kind == OrderKind::Fok {
            let matchable = book.peek_match(order.side, order.quantity, Some(order.price));
            if matchable < order.quantity {
                self.reject(order, RejectReason::InsufficientLiquidity);
                return;
            }
        }

        let now_ns = self.timebase.now_ns();
        let mut fills = Vec::new();
        if let Err(err) = execute_match(
            book,
            &mut order,
            self.algorithm,
            now_ns,
            &mut fills,
            &mut self.scratch,
        ) {
            self.fault(err);
            return;
        }

        let volume: u64 = fills.iter().map(|f| f.quantity).sum();
        let notional: u128 = fills.iter().map(|f| f.price.notional(f.quantity)).sum();
        if volume > 0 {
            self.risk.on_fill(order.symbol, order.side, volume);
        }
        for fill in &fills {
            if !book.contains(fill.passive_id) {
                self.order_locations.remove(&fill.passive_id);
            }
        }

        let mut reject_reason = None;
        if order.remaining() > 0 {
            match order.kind {
                OrderKind::Limit => {
                    if let Err(err) = book.add(order) {
                        self.fault(err);
                        return;
                    }
                    self.order_locations.insert(order.id, order.symbol);
                }
                OrderKind::Market if order.filled == 0 => {
                    order.status = OrderStatus::Rejected;
                    reject_reason = Some(RejectReason::InsufficientLiquidity);
                }
                // IOC residue, or a market order that exhausted the book:
                // cancelled, never rested.
                _ => order.status = OrderStatus::Cancelled,
            }
        }

        trace!(
            "processed {}: {} fills, remaining {}",
            order.id,
            fills.len(),
            order.remaining()
        );

        let matched = !fills.is_empty();
        let rejected = reject_reason.is_some();
        let mut report = ExecutionReport::from_order(
            &order,
            fills,
            self.uuid_factory.next_id(),
            self.timebase.now_ns(),
        );
        report.reject_reason = reject_reason;

        for fill in &report.fills {
            self.bus.emit_fill(fill);
        }
        self.bus.emit_execution(&report);

        let latency_ns = self
            .timebase
            .cycles_to_ns(self.timebase.cycles().wrapping_sub(started_cycles));
        self.stats.record_latency(latency_ns);
        if let Some(recorder) = self.recorder.as_mut() {
            let _ = recorder.record(latency_ns.max(1));
        }
        if matched {
            self.stats
                .record_match(report.fills.len() as u64, volume, notional);
        }
        if rejected {
            self.stats.record_rejected();
        }
        self.registry
            .entry(order.symbol)
            .record(matched, volume, notional, latency_ns);
    }

    fn process_cancel(&mut self, order_id: OrderId) {
        let Some(&symbol) = self.order_locations.get(&order_id) else {
            trace!("cancel for unknown order {order_id}");
            self.bus.emit_error(
                "UNKNOWN_ORDER",
                &format!("cancel rejected, order {order_id} not live"),
            );
            return;
        };
        let Some(mut book) = self.books.remove(&symbol) else {
            self.fault(BookError::IntegrityViolation {
                message: format!("order {order_id} located at unregistered symbol {symbol}"),
            });
            return;
        };
        let result = book.cancel(order_id);
        self.books.insert(symbol, book);

        match result {
            Ok(mut order) => {
                self.order_locations.remove(&order_id);
                debug_assert!(order.status.can_transition_to(OrderStatus::Cancelled));
                order.status = OrderStatus::Cancelled;
                let report = ExecutionReport::from_order(
                    &order,
                    Vec::new(),
                    self.uuid_factory.next_id(),
                    self.timebase.now_ns(),
                );
                self.bus.emit_execution(&report);
                trace!("cancelled {order_id}");
            }
            Err(err) => {
                // The location index said the order was live; the book
                // disagreeing is corruption, not a user error.
                self.fault(err);
            }
        }
    }

    fn process_modify(&mut self, order_id: OrderId, new_price: crate::order::Price, new_quantity: u64) {
        if !self.order_locations.contains_key(&order_id) {
            trace!("modify for unknown order {order_id}");
            self.bus.emit_error(
                "UNKNOWN_ORDER",
                &format!("modify rejected, order {order_id} not live"),
            );
            return;
        }
        // Cancel + resubmit under a fresh id; time priority is forfeited.
        let Some(&symbol) = self.order_locations.get(&order_id) else {
            return;
        };
        let side = self
            .books
            .get(&symbol)
            .and_then(|book| book.order(order_id))
            .map(|order| order.side);
        self.process_cancel(order_id);
        if self.is_halted() {
            return;
        }
        let Some(side) = side else {
            return;
        };

        let replacement_id = OrderId::new(self.next_replacement_id);
        self.next_replacement_id += 1;
        let mut replacement = Order::new(
            replacement_id,
            symbol,
            side,
            OrderKind::Limit,
            new_price,
            new_quantity,
        );
        replacement.arrival_time = self.timebase.now_ns();
        trace!("modify {order_id} resubmitted as {replacement_id}");
        self.process_submit(replacement);
    }

    /// Emit a `Rejected` report for an order that never touched a book.
    fn reject(&mut self, mut order: Order, reason: RejectReason) {
        warn!("order {} rejected: {reason}", order.id);
        order.status = OrderStatus::Rejected;
        let report = ExecutionReport::rejected(
            &order,
            reason,
            self.uuid_factory.next_id(),
            self.timebase.now_ns(),
        );
        self.bus.emit_execution(&report);
        self.stats.record_rejected();
    }

    /// Fatal fault: report, halt, and stop accepting commands. Never
    /// recovered in-process.
    fn fault(&mut self, err: BookError) {
        error!("fatal engine fault: {err}");
        self.bus.emit_error("ENGINE_FAULT", &err.to_string());
        self.halted.store(true, Ordering::SeqCst);
    }

    fn log_throughput(&mut self) {
        self.commands_since_log += 1;
        if self.commands_since_log < THROUGHPUT_LOG_EVERY {
            return;
        }
        let now = self.timebase.now_ns();
        let elapsed = now.saturating_sub(self.last_log_ns).max(1);
        let rate = self.commands_since_log.saturating_mul(1_000_000_000) / elapsed;
        trace!("matching throughput: {rate} commands/sec");
        self.commands_since_log = 0;
        self.last_log_ns = now;
    }
}

impl std::fmt::Debug for MatchingCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingCore")
            .field("books", &self.books.len())
            .field("live_orders", &self.order_locations.len())
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Cloneable submission handle shared with producers (session decoder,
/// in-process strategies).
#[derive(Debug, Clone)]
pub struct EngineHandle {
    queue: Arc<RingBuffer<Command>>,
    stats: Arc<MatchingStats>,
    halted: Arc<AtomicBool>,
    timebase: Timebase,
}

impl EngineHandle {
    /// Submit a new order. Stamps the arrival time at ingress.
    pub fn submit(&self, mut order: Order) -> Result<(), EngineError> {
        if order.arrival_time == 0 {
            order.arrival_time = self.timebase.now_ns();
        }
        self.enqueue(Command::Submit(order))
    }

    /// Request cancellation of a resting order.
    pub fn cancel(&self, order_id: OrderId) -> Result<(), EngineError> {
        self.enqueue(Command::Cancel(order_id))
    }

    /// Request replacement of a resting order's price and quantity.
    pub fn modify(
        &self,
        order_id: OrderId,
        new_price: crate::order::Price,
        new_quantity: u64,
    ) -> Result<(), EngineError> {
        self.enqueue(Command::Modify {
            order_id,
            new_price,
            new_quantity,
        })
    }

    /// Best-effort statistics snapshot.
    pub fn stats(&self) -> super::stats::StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current ingress occupancy ratio, for the admission controller.
    pub fn queue_depth_ratio(&self) -> f64 {
        self.queue.depth_ratio()
    }

    /// Cumulative commands dropped at ingress.
    pub fn queue_drops(&self) -> u64 {
        self.stats.queue_drops()
    }

    fn enqueue(&self, command: Command) -> Result<(), EngineError> {
        if self.halted.load(Ordering::Relaxed) {
            return Err(EngineError::Halted);
        }
        match self.queue.try_enqueue(command) {
            Ok(()) => Ok(()),
            Err(QueueFull(_)) => {
                self.stats.record_queue_drop();
                Err(EngineError::Backpressure)
            }
        }
    }
}

/// The threaded engine runtime: owns the core between runs and the worker
/// thread while running.
pub struct MatchingEngine {
    handle: EngineHandle,
    registry: Arc<StatsRegistry>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<MatchingCore>>,
    core: Option<MatchingCore>,
    drain_grace: usize,
}

impl MatchingEngine {
    /// Build an engine from validated configuration. Listeners must
    /// already be registered on `bus`; the listener set is immutable once
    /// the engine exists.
    pub fn new(
        config: &VenueConfig,
        bus: DispatchBus,
        timebase: Timebase,
    ) -> Result<Self, ConfigError> {
        let stats = Arc::new(MatchingStats::new());
        let registry = Arc::new(StatsRegistry::new());
        let core = MatchingCore::new(config, bus, timebase, Arc::clone(&stats), Arc::clone(&registry))?;
        let queue = Arc::new(RingBuffer::with_capacity(config.ingress_capacity));
        let handle = EngineHandle {
            queue,
            stats,
            halted: core.halted_flag(),
            timebase,
        };
        Ok(Self {
            handle,
            registry,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            core: Some(core),
            drain_grace: config.ingress_capacity,
        })
    }

    /// A cloneable submission handle.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Attach the latency recorder before starting.
    pub fn set_latency_recorder(&mut self, recorder: Recorder<u64>) {
        if let Some(core) = self.core.as_mut() {
            core.set_latency_recorder(recorder);
        }
    }

    /// Spawn the matching worker.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let mut core = self.core.take().ok_or(EngineError::AlreadyStarted)?;
        let queue = Arc::clone(&self.handle.queue);
        let running = Arc::clone(&self.running);
        let halted = core.halted_flag();
        let drain_grace = self.drain_grace;
        running.store(true, Ordering::SeqCst);
        let running_err = Arc::clone(&running);

        let worker = std::thread::Builder::new()
            .name("matching-worker".to_string())
            .spawn(move || {
                info!("matching worker started");
                let backoff = Backoff::new();
                while running.load(Ordering::Acquire) {
                    if halted.load(Ordering::Relaxed) {
                        warn!("matching worker halting after fatal fault");
                        break;
                    }
                    match queue.try_dequeue() {
                        Some(command) => {
                            core.process(command);
                            backoff.reset();
                        }
                        None => backoff.snooze(),
                    }
                }
                // Drain up to the grace bound, then exit. In-flight orders
                // stay in their last legal state.
                let mut drained = 0usize;
                while drained < drain_grace {
                    match queue.try_dequeue() {
                        Some(command) => {
                            core.process(command);
                            drained += 1;
                        }
                        None => break,
                    }
                }
                info!("matching worker stopped after draining {drained} commands");
                core
            })
            .map_err(|e| {
                running_err.store(false, Ordering::SeqCst);
                EngineError::Spawn(e.to_string())
            })?;

        self.worker = Some(worker);
        Ok(())
    }

    /// Signal the worker to stop, join it, and reclaim the core for
    /// post-run inspection.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(core) => self.core = Some(core),
                Err(_) => error!("matching worker panicked"),
            }
        }
        info!("matching engine stopped");
    }

    /// Whether the worker is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed) && self.worker.is_some()
    }

    /// Submit a new order (see [`EngineHandle::submit`]).
    pub fn submit(&self, order: Order) -> Result<(), EngineError> {
        self.handle.submit(order)
    }

    /// Cancel a resting order.
    pub fn cancel(&self, order_id: OrderId) -> Result<(), EngineError> {
        self.handle.cancel(order_id)
    }

    /// Replace a resting order's price and quantity.
    pub fn modify(
        &self,
        order_id: OrderId,
        new_price: crate::order::Price,
        new_quantity: u64,
    ) -> Result<(), EngineError> {
        self.handle.modify(order_id, new_price, new_quantity)
    }

    /// Best-effort global statistics snapshot.
    pub fn stats(&self) -> super::stats::StatsSnapshot {
        self.handle.stats()
    }

    /// Per-symbol statistics registry.
    pub fn symbol_stats(&self) -> &StatsRegistry {
        &self.registry
    }

    /// The core, available while the engine is stopped.
    pub fn core(&self) -> Option<&MatchingCore> {
        self.core.as_ref()
    }
}

impl Drop for MatchingEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}
