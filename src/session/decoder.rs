//! The session decoder: per-session framing, a stateless parser worker
//! pool, and translation of order messages into engine commands.
//!
//! Byte streams are fed on the owning thread (one reassembly buffer per
//! session); complete raw frames pass through the admission gate and onto
//! a ring drained by parser workers. Parsed frames land on a second ring
//! drained by a small callback pool. With a single parser worker, frame
//! order is preserved end to end; larger pools trade ordering for
//! throughput.

use super::framer::Framer;
use super::message::{FixMessage, FrameErrorClass, SessionError};
use super::tags;
use crate::admission::RateGate;
use crate::config::VenueConfig;
use crate::ingress::{Command, QueueFull, RingBuffer};
use crate::order::{Order, OrderId, OrderKind, Price, Side, Symbol};
use crossbeam::utils::Backoff;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{info, warn};

/// Capacity of the raw-frame and parsed-frame rings.
const PARSER_QUEUE_SIZE: usize = 16_384;

/// Callback receiving every validated frame.
pub type MessageCallback = Arc<dyn Fn(&FixMessage) + Send + Sync>;
/// Callback receiving session-level errors `(code, message)`.
pub type SessionErrorCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Decoder counters, relaxed atomics.
#[derive(Debug, Default)]
pub struct DecoderStats {
    messages_parsed: AtomicU64,
    parse_errors: AtomicU64,
    checksum_errors: AtomicU64,
    invalid_messages: AtomicU64,
    bytes_processed: AtomicU64,
    queue_full_events: AtomicU64,
    messages_dropped: AtomicU64,
    admission_rejects: AtomicU64,
    callback_errors: AtomicU64,
    avg_parse_time_ns: AtomicU64,
}

impl DecoderStats {
    fn count_error(&self, class: FrameErrorClass) {
        match class {
            FrameErrorClass::Parse => self.parse_errors.fetch_add(1, Ordering::Relaxed),
            FrameErrorClass::Checksum => self.checksum_errors.fetch_add(1, Ordering::Relaxed),
            FrameErrorClass::Invalid => self.invalid_messages.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Exponential moving average with alpha = 1/10.
    fn record_parse_time(&self, parse_ns: u64) {
        let old = self.avg_parse_time_ns.load(Ordering::Relaxed);
        let new = if old == 0 {
            parse_ns
        } else {
            old - old / 10 + parse_ns / 10
        };
        self.avg_parse_time_ns.store(new, Ordering::Relaxed);
    }

    /// Best-effort value copy of all counters.
    pub fn snapshot(&self) -> DecoderStatsSnapshot {
        DecoderStatsSnapshot {
            messages_parsed: self.messages_parsed.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            invalid_messages: self.invalid_messages.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            queue_full_events: self.queue_full_events.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            admission_rejects: self.admission_rejects.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
            avg_parse_time_ns: self.avg_parse_time_ns.load(Ordering::Relaxed),
        }
    }
}

/// Value copy of [`DecoderStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct DecoderStatsSnapshot {
    /// Frames parsed and validated.
    pub messages_parsed: u64,
    /// Malformed bytes, bad framing, oversized frames.
    pub parse_errors: u64,
    /// Checksum trailer mismatches.
    pub checksum_errors: u64,
    /// Structurally parsed but semantically unusable frames.
    pub invalid_messages: u64,
    /// Raw bytes fed into the decoder.
    pub bytes_processed: u64,
    /// Enqueue attempts that hit a full internal ring.
    pub queue_full_events: u64,
    /// Frames dropped because a ring was full.
    pub messages_dropped: u64,
    /// Frames refused by the admission gate.
    pub admission_rejects: u64,
    /// Message-callback panics swallowed.
    pub callback_errors: u64,
    /// EMA of per-frame parse time.
    pub avg_parse_time_ns: u64,
}

/// The decoder front end and its worker pool.
pub struct SessionDecoder {
    raw_frames: Arc<RingBuffer<Vec<u8>>>,
    parsed_frames: Arc<RingBuffer<FixMessage>>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    framers: HashMap<u64, Framer>,
    stats: Arc<DecoderStats>,
    gate: Option<Arc<RateGate>>,
    message_callback: Option<MessageCallback>,
    error_callback: Option<SessionErrorCallback>,
    parser_workers: usize,
    max_frame: usize,
    error_window: usize,
    error_limit: usize,
}

impl SessionDecoder {
    /// Build a decoder from validated configuration.
    pub fn new(config: &VenueConfig) -> Self {
        Self {
            raw_frames: Arc::new(RingBuffer::with_capacity(PARSER_QUEUE_SIZE)),
            parsed_frames: Arc::new(RingBuffer::with_capacity(PARSER_QUEUE_SIZE)),
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            framers: HashMap::new(),
            stats: Arc::new(DecoderStats::default()),
            gate: None,
            message_callback: None,
            error_callback: None,
            parser_workers: config.parser_workers,
            max_frame: config.max_frame_bytes,
            error_window: config.session_error_window,
            error_limit: config.session_error_limit,
        }
    }

    /// Attach the admission gate applied at decoder egress.
    pub fn set_admission_gate(&mut self, gate: Arc<RateGate>) {
        self.gate = Some(gate);
    }

    /// Set the callback receiving validated frames. Must be set before
    /// `start`.
    pub fn set_message_callback(&mut self, callback: MessageCallback) {
        self.message_callback = Some(callback);
    }

    /// Set the callback receiving session errors.
    pub fn set_error_callback(&mut self, callback: SessionErrorCallback) {
        self.error_callback = Some(callback);
    }

    /// Decoder counters.
    pub fn stats(&self) -> DecoderStatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn the parser and drain workers.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let parse_workers = (self.parser_workers / 2).max(1);
        let drain_workers = (self.parser_workers - parse_workers).max(1);
        info!("session decoder starting {parse_workers} parse + {drain_workers} drain workers");

        for i in 0..parse_workers {
            let raw = Arc::clone(&self.raw_frames);
            let parsed = Arc::clone(&self.parsed_frames);
            let running = Arc::clone(&self.running);
            let stats = Arc::clone(&self.stats);
            let error_cb = self.error_callback.clone();
            let worker = std::thread::Builder::new()
                .name(format!("fix-parse-{i}"))
                .spawn(move || parse_worker(raw, parsed, running, stats, error_cb))
                .expect("spawn parse worker");
            self.workers.push(worker);
        }
        for i in 0..drain_workers {
            let parsed = Arc::clone(&self.parsed_frames);
            let running = Arc::clone(&self.running);
            let stats = Arc::clone(&self.stats);
            let message_cb = self.message_callback.clone();
            let error_cb = self.error_callback.clone();
            let worker = std::thread::Builder::new()
                .name(format!("fix-drain-{i}"))
                .spawn(move || drain_worker(parsed, running, stats, message_cb, error_cb))
                .expect("spawn drain worker");
            self.workers.push(worker);
        }
    }

    /// Stop and join all workers.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!("session decoder stopped");
    }

    /// Whether the workers are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Feed raw transport bytes for one session. Complete frames pass the
    /// admission gate and land on the parser ring; frame errors are
    /// counted and reported, and the stream resynchronises.
    pub fn feed(&mut self, session_id: u64, data: &[u8]) {
        self.stats
            .bytes_processed
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        let stats = Arc::clone(&self.stats);
        let gate = self.gate.clone();
        let raw_frames = Arc::clone(&self.raw_frames);
        let error_cb = self.error_callback.clone();

        let max_frame = self.max_frame;
        let window = self.error_window;
        let limit = self.error_limit;
        let framer = self
            .framers
            .entry(session_id)
            .or_insert_with(|| Framer::new(max_frame, window, limit));
        let was_closed = framer.is_closed();
        framer.push(data);

        loop {
            match framer.next_frame() {
                Ok(Some(frame)) => {
                    if let Some(gate) = &gate
                        && !gate.try_admit()
                    {
                        stats.admission_rejects.fetch_add(1, Ordering::Relaxed);
                        emit(&error_cb, "ADMISSION_REJECT", "rate ceiling exceeded");
                        continue;
                    }
                    if let Err(QueueFull(_)) = raw_frames.try_enqueue(frame) {
                        stats.queue_full_events.fetch_add(1, Ordering::Relaxed);
                        stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                        emit(&error_cb, "QUEUE_FULL", "raw frame ring is full");
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    stats.count_error(error.class());
                    emit(&error_cb, code_for(error.class()), &error.to_string());
                }
            }
        }

        if framer.is_closed() && !was_closed {
            warn!("session {session_id} torn down after repeated frame errors");
            emit(
                &error_cb,
                "SESSION_CLOSED",
                &format!("session {session_id} exceeded its frame error budget"),
            );
        }
    }

    /// Whether a session has been torn down.
    pub fn session_closed(&self, session_id: u64) -> bool {
        self.framers
            .get(&session_id)
            .map(|f| f.is_closed())
            .unwrap_or(false)
    }
}

impl Drop for SessionDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn emit(callback: &Option<SessionErrorCallback>, code: &str, message: &str) {
    if let Some(cb) = callback {
        cb(code, message);
    }
}

fn code_for(class: FrameErrorClass) -> &'static str {
    match class {
        FrameErrorClass::Parse => "PARSE_ERROR",
        FrameErrorClass::Checksum => "CHECKSUM_ERROR",
        FrameErrorClass::Invalid => "INVALID_MESSAGE",
    }
}

fn parse_worker(
    raw: Arc<RingBuffer<Vec<u8>>>,
    parsed: Arc<RingBuffer<FixMessage>>,
    running: Arc<AtomicBool>,
    stats: Arc<DecoderStats>,
    error_cb: Option<SessionErrorCallback>,
) {
    let backoff = Backoff::new();
    while running.load(Ordering::Acquire) {
        match raw.try_dequeue_shared() {
            Some(bytes) => {
                backoff.reset();
                let started = Instant::now();
                match FixMessage::parse(&bytes) {
                    Ok(message) => {
                        stats.messages_parsed.fetch_add(1, Ordering::Relaxed);
                        if let Err(QueueFull(_)) = parsed.try_enqueue(message) {
                            stats.queue_full_events.fetch_add(1, Ordering::Relaxed);
                            stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                            emit(&error_cb, "QUEUE_FULL", "parsed frame ring is full");
                        }
                    }
                    Err(error) => {
                        stats.count_error(error.class());
                        emit(&error_cb, code_for(error.class()), &error.to_string());
                    }
                }
                stats.record_parse_time(started.elapsed().as_nanos() as u64);
            }
            None => backoff.snooze(),
        }
    }
}

fn drain_worker(
    parsed: Arc<RingBuffer<FixMessage>>,
    running: Arc<AtomicBool>,
    stats: Arc<DecoderStats>,
    message_cb: Option<MessageCallback>,
    error_cb: Option<SessionErrorCallback>,
) {
    let backoff = Backoff::new();
    while running.load(Ordering::Acquire) {
        match parsed.try_dequeue_shared() {
            Some(message) => {
                backoff.reset();
                if let Some(cb) = &message_cb
                    && catch_unwind(AssertUnwindSafe(|| cb(&message))).is_err()
                {
                    stats.callback_errors.fetch_add(1, Ordering::Relaxed);
                    emit(&error_cb, "CALLBACK_ERROR", "message callback panicked");
                }
            }
            None => backoff.snooze(),
        }
    }
}

/// Translate a validated order message into an engine command.
///
/// `D` becomes `Submit`, `F` becomes `Cancel`, `G` becomes `Modify`
/// (executed downstream as cancel + resubmit under a fresh id). Anything
/// else, including inbound execution reports, is refused.
pub fn to_command(message: &FixMessage) -> Result<Command, SessionError> {
    match message.msg_type.as_str() {
        tags::MSG_TYPE_NEW_ORDER_SINGLE => {
            let id = OrderId::new(u64_field(message, tags::CL_ORD_ID)?);
            let symbol = symbol_field(message)?;
            let side = side_field(message)?;
            let quantity = message.get_quantity(tags::ORDER_QTY)?;
            let ord_type = message.get_field(tags::ORD_TYPE).unwrap_or("2");
            let tif = message.get_field(tags::TIME_IN_FORCE).unwrap_or("0");

            let kind = if ord_type == "1" {
                OrderKind::Market
            } else {
                match tif {
                    "3" => OrderKind::Ioc,
                    "4" => OrderKind::Fok,
                    _ => OrderKind::Limit,
                }
            };
            let price = if kind == OrderKind::Market {
                Price::ZERO
            } else {
                message.get_price(tags::PRICE)?
            };
            Ok(Command::Submit(Order::new(
                id, symbol, side, kind, price, quantity,
            )))
        }
        tags::MSG_TYPE_ORDER_CANCEL => {
            let id = order_id_field(message)?;
            Ok(Command::Cancel(id))
        }
        tags::MSG_TYPE_ORDER_REPLACE => {
            let id = order_id_field(message)?;
            let new_price = message.get_price(tags::PRICE)?;
            let new_quantity = message.get_quantity(tags::ORDER_QTY)?;
            Ok(Command::Modify {
                order_id: id,
                new_price,
                new_quantity,
            })
        }
        other => Err(SessionError::UnsupportedMsgType(other.to_string())),
    }
}

fn u64_field(message: &FixMessage, tag: u32) -> Result<u64, SessionError> {
    let value = message.get_field(tag).ok_or(SessionError::MissingField(tag))?;
    value.parse().map_err(|_| SessionError::BadFieldValue {
        tag,
        value: value.to_string(),
    })
}

fn order_id_field(message: &FixMessage) -> Result<OrderId, SessionError> {
    if message.has_field(tags::ORDER_ID) {
        Ok(OrderId::new(u64_field(message, tags::ORDER_ID)?))
    } else {
        Ok(OrderId::new(u64_field(message, tags::CL_ORD_ID)?))
    }
}

fn symbol_field(message: &FixMessage) -> Result<Symbol, SessionError> {
    let value = message
        .get_field(tags::SYMBOL)
        .ok_or(SessionError::MissingField(tags::SYMBOL))?;
    value.parse().map_err(|_| SessionError::BadFieldValue {
        tag: tags::SYMBOL,
        value: value.to_string(),
    })
}

fn side_field(message: &FixMessage) -> Result<Side, SessionError> {
    match message.get_field(tags::SIDE) {
        Some("1") => Ok(Side::Buy),
        Some("2") => Ok(Side::Sell),
        Some(other) => Err(SessionError::BadFieldValue {
            tag: tags::SIDE,
            value: other.to_string(),
        }),
        None => Err(SessionError::MissingField(tags::SIDE)),
    }
}
