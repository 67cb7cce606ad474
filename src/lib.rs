//! # Low-Latency In-Process Trading Venue Core
//!
//! A trading venue core written in Rust: it accepts a continuous stream of
//! orders for multiple instruments, maintains a price–time priority limit
//! order book per instrument, matches aggressive orders against resting
//! liquidity, and emits fills and execution reports to downstream
//! consumers.
//!
//! ## Key Components
//!
//! - **Matching engine** ([`MatchingEngine`]): a single-writer loop that
//!   owns every order book and the live-order index. Commands arrive over
//!   a bounded lock-free ring; fills always print at the resting price;
//!   IOC and FOK semantics are enforced at the engine, with FOK
//!   pre-flighted so a partial fill can never leak out.
//!
//! - **Order books** ([`Book`]): two interchangeable backends, a
//!   slab-arena book with an intrusive per-level FIFO (O(1) cancel-by-id
//!   and fill-from-front, no steady-state allocation) and an ordered-map
//!   book. Best-price lookups are served from a validity-flagged cache.
//!
//! - **Ingress queue** ([`RingBuffer`]): a bounded MPSC ring with
//!   sequence-numbered slots and cache-line-separated cursors. A full
//!   ring is reported to the caller as backpressure, never blocked on.
//!
//! - **Session decoder** ([`SessionDecoder`]): a FIX-style tag-value
//!   protocol: per-session reassembly through an explicit framing state
//!   machine, mod-256 checksum verification, a stateless parser worker
//!   pool, and resynchronisation to the next frame marker after any
//!   error. Order messages (`D`, `F`, `G`) translate into engine
//!   commands; execution reports (`8`) are emitted outbound.
//!
//! - **Admission control** ([`AdmissionController`]): a PID loop holding
//!   P99 match latency to a configured budget. Latency is sketched with
//!   an HDR histogram fed from the matching thread; enforcement happens
//!   at decoder egress through a shared [`RateGate`], with an emergency
//!   brake on queue depth and drop rate.
//!
//! - **Dispatch bus** ([`DispatchBus`]): execution-report, fill and error
//!   listeners invoked synchronously on the matching thread, with
//!   channel forwarders (std and Tokio) for slow consumers.
//!
//! ## Threading Model
//!
//! The matching worker is the sole writer of all books and of the order
//! index; producers interact with it only through the ingress ring.
//! Statistics are relaxed atomic accumulators, exact after quiescence.
//! There are no locks on the matching hot path.
//!
//! ## Example
//!
//! ```no_run
//! use venue_core::prelude::*;
//! use std::sync::Arc;
//!
//! let mut config = VenueConfig::default();
//! config.symbols = vec!["BTC/USD".to_string()];
//!
//! let mut bus = DispatchBus::new();
//! bus.on_execution(Arc::new(|report: &ExecutionReport| {
//!     println!("report: {} {}", report.order_id, report.status);
//! }));
//!
//! let mut venue = Venue::new(config, bus).expect("valid config");
//! venue.start().expect("startup");
//!
//! let symbol: Symbol = "BTC/USD".parse().unwrap();
//! let order = Order::limit(
//!     OrderId::new(1),
//!     symbol,
//!     Side::Buy,
//!     Price::from_decimal_str("42000.50").unwrap(),
//!     10,
//! );
//! venue.submit(order).expect("accepted");
//! venue.stop();
//! ```

pub mod admission;
pub mod book;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod ingress;
pub mod order;
pub mod prelude;
pub mod session;
pub mod timebase;
mod utils;
pub mod venue;

pub use admission::{AdmissionConfig, AdmissionController, PidController, RateGate};
pub use book::{Book, BookError, DepthLevel, IndexedBook, MappedBook};
pub use config::{ConfigError, VenueConfig};
pub use dispatch::{
    DispatchBus, ErrorListener, ExecutionListener, FillListener, VenueEvent, forward_events_std,
    forward_events_tokio,
};
pub use engine::{
    EngineError, EngineHandle, ExecutionReport, Fill, MatchingAlgorithm, MatchingCore,
    MatchingEngine, RejectReason, StatsSnapshot, SymbolStatsSnapshot,
};
pub use ingress::{Command, QueueFull, RingBuffer};
pub use order::{Order, OrderId, OrderKind, OrderStatus, Price, Side, Symbol};
pub use session::{
    FixMessage, FixMessageBuilder, SessionDecoder, SessionError, encode_execution_report,
};
pub use timebase::Timebase;
pub use utils::{UuidFactory, current_time_millis};
pub use venue::Venue;
