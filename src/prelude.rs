/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Prelude module that re-exports commonly used types and traits.
//!
//! Instead of importing each type individually, you can use:
//!
//! ```rust
//! use venue_core::prelude::*;
//! ```
//!
//! This imports everything needed to configure, run and observe the venue
//! core.

// Venue wiring and configuration
pub use crate::config::{ConfigError, VenueConfig};
pub use crate::venue::Venue;

// Engine types
pub use crate::engine::{
    EngineError, EngineHandle, ExecutionReport, Fill, MatchingAlgorithm, MatchingCore,
    MatchingEngine, RejectReason, StatsSnapshot, SymbolStatsSnapshot,
};

// Book types
pub use crate::book::{Book, BookError, DepthLevel};

// Order domain types
pub use crate::order::{Order, OrderId, OrderKind, OrderStatus, Price, Side, Symbol};

// Ingress
pub use crate::ingress::{Command, QueueFull, RingBuffer};

// Session layer
pub use crate::session::{
    FixMessage, FixMessageBuilder, SessionDecoder, SessionError, encode_execution_report,
};

// Admission control
pub use crate::admission::{AdmissionController, PidController, RateGate};

// Event dispatch
pub use crate::dispatch::{DispatchBus, VenueEvent, forward_events_std, forward_events_tokio};

// Timing
pub use crate::timebase::Timebase;

// Utility functions
pub use crate::utils::current_time_millis;
