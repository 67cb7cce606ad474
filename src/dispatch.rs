/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Fan-out of execution reports, fills and errors to listeners.
//!
//! Listeners are invoked synchronously on the matching thread and must
//! not block; a listener that panics is counted and swallowed so the
//! matching thread survives. For slow consumers, the channel forwarders
//! move events onto a std or Tokio channel processed off-thread,
//! mirroring the two manager flavours most deployments use.

use crate::engine::{ExecutionReport, Fill};
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// Listener for execution reports.
pub type ExecutionListener = Arc<dyn Fn(&ExecutionReport) + Send + Sync>;
/// Listener for individual fills.
pub type FillListener = Arc<dyn Fn(&Fill) + Send + Sync>;
/// Listener for error events `(code, message)`.
pub type ErrorListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// The listener capability set held by the matching engine.
///
/// Listeners are registered before the engine starts; the set is never
/// mutated afterwards, so reads on the matching thread are
/// unsynchronised by contract.
#[derive(Default)]
pub struct DispatchBus {
    executions: Vec<ExecutionListener>,
    fills: Vec<FillListener>,
    errors: Vec<ErrorListener>,
    callback_errors: Arc<AtomicU64>,
}

impl DispatchBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution-report listener.
    pub fn on_execution(&mut self, listener: ExecutionListener) -> &mut Self {
        self.executions.push(listener);
        self
    }

    /// Register a fill listener.
    pub fn on_fill(&mut self, listener: FillListener) -> &mut Self {
        self.fills.push(listener);
        self
    }

    /// Register an error listener.
    pub fn on_error(&mut self, listener: ErrorListener) -> &mut Self {
        self.errors.push(listener);
        self
    }

    /// Shared counter of swallowed listener panics.
    pub fn callback_error_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.callback_errors)
    }

    /// Number of listener invocations that panicked and were swallowed.
    pub fn callback_errors(&self) -> u64 {
        self.callback_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn emit_execution(&self, report: &ExecutionReport) {
        for listener in &self.executions {
            self.guard(|| listener(report));
        }
    }

    pub(crate) fn emit_fill(&self, fill: &Fill) {
        for listener in &self.fills {
            self.guard(|| listener(fill));
        }
    }

    pub(crate) fn emit_error(&self, code: &str, message: &str) {
        for listener in &self.errors {
            self.guard(|| listener(code, message));
        }
    }

    /// Run a listener, counting and swallowing panics. A slow listener is
    /// the operator's problem; a panicking one must not kill the matching
    /// thread.
    fn guard<F: FnOnce()>(&self, f: F) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            self.callback_errors.fetch_add(1, Ordering::Relaxed);
            error!("listener panicked; continuing");
        }
    }
}

impl std::fmt::Debug for DispatchBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchBus")
            .field("executions", &self.executions.len())
            .field("fills", &self.fills.len())
            .field("errors", &self.errors.len())
            .field("callback_errors", &self.callback_errors())
            .finish()
    }
}

/// A typed event as delivered over the channel forwarders.
#[derive(Debug, Clone, Serialize)]
pub enum VenueEvent {
    /// An execution report.
    Execution(ExecutionReport),
    /// A single fill.
    Fill(Fill),
    /// An error event `(code, message)`.
    Error {
        /// Stable machine-readable code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

/// Register listeners that forward every event into a std mpsc channel.
///
/// The receiver is serviced on whatever thread the caller chooses; the
/// matching thread only pays for the channel send.
pub fn forward_events_std(bus: &mut DispatchBus) -> std::sync::mpsc::Receiver<VenueEvent> {
    let (sender, receiver) = std::sync::mpsc::channel();

    let tx = sender.clone();
    bus.on_execution(Arc::new(move |report: &ExecutionReport| {
        if tx.send(VenueEvent::Execution(report.clone())).is_err() {
            error!("execution event receiver dropped");
        }
    }));
    let tx = sender.clone();
    bus.on_fill(Arc::new(move |fill: &Fill| {
        if tx.send(VenueEvent::Fill(*fill)).is_err() {
            error!("fill event receiver dropped");
        }
    }));
    bus.on_error(Arc::new(move |code: &str, message: &str| {
        if sender
            .send(VenueEvent::Error {
                code: code.to_string(),
                message: message.to_string(),
            })
            .is_err()
        {
            error!("error event receiver dropped");
        }
    }));

    receiver
}

/// Register listeners that forward every event into a Tokio unbounded
/// mpsc channel, for async consumers.
pub fn forward_events_tokio(
    bus: &mut DispatchBus,
) -> tokio::sync::mpsc::UnboundedReceiver<VenueEvent> {
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();

    let tx = sender.clone();
    bus.on_execution(Arc::new(move |report: &ExecutionReport| {
        if tx.send(VenueEvent::Execution(report.clone())).is_err() {
            error!("execution event receiver dropped");
        }
    }));
    let tx = sender.clone();
    bus.on_fill(Arc::new(move |fill: &Fill| {
        if tx.send(VenueEvent::Fill(*fill)).is_err() {
            error!("fill event receiver dropped");
        }
    }));
    bus.on_error(Arc::new(move |code: &str, message: &str| {
        if sender
            .send(VenueEvent::Error {
                code: code.to_string(),
                message: message.to_string(),
            })
            .is_err()
        {
            error!("error event receiver dropped");
        }
    }));

    receiver
}
