//! End-to-end wiring of the venue core.
//!
//! `Venue` owns the full pipeline: bytes feed per-session framers, the
//! decoder's worker pool validates frames and hands order messages to the
//! engine's ingress ring through the admission gate, the matching worker
//! mutates books and the dispatch bus fans out execution reports and
//! fills. In-process producers can bypass the session layer and submit
//! commands directly against the same ring.

use crate::admission::AdmissionController;
use crate::config::{ConfigError, VenueConfig};
use crate::dispatch::DispatchBus;
use crate::engine::{EngineError, EngineHandle, MatchingCore, MatchingEngine, StatsSnapshot};
use crate::ingress::Command;
use crate::order::{Order, OrderId, Price};
use crate::session::{
    DecoderStatsSnapshot, FixMessage, SessionDecoder, SessionErrorCallback, tags, to_command,
};
use crate::timebase::Timebase;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// The assembled venue core.
pub struct Venue {
    engine: MatchingEngine,
    decoder: SessionDecoder,
    admission: AdmissionController,
    session_error_cb: Option<SessionErrorCallback>,
    timebase: Timebase,
}

impl Venue {
    /// Validate `config` and assemble all components. Listeners must
    /// already be registered on `bus`.
    pub fn new(config: VenueConfig, bus: DispatchBus) -> Result<Self, ConfigError> {
        config.validate()?;
        let timebase = Timebase::new();

        let mut admission = AdmissionController::new(&config);
        let mut engine = MatchingEngine::new(&config, bus, timebase)?;
        if let Some(recorder) = admission.recorder() {
            engine.set_latency_recorder(recorder);
        }

        let handle = engine.handle();
        let depth_handle = handle.clone();
        admission.set_depth_probe(Arc::new(move || depth_handle.queue_depth_ratio()));
        let drop_handle = handle;
        admission.set_drop_probe(Arc::new(move || drop_handle.queue_drops()));

        let mut decoder = SessionDecoder::new(&config);
        decoder.set_admission_gate(admission.gate());

        Ok(Self {
            engine,
            decoder,
            admission,
            session_error_cb: None,
            timebase,
        })
    }

    /// Callback for session-level errors (frame errors, admission and
    /// backpressure rejects, session teardown). Set before `start`.
    pub fn set_session_error_callback(&mut self, callback: SessionErrorCallback) {
        self.decoder.set_error_callback(callback.clone());
        self.session_error_cb = Some(callback);
    }

    /// Start the matching worker, the admission loop and the decoder
    /// pool.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.engine.start()?;
        self.admission.start();

        let handle = self.engine.handle();
        let error_cb = self.session_error_cb.clone();
        self.decoder
            .set_message_callback(Arc::new(move |message: &FixMessage| {
                dispatch_message(&handle, &error_cb, message);
            }));
        self.decoder.start();
        info!("venue started");
        Ok(())
    }

    /// Stop everything, decoder first so the ring drains into the engine
    /// before the matching worker exits.
    pub fn stop(&mut self) {
        self.decoder.stop();
        self.admission.stop();
        self.engine.stop();
        info!("venue stopped");
    }

    /// Feed raw session bytes for one session.
    pub fn feed(&mut self, session_id: u64, bytes: &[u8]) {
        self.decoder.feed(session_id, bytes);
    }

    /// Submit an order directly, bypassing the session layer.
    pub fn submit(&self, order: Order) -> Result<(), EngineError> {
        self.engine.submit(order)
    }

    /// Cancel an order directly.
    pub fn cancel(&self, order_id: OrderId) -> Result<(), EngineError> {
        self.engine.cancel(order_id)
    }

    /// Replace an order's price and quantity directly.
    pub fn modify(
        &self,
        order_id: OrderId,
        new_price: Price,
        new_quantity: u64,
    ) -> Result<(), EngineError> {
        self.engine.modify(order_id, new_price, new_quantity)
    }

    /// A cloneable submission handle for producer threads.
    pub fn engine_handle(&self) -> EngineHandle {
        self.engine.handle()
    }

    /// Global matching statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats()
    }

    /// Decoder counters.
    pub fn decoder_stats(&self) -> DecoderStatsSnapshot {
        self.decoder.stats()
    }

    /// The currently admitted rate ceiling in messages per second.
    pub fn admitted_rate_ceiling(&self) -> f64 {
        self.admission.gate().ceiling()
    }

    /// The engine core, for inspection while stopped.
    pub fn core(&self) -> Option<&MatchingCore> {
        self.engine.core()
    }

    /// The venue's monotonic timebase handle.
    pub fn timebase(&self) -> Timebase {
        self.timebase
    }
}

/// Route one validated frame into the engine, surfacing refusals on the
/// session error path.
fn dispatch_message(
    handle: &EngineHandle,
    error_cb: &Option<SessionErrorCallback>,
    message: &FixMessage,
) {
    if !tags::is_order_message(&message.msg_type) {
        trace!("ignoring non-order message type '{}'", message.msg_type);
        return;
    }
    let result = match to_command(message) {
        Ok(Command::Submit(order)) => handle.submit(order),
        Ok(Command::Cancel(order_id)) => handle.cancel(order_id),
        Ok(Command::Modify {
            order_id,
            new_price,
            new_quantity,
        }) => handle.modify(order_id, new_price, new_quantity),
        Err(error) => {
            warn!("untranslatable order message: {error}");
            if let Some(cb) = error_cb {
                cb("INVALID_MESSAGE", &error.to_string());
            }
            return;
        }
    };
    if let Err(error) = result {
        // The order never entered the book; this is a session-level
        // reject, not an execution report.
        let code = match error {
            EngineError::Backpressure => "BACKPRESSURE",
            _ => "COMMAND_REJECTED",
        };
        if let Some(cb) = error_cb {
            cb(code, &error.to_string());
        }
    }
}
