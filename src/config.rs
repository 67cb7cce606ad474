//! Venue configuration and startup validation.
//!
//! A [`VenueConfig`] is deserializable from an operator-supplied JSON
//! document and validated once at startup; every constructor downstream
//! assumes a validated config. Validation failures map to non-zero exit
//! codes at operator entry points.

use crate::engine::MatchingAlgorithm;
use crate::order::{Price, Symbol};
use serde::{Deserialize, Serialize};

/// Hard upper bound on a session frame, in bytes.
pub const MAX_FRAME_BYTES: usize = 8_192;

/// Maximum number of parser workers in the session decoder pool.
pub const MAX_PARSER_WORKERS: usize = 4;

/// Minimum ingress ring capacity.
pub const MIN_INGRESS_CAPACITY: usize = 1 << 10;

/// Configuration errors detected at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Ingress capacity must be a power of two of at least 2^10.
    #[error("ingress capacity {0} is not a power of two >= {MIN_INGRESS_CAPACITY}")]
    BadIngressCapacity(usize),
    /// Frame bound above the hard protocol limit.
    #[error("max frame bytes {0} exceeds hard limit {MAX_FRAME_BYTES}")]
    FrameBoundTooLarge(usize),
    /// Parser worker count outside `1..=4`.
    #[error("parser workers {0} outside 1..={MAX_PARSER_WORKERS}")]
    BadParserWorkers(usize),
    /// A configured symbol failed to parse.
    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),
    /// A limit that must be positive was zero.
    #[error("{0} must be positive")]
    ZeroLimit(&'static str),
    /// A gain or ratio outside its sensible range.
    #[error("{name} = {value} outside valid range")]
    BadControlParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
}

/// Complete venue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    /// Instruments the venue recognises. Orders for anything else are
    /// rejected with `UNKNOWN_SYMBOL`.
    pub symbols: Vec<String>,
    /// Intra-level allocation policy.
    pub matching_algorithm: MatchingAlgorithm,
    /// Select the arena+index book backend (default) or the ordered-map
    /// backend.
    pub use_indexed_book: bool,
    /// Ingress ring capacity; power of two, at least 2^10.
    pub ingress_capacity: usize,
    /// Per-frame byte bound for the session decoder.
    pub max_frame_bytes: usize,
    /// Session parser worker pool size, `1..=4`.
    pub parser_workers: usize,
    /// Admission setpoint: target P99 match latency in nanoseconds.
    pub p99_target_ns: u64,
    /// Proportional gain of the admission loop.
    pub admission_kp: f64,
    /// Integral gain of the admission loop.
    pub admission_ki: f64,
    /// Derivative gain (on queue depth) of the admission loop.
    pub admission_kd: f64,
    /// Queue-depth ratio that triggers the emergency brake.
    pub emergency_depth_ratio: f64,
    /// Ingress drop rate (messages/sec) that triggers the emergency brake.
    pub admission_drop_rate_threshold: f64,
    /// Admission control tick in milliseconds.
    pub control_interval_ms: u64,
    /// Initial admitted rate in messages per second.
    pub admission_initial_rate: f64,
    /// Floor for the admitted rate in messages per second.
    pub admission_min_rate: f64,
    /// Ceiling for the admitted rate in messages per second.
    pub admission_max_rate: f64,
    /// Absolute net-flow ceiling per symbol.
    pub per_symbol_position_limit: i64,
    /// Per-order notional ceiling in price minor units.
    pub per_order_notional_limit: u128,
    /// Exclusive upper bound on limit prices.
    pub max_price: Price,
    /// Inclusive upper bound on order quantity.
    pub max_quantity: u64,
    /// Sliding window length for session frame errors.
    pub session_error_window: usize,
    /// Errors within the window that tear the session down.
    pub session_error_limit: usize,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            matching_algorithm: MatchingAlgorithm::PriceTime,
            use_indexed_book: true,
            ingress_capacity: 1 << 16,
            max_frame_bytes: MAX_FRAME_BYTES,
            parser_workers: 2,
            p99_target_ns: 100_000,
            admission_kp: 0.5,
            admission_ki: 0.1,
            admission_kd: 0.25,
            emergency_depth_ratio: 0.9,
            admission_drop_rate_threshold: 100.0,
            control_interval_ms: 10,
            admission_initial_rate: 50_000.0,
            admission_min_rate: 500.0,
            admission_max_rate: 1_000_000.0,
            per_symbol_position_limit: 10_000_000,
            per_order_notional_limit: 10_000_000 * crate::order::PRICE_SCALE as u128,
            max_price: Price::from_raw(1_000_000 * crate::order::PRICE_SCALE),
            max_quantity: 1_000_000,
            session_error_window: 32,
            session_error_limit: 8,
        }
    }
}

impl VenueConfig {
    /// Validate every field; must pass before any component is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingress_capacity < MIN_INGRESS_CAPACITY || !self.ingress_capacity.is_power_of_two()
        {
            return Err(ConfigError::BadIngressCapacity(self.ingress_capacity));
        }
        if self.max_frame_bytes == 0 || self.max_frame_bytes > MAX_FRAME_BYTES {
            return Err(ConfigError::FrameBoundTooLarge(self.max_frame_bytes));
        }
        if self.parser_workers == 0 || self.parser_workers > MAX_PARSER_WORKERS {
            return Err(ConfigError::BadParserWorkers(self.parser_workers));
        }
        for symbol in &self.symbols {
            if symbol.parse::<Symbol>().is_err() {
                return Err(ConfigError::InvalidSymbol(symbol.clone()));
            }
        }
        if self.p99_target_ns == 0 {
            return Err(ConfigError::ZeroLimit("p99_target_ns"));
        }
        if self.max_quantity == 0 {
            return Err(ConfigError::ZeroLimit("max_quantity"));
        }
        if self.max_price.is_zero() {
            return Err(ConfigError::ZeroLimit("max_price"));
        }
        if self.per_order_notional_limit == 0 {
            return Err(ConfigError::ZeroLimit("per_order_notional_limit"));
        }
        if self.control_interval_ms == 0 {
            return Err(ConfigError::ZeroLimit("control_interval_ms"));
        }
        for (name, value) in [
            ("admission_kp", self.admission_kp),
            ("admission_ki", self.admission_ki),
            ("admission_kd", self.admission_kd),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::BadControlParameter { name, value });
            }
        }
        if !self.admission_drop_rate_threshold.is_finite() || self.admission_drop_rate_threshold < 0.0
        {
            return Err(ConfigError::BadControlParameter {
                name: "admission_drop_rate_threshold",
                value: self.admission_drop_rate_threshold,
            });
        }
        if !(0.0..=1.0).contains(&self.emergency_depth_ratio) {
            return Err(ConfigError::BadControlParameter {
                name: "emergency_depth_ratio",
                value: self.emergency_depth_ratio,
            });
        }
        if self.admission_min_rate <= 0.0
            || self.admission_max_rate < self.admission_min_rate
            || self.admission_initial_rate < self.admission_min_rate
            || self.admission_initial_rate > self.admission_max_rate
        {
            return Err(ConfigError::BadControlParameter {
                name: "admission_initial_rate",
                value: self.admission_initial_rate,
            });
        }
        if self.session_error_window == 0 || self.session_error_limit == 0 {
            return Err(ConfigError::ZeroLimit("session_error_window"));
        }
        Ok(())
    }

    /// Parse a config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: VenueConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
