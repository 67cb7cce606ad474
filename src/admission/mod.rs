//! Adaptive admission control: a PID loop holding P99 match latency to a
//! configured budget by throttling session ingress.

mod controller;
mod gate;

pub use controller::{AdmissionConfig, AdmissionController, PidController};
pub use gate::RateGate;
