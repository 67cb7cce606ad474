//! PID-driven admission control targeting a P99 match-latency budget.
//!
//! A control thread wakes every tick, refreshes the latency sketch fed by
//! the matching worker's recorder, and republishes the admitted-rate
//! ceiling on the [`RateGate`]. The proportional term reacts to the P99
//! error, the integral term absorbs steady-state bias, and the derivative
//! term damps ingress-depth spikes. An emergency brake halves the ceiling
//! when the queue nears capacity or drops surge, then holds through a
//! cooldown.

use super::gate::RateGate;
use crate::config::VenueConfig;
use hdrhistogram::Histogram;
use hdrhistogram::sync::{Recorder, SyncHistogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ticks the brake holds after an emergency halving.
const COOLDOWN_TICKS: u32 = 10;
/// Clamp on the accumulated integral term.
const INTEGRAL_CLAMP: f64 = 10.0;
/// Highest latency the sketch can record (one minute).
const SKETCH_MAX_NS: u64 = 60_000_000_000;

/// Tuning parameters for the control loop.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionConfig {
    /// Setpoint: target P99 latency in nanoseconds.
    pub p99_target_ns: u64,
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain, applied to queue-depth changes.
    pub kd: f64,
    /// Depth ratio that triggers the emergency brake.
    pub emergency_depth_ratio: f64,
    /// Drop rate (messages/sec) that triggers the emergency brake.
    pub drop_rate_threshold: f64,
    /// Control tick interval.
    pub interval: Duration,
    /// Starting ceiling in messages per second.
    pub initial_rate: f64,
    /// Floor on the ceiling.
    pub min_rate: f64,
    /// Cap on the ceiling.
    pub max_rate: f64,
}

impl AdmissionConfig {
    /// Extract the admission parameters from a validated venue config.
    pub fn from_venue(config: &VenueConfig) -> Self {
        Self {
            p99_target_ns: config.p99_target_ns,
            kp: config.admission_kp,
            ki: config.admission_ki,
            kd: config.admission_kd,
            emergency_depth_ratio: config.emergency_depth_ratio,
            drop_rate_threshold: config.admission_drop_rate_threshold,
            interval: Duration::from_millis(config.control_interval_ms),
            initial_rate: config.admission_initial_rate,
            min_rate: config.admission_min_rate,
            max_rate: config.admission_max_rate,
        }
    }
}

/// The discrete PID law, separated from threading so deployments can
/// tune gains against recorded traces.
#[derive(Debug)]
pub struct PidController {
    config: AdmissionConfig,
    ceiling: f64,
    integral: f64,
    last_depth_ratio: f64,
    cooldown: u32,
}

impl PidController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            ceiling: config.initial_rate,
            integral: 0.0,
            last_depth_ratio: 0.0,
            cooldown: 0,
            config,
        }
    }

    /// Current ceiling in messages per second.
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Whether the emergency cooldown is active.
    pub fn in_cooldown(&self) -> bool {
        self.cooldown > 0
    }

    /// One control tick. Returns the new ceiling.
    pub fn step(&mut self, p99_ns: u64, depth_ratio: f64, drop_rate: f64) -> f64 {
        if depth_ratio > self.config.emergency_depth_ratio
            || drop_rate > self.config.drop_rate_threshold
        {
            self.ceiling = (self.ceiling / 2.0).max(self.config.min_rate);
            self.cooldown = COOLDOWN_TICKS;
            self.integral = 0.0;
            self.last_depth_ratio = depth_ratio;
            warn!(
                "admission emergency brake: depth {depth_ratio:.2}, drops {drop_rate:.0}/s, \
                 ceiling {:.0} msg/s",
                self.ceiling
            );
            return self.ceiling;
        }
        if self.cooldown > 0 {
            self.cooldown -= 1;
            self.last_depth_ratio = depth_ratio;
            return self.ceiling;
        }

        let target = self.config.p99_target_ns as f64;
        let error = (p99_ns as f64 - target) / target;
        self.integral = (self.integral + error).clamp(-INTEGRAL_CLAMP, INTEGRAL_CLAMP);
        let derivative = depth_ratio - self.last_depth_ratio;
        self.last_depth_ratio = depth_ratio;

        let control =
            self.config.kp * error + self.config.ki * self.integral + self.config.kd * derivative;
        let factor = (1.0 - control).clamp(0.5, 1.5);
        self.ceiling = (self.ceiling * factor).clamp(self.config.min_rate, self.config.max_rate);
        self.ceiling
    }
}

/// The admission controller runtime: latency sketch, PID law, control
/// thread and the shared gate.
pub struct AdmissionController {
    config: AdmissionConfig,
    gate: Arc<RateGate>,
    histogram: Option<SyncHistogram<u64>>,
    depth_probe: Option<Arc<dyn Fn() -> f64 + Send + Sync>>,
    drop_probe: Option<Arc<dyn Fn() -> u64 + Send + Sync>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AdmissionController {
    /// Build a controller from validated configuration.
    pub fn new(venue_config: &VenueConfig) -> Self {
        let config = AdmissionConfig::from_venue(venue_config);
        let permits = permits_per_tick(config.initial_rate, config.interval);
        // Static bounds and precision; construction cannot fail for them.
        let histogram = Histogram::<u64>::new_with_bounds(1, SKETCH_MAX_NS, 3)
            .expect("static histogram bounds")
            .into_sync();
        Self {
            gate: Arc::new(RateGate::new(permits, config.initial_rate)),
            config,
            histogram: Some(histogram),
            depth_probe: None,
            drop_probe: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// The gate the decoder enforces against.
    pub fn gate(&self) -> Arc<RateGate> {
        Arc::clone(&self.gate)
    }

    /// A recorder handle for the matching worker. Must be taken before
    /// `start`.
    pub fn recorder(&mut self) -> Option<Recorder<u64>> {
        self.histogram.as_mut().map(|h| h.recorder())
    }

    /// Probe reporting ingress queue occupancy as a `0.0..=1.0` ratio.
    pub fn set_depth_probe(&mut self, probe: Arc<dyn Fn() -> f64 + Send + Sync>) {
        self.depth_probe = Some(probe);
    }

    /// Probe reporting the cumulative ingress drop counter.
    pub fn set_drop_probe(&mut self, probe: Arc<dyn Fn() -> u64 + Send + Sync>) {
        self.drop_probe = Some(probe);
    }

    /// Spawn the control thread.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut histogram) = self.histogram.take() else {
            // The sketch moved into a previous run; the controller is
            // single-shot.
            self.running.store(false, Ordering::SeqCst);
            return;
        };
        let config = self.config;
        let gate = Arc::clone(&self.gate);
        let running = Arc::clone(&self.running);
        let depth_probe = self.depth_probe.clone();
        let drop_probe = self.drop_probe.clone();

        let worker = std::thread::Builder::new()
            .name("admission-control".to_string())
            .spawn(move || {
                info!(
                    "admission control started: target P99 {}ns, tick {:?}",
                    config.p99_target_ns, config.interval
                );
                let mut pid = PidController::new(config);
                let mut last_drops = drop_probe.as_ref().map(|p| p()).unwrap_or(0);
                let dt = config.interval.as_secs_f64();

                while running.load(Ordering::Acquire) {
                    std::thread::sleep(config.interval);
                    histogram.refresh_timeout(config.interval / 2);
                    let p99 = histogram.value_at_quantile(0.99);

                    let depth = depth_probe.as_ref().map(|p| p()).unwrap_or(0.0);
                    let drops = drop_probe.as_ref().map(|p| p()).unwrap_or(0);
                    let drop_rate = drops.saturating_sub(last_drops) as f64 / dt;
                    last_drops = drops;

                    let ceiling = pid.step(p99, depth, drop_rate);
                    gate.set_budget(permits_per_tick(ceiling, config.interval), ceiling);
                    gate.begin_tick();
                    debug!(
                        "admission tick: p99 {p99}ns, depth {depth:.2}, \
                         drops {drop_rate:.0}/s, ceiling {ceiling:.0} msg/s"
                    );
                }
                info!("admission control stopped");
            })
            .expect("spawn admission control thread");
        self.worker = Some(worker);
    }

    /// Stop and join the control thread.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Whether the control thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for AdmissionController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn permits_per_tick(rate: f64, interval: Duration) -> u64 {
    (rate * interval.as_secs_f64()).ceil().max(1.0) as u64
}
