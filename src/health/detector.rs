//! Phi accrual failure detection.
//!
//! Implementation of "The Phi Accrual Failure Detector" by Hayashibara et
//! al. (http://ddg.jaist.ac.jp/pub/HDY+04.pdf). Instead of a binary
//! alive/dead flag driven by missed-heartbeat counters, the detector emits
//! a continuous suspicion score (phi) computed from the distribution of
//! observed heartbeat intervals.
//!
//! A low threshold is prone to wrong suspicions but detects real crashes
//! quickly; a high threshold makes fewer mistakes but needs more time.

use std::collections::VecDeque;
use std::time::Instant;

/// Default cap on the heartbeat-interval sample window.
pub const DEFAULT_MAX_SAMPLE_SIZE: usize = 1000;

/// Default suspicion threshold. 1 = 10% error rate, 2 = 1%, 3 = 0.1%.
pub const DEFAULT_THRESHOLD: f64 = 2.0;

// Floor applied to the survival probability before taking log10, so a
// long-dead endpoint produces a large finite phi instead of a domain error.
const PROBABILITY_FLOOR: f64 = 1e-128;

/// Accrual failure detector for a single monitored endpoint.
///
/// Each instance is owned by exactly one monitoring loop, so no internal
/// locking is needed. Timestamps are monotonic seconds measured from the
/// detector's creation; the `*_at` variants take an explicit timestamp so
/// callers and tests can inject time.
#[derive(Debug)]
pub struct PhiAccrualFailureDetector {
    intervals: VecDeque<f64>,
    last_heartbeat: Option<f64>,
    mean: Option<f64>,
    max_sample_size: usize,
    threshold: f64,
    epoch: Instant,
}

impl PhiAccrualFailureDetector {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_MAX_SAMPLE_SIZE, DEFAULT_THRESHOLD)
    }

    pub fn with_settings(max_sample_size: usize, threshold: f64) -> Self {
        Self {
            intervals: VecDeque::new(),
            last_heartbeat: None,
            mean: None,
            max_sample_size,
            threshold,
            epoch: Instant::now(),
        }
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Record a liveness signal at the current time.
    pub fn heartbeat(&mut self) {
        self.heartbeat_at(self.now());
    }

    /// Record a liveness signal at an explicit timestamp.
    ///
    /// The first heartbeat only records the timestamp; later heartbeats
    /// push the inter-arrival interval onto the bounded sample window and
    /// refresh the running mean once at least two samples exist.
    pub fn heartbeat_at(&mut self, now: f64) {
        match self.last_heartbeat {
            None => self.last_heartbeat = Some(now),
            Some(last) => {
                self.intervals.push_back(now - last);
                self.last_heartbeat = Some(now);
                if self.intervals.len() > self.max_sample_size {
                    self.intervals.pop_front();
                }
                if self.intervals.len() > 1 {
                    let sum: f64 = self.intervals.iter().sum();
                    self.mean = Some(sum / self.intervals.len() as f64);
                }
            }
        }
    }

    /// Current suspicion score.
    pub fn phi(&self) -> f64 {
        self.phi_at(self.now())
    }

    /// Suspicion score at an explicit timestamp.
    ///
    /// Without an established mean (fewer than two recorded intervals) the
    /// endpoint is conservatively reported as suspect: `threshold + 1`.
    pub fn phi_at(&self, now: f64) -> f64 {
        let (mean, last) = match (self.mean, self.last_heartbeat) {
            (Some(mean), Some(last)) => (mean, last),
            _ => return self.threshold + 1.0,
        };

        let elapsed = now - last;
        // Exponential survival term, kept exactly as deployed: tuned
        // thresholds depend on this curve, not on 1 - e^-x.
        let mut probability = (-elapsed / mean).exp();
        if probability < PROBABILITY_FLOOR {
            probability = PROBABILITY_FLOOR;
        }
        -probability.log10()
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive_at(self.now())
    }

    pub fn is_alive_at(&self, now: f64) -> bool {
        self.phi_at(now) < self.threshold
    }

    pub fn is_dead(&self) -> bool {
        !self.is_alive()
    }

    pub fn is_dead_at(&self, now: f64) -> bool {
        !self.is_alive_at(now)
    }

    /// Number of interval samples currently in the window.
    pub fn sample_count(&self) -> usize {
        self.intervals.len()
    }
}

impl Default for PhiAccrualFailureDetector {
    fn default() -> Self {
        Self::new()
    }
}
