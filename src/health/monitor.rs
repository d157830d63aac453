//! Endpoint monitoring loop.
//!
//! One loop runs per monitored endpoint. Each tick it calls the probe,
//! feeds the private failure detector, and fires the edge-triggered
//! `on_up` / `on_down` callbacks on state changes only. The loop never
//! returns normally; it runs until the owning task is aborted.

use std::future::Future;
use std::time::Duration;

use crate::health::detector::PhiAccrualFailureDetector;

/// Tri-state operational flag. `Unknown` forces a callback on the first
/// determination in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operational {
    Unknown,
    Up,
    Down,
}

/// Drive a probe forever, invoking `on_up` / `on_down` on state changes.
///
/// A successful probe heartbeats the detector and suppresses `on_down`
/// even when phi still says dead: with too little history the detector is
/// conservative, and a down event for an endpoint that just answered would
/// be spurious.
pub async fn monitoring_loop<P, Fut, U, D>(
    mut probe: P,
    mut on_up: U,
    mut on_down: D,
    interval: Duration,
) where
    P: FnMut() -> Fut,
    Fut: Future<Output = bool>,
    U: FnMut(),
    D: FnMut(),
{
    let mut afd = PhiAccrualFailureDetector::new();
    let mut state = Operational::Unknown;
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        if probe().await {
            afd.heartbeat();
        } else if afd.is_dead() && state != Operational::Down {
            on_down();
            state = Operational::Down;
        }

        if afd.is_alive() && state != Operational::Up {
            on_up();
            state = Operational::Up;
        }
    }
}
