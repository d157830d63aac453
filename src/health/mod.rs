//! Endpoint health: accrual failure detection, the per-endpoint
//! monitoring loop, and the `.conf` probe that feeds it.
//!
//! # Data Flow
//! ```text
//! monitoring_loop (monitor.rs), one task per endpoint:
//!     Fixed tick
//!     → ConfProbe (probe.rs) fetches <endpoint>/.conf
//!     → success heartbeats the PhiAccrualFailureDetector (detector.rs)
//!     → edge-triggered on_up / on_down mutate the router's alive set
//! ```

pub mod detector;
pub mod monitor;
pub mod probe;

pub use detector::PhiAccrualFailureDetector;
pub use monitor::monitoring_loop;
pub use probe::{check_conf, ConfProbe};
