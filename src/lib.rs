//! Failure-detector-driven routing client for sproxyd object-storage
//! connectors.
//!
//! A [`SproxydClient`] spreads object operations round-robin across the
//! subset of configured connector endpoints currently believed alive. One
//! monitoring task per endpoint polls its `.conf` health check on a fixed
//! tick and feeds a phi accrual failure detector; edge-triggered up/down
//! events rebuild the shared alive set. [`ClientCollection`] layers
//! read-preferring/write-preferring fallback over several clients for
//! multi-ring deployments.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod health;

pub use client::collection::ClientCollection;
pub use client::writer::ObjectWriter;
pub use client::{Metadata, ObjectStream, SproxydClient};
pub use config::{load_config, SproxydConfig};
pub use endpoint::Endpoint;
pub use error::{SproxydError, SproxydResult};
pub use health::PhiAccrualFailureDetector;
