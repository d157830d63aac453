//! Read/write fallback across multiple client rings.
//!
//! Multi-ring deployments route reads to rings optimized for locality or
//! performance, while one write ring remains the durability source of
//! truth. A read that misses (404) on the read ring therefore falls back
//! to the write ring exactly once; every other failure propagates as-is.

use std::future::Future;

use crate::client::SproxydClient;
use crate::error::{SproxydError, SproxydResult};

/// Ordered read-capable and write-capable clients. One client may appear
/// in both lists.
#[derive(Debug, Clone)]
pub struct ClientCollection {
    read_clients: Vec<SproxydClient>,
    write_clients: Vec<SproxydClient>,
}

impl ClientCollection {
    pub fn new(read_clients: Vec<SproxydClient>, write_clients: Vec<SproxydClient>) -> Self {
        Self {
            read_clients,
            write_clients,
        }
    }

    /// First read client with an alive endpoint, in list order.
    pub fn get_read_client(&self) -> SproxydResult<&SproxydClient> {
        first_available(&self.read_clients)
    }

    /// First write client with an alive endpoint, in list order.
    pub fn get_write_client(&self) -> SproxydResult<&SproxydClient> {
        first_available(&self.write_clients)
    }

    /// Run `op` against the first available read client. On an HTTP 404
    /// the operation is retried once against the first available write
    /// client; any other error propagates immediately without fallback.
    pub async fn try_read<T, F, Fut>(&self, op: F) -> SproxydResult<T>
    where
        F: Fn(SproxydClient) -> Fut,
        Fut: Future<Output = SproxydResult<T>>,
    {
        let read_client = self.get_read_client()?.clone();
        match op(read_client).await {
            Err(SproxydError::Http { status: 404, .. }) => {
                tracing::debug!("read ring missed, falling back to write ring");
                let write_client = self.get_write_client()?.clone();
                op(write_client).await
            }
            other => other,
        }
    }
}

fn first_available(clients: &[SproxydClient]) -> SproxydResult<&SproxydClient> {
    clients
        .iter()
        .find(|client| client.has_alive_endpoints())
        .ok_or(SproxydError::NoClientAvailable)
}
