//! Routing client for a set of redundant sproxyd connectors.
//!
//! The client owns the configured endpoint set, a dynamically maintained
//! alive subset fed by one monitoring loop per endpoint, and a pooled HTTP
//! client. Object operations draw the next alive endpoint round-robin,
//! perform a single HTTP exchange, and propagate typed failures without
//! retrying; retry policy belongs to the caller.

use std::collections::HashSet;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::config::SproxydConfig;
use crate::endpoint::Endpoint;
use crate::error::{SproxydError, SproxydResult};
use crate::health::{monitoring_loop, ConfProbe};

pub mod collection;
pub mod writer;

/// Response header carrying the base64-encoded metadata envelope.
pub const USERMD_HEADER: &str = "x-scal-usermd";

/// Request header signaling a metadata-update command.
pub const CMD_HEADER: &str = "x-scal-cmd";

const CMD_UPDATE_USERMD: &str = "update-usermd";

/// Opaque object metadata carried through the usermd envelope.
pub type Metadata = serde_json::Value;

/// Immutable snapshot of the endpoints currently believed reachable,
/// paired with its round-robin cursor. Membership changes invalidate the
/// cursor position, so the pair is always rebuilt and published together.
#[derive(Debug)]
struct AliveSet {
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
}

impl AliveSet {
    fn new(endpoints: Vec<Endpoint>) -> Self {
        // A fresh cursor starts from an arbitrary point in the new set.
        let seed = if endpoints.is_empty() {
            0
        } else {
            fastrand::usize(..endpoints.len())
        };
        Self {
            endpoints,
            cursor: AtomicUsize::new(seed),
        }
    }

    fn next(&self) -> Option<Endpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        Some(self.endpoints[index].clone())
    }

    fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

struct Inner {
    endpoints: Vec<Endpoint>,
    http: reqwest::Client,
    /// Canonical alive membership; the lock also serializes rebuilds so a
    /// snapshot is never published over a concurrently mutated set.
    members: Mutex<HashSet<Endpoint>>,
    alive: ArcSwap<AliveSet>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn insert_alive(&self, endpoint: &Endpoint) {
        let mut members = self.members.lock().expect("alive-set lock poisoned");
        members.insert(endpoint.clone());
        self.publish(&members);
    }

    fn remove_alive(&self, endpoint: &Endpoint) {
        let mut members = self.members.lock().expect("alive-set lock poisoned");
        members.remove(endpoint);
        self.publish(&members);
    }

    fn publish(&self, members: &HashSet<Endpoint>) {
        let mut endpoints: Vec<Endpoint> = members.iter().cloned().collect();
        endpoints.sort();
        tracing::debug!(alive = endpoints.len(), "alive set updated");
        self.alive.store(Arc::new(AliveSet::new(endpoints)));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let monitors = match self.monitors.get_mut() {
            Ok(monitors) => monitors,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handle in monitors.drain(..) {
            handle.abort();
        }
        tracing::debug!("health monitors stopped");
    }
}

/// Client routing object operations across alive sproxyd connectors.
///
/// Cheaply cloneable; all clones share the alive set, the monitoring
/// tasks, and the connection pool. Monitoring tasks are aborted when the
/// last clone is dropped. Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct SproxydClient {
    inner: Arc<Inner>,
}

impl SproxydClient {
    /// Build a client from configuration, validating every endpoint URL
    /// and spawning one monitoring loop per endpoint.
    pub fn new(config: &SproxydConfig) -> SproxydResult<Self> {
        let mut seen = HashSet::new();
        let mut endpoints = Vec::new();
        for raw in &config.endpoints {
            let endpoint = Endpoint::parse(raw)?;
            if seen.insert(endpoint.clone()) {
                endpoints.push(endpoint);
            }
        }
        Self::with_endpoints(endpoints, config)
    }

    /// Build a client over already-validated endpoints.
    pub fn with_endpoints(
        endpoints: Vec<Endpoint>,
        config: &SproxydConfig,
    ) -> SproxydResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.conn_timeout())
            .read_timeout(config.proxy_timeout())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(SproxydError::Client)?;

        let inner = Arc::new(Inner {
            endpoints: endpoints.clone(),
            http,
            members: Mutex::new(endpoints.iter().cloned().collect()),
            alive: ArcSwap::from_pointee(AliveSet::new(endpoints.clone())),
            monitors: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let probe = ConfProbe::new(endpoint.clone(), config.ping_timeout())?;

            // Callbacks hold a weak reference: monitors must never keep
            // the client alive past its last user handle.
            let up_inner: Weak<Inner> = Arc::downgrade(&inner);
            let up_endpoint = endpoint.clone();
            let on_up = move || {
                if let Some(inner) = up_inner.upgrade() {
                    tracing::info!(endpoint = %up_endpoint, "sproxyd connector is up");
                    inner.insert_alive(&up_endpoint);
                }
            };

            let down_inner: Weak<Inner> = Arc::downgrade(&inner);
            let down_endpoint = endpoint.clone();
            let on_down = move || {
                if let Some(inner) = down_inner.upgrade() {
                    tracing::warn!(
                        endpoint = %down_endpoint,
                        "sproxyd connector is down or misconfigured"
                    );
                    inner.remove_alive(&down_endpoint);
                }
            };

            handles.push(tokio::spawn(monitoring_loop(
                move || {
                    let probe = probe.clone();
                    async move { probe.check().await }
                },
                on_up,
                on_down,
                config.ping_interval(),
            )));
        }
        *inner.monitors.lock().expect("monitor lock poisoned") = handles;

        Ok(Self { inner })
    }

    /// The full configured endpoint set.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.inner.endpoints
    }

    /// Snapshot of the endpoints currently believed reachable.
    pub fn alive_endpoints(&self) -> Vec<Endpoint> {
        self.inner.alive.load().endpoints.clone()
    }

    /// Whether any endpoint is currently believed reachable.
    pub fn has_alive_endpoints(&self) -> bool {
        !self.inner.alive.load().is_empty()
    }

    /// Draw the next endpoint from the round-robin cursor, failing fast
    /// when every endpoint is suspected dead.
    pub fn get_next_endpoint(&self) -> SproxydResult<Endpoint> {
        self.inner
            .alive
            .load()
            .next()
            .ok_or(SproxydError::NoEndpointAvailable)
    }

    /// Fetch object metadata. `None` means the object does not exist.
    pub async fn get_meta(&self, name: &str) -> SproxydResult<Option<Metadata>> {
        let endpoint = self.get_next_endpoint()?;
        let url = endpoint.object_url(name);
        tracing::debug!(url = %url, "get_meta");

        let response = self
            .inner
            .http
            .head(&url)
            .send()
            .await
            .map_err(|e| SproxydError::from_transport(&endpoint, e))?;

        match response.status().as_u16() {
            200 => {
                let header = response.headers().get(USERMD_HEADER).cloned();
                drain_connection(response, &endpoint).await;
                let header = header.ok_or_else(|| {
                    SproxydError::Meta(format!("missing {USERMD_HEADER} header"))
                })?;
                Ok(Some(decode_usermd(header.as_bytes())?))
            }
            404 => {
                drain_connection(response, &endpoint).await;
                Ok(None)
            }
            _ => Err(unexpected_http_status("get_meta", &endpoint, response).await),
        }
    }

    /// Store object metadata. Null metadata is a usage error, rejected
    /// before any network call.
    pub async fn put_meta(&self, name: &str, metadata: &Metadata) -> SproxydResult<()> {
        if metadata.is_null() {
            return Err(SproxydError::MissingMetadata);
        }
        let encoded = encode_usermd(metadata)?;

        let endpoint = self.get_next_endpoint()?;
        let url = endpoint.object_url(name);
        tracing::debug!(url = %url, "put_meta");

        let response = self
            .inner
            .http
            .put(&url)
            .header(CMD_HEADER, CMD_UPDATE_USERMD)
            .header(USERMD_HEADER, encoded)
            .send()
            .await
            .map_err(|e| SproxydError::from_transport(&endpoint, e))?;

        match response.status().as_u16() {
            200 => {
                drain_connection(response, &endpoint).await;
                tracing::debug!(name = %name, "metadata stored");
                Ok(())
            }
            _ => Err(unexpected_http_status("put_meta", &endpoint, response).await),
        }
    }

    /// Delete an object. 404 is success: the object is gone either way.
    pub async fn del_object(&self, name: &str) -> SproxydResult<()> {
        let endpoint = self.get_next_endpoint()?;
        let url = endpoint.object_url(name);
        tracing::debug!(url = %url, "del_object");

        let response = self
            .inner
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| SproxydError::from_transport(&endpoint, e))?;

        match response.status().as_u16() {
            200 | 404 => {
                drain_connection(response, &endpoint).await;
                Ok(())
            }
            _ => Err(unexpected_http_status("del_object", &endpoint, response).await),
        }
    }

    /// Read object content as a lazy, single-pass chunk stream. The
    /// optional `range` is an inclusive byte range sent as a `Range`
    /// header; a 206 response is as good as a 200.
    pub async fn get_object(
        &self,
        name: &str,
        range: Option<(u64, u64)>,
    ) -> SproxydResult<ObjectStream> {
        let endpoint = self.get_next_endpoint()?;
        let url = endpoint.object_url(name);
        tracing::debug!(url = %url, range = ?range, "get_object");

        let mut request = self.inner.http.get(&url);
        if let Some((start, end)) = range {
            request = request.header(reqwest::header::RANGE, format!("bytes={start}-{end}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SproxydError::from_transport(&endpoint, e))?;

        match response.status().as_u16() {
            200 | 206 => Ok(ObjectStream::new(endpoint, response)),
            _ => Err(unexpected_http_status("get_object", &endpoint, response).await),
        }
    }
}

impl fmt::Debug for SproxydClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SproxydClient")
            .field("endpoints", &self.inner.endpoints)
            .field("alive", &self.inner.alive.load().endpoints)
            .finish()
    }
}

/// Lazy, forward-only stream of object content chunks.
///
/// Chunks arrive as read off the socket, typically up to 64 KiB each. The
/// underlying connection is returned to the pool when the stream is
/// exhausted or dropped.
pub struct ObjectStream {
    endpoint: Endpoint,
    chunks: BoxStream<'static, Result<Bytes, reqwest::Error>>,
}

impl ObjectStream {
    fn new(endpoint: Endpoint, response: reqwest::Response) -> Self {
        Self {
            endpoint,
            chunks: response.bytes_stream().boxed(),
        }
    }

    /// Endpoint serving this read, for diagnostics.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Stream for ObjectStream {
    type Item = SproxydResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.chunks.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                Poll::Ready(Some(Err(SproxydError::from_transport(&this.endpoint, e))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Read out the remaining body so the underlying socket can go back to
/// the pool clean. A cleanup failure is logged, never raised: it must not
/// mask the operation's own result.
async fn drain_connection(response: reqwest::Response, endpoint: &Endpoint) {
    if let Err(e) = response.bytes().await {
        tracing::error!(
            endpoint = %endpoint,
            error = %e,
            "unexpected error while releasing an HTTP connection"
        );
    }
}

/// Turn an unhandled response into a typed HTTP error, draining the body
/// into the error message on the way out.
async fn unexpected_http_status(
    op: &'static str,
    endpoint: &Endpoint,
    response: reqwest::Response,
) -> SproxydError {
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or_default().to_string();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(
                endpoint = %endpoint,
                error = %e,
                "failed to drain body of unexpected response"
            );
            String::new()
        }
    };
    SproxydError::Http {
        op,
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        reason,
        body,
    }
}

fn encode_usermd(metadata: &Metadata) -> SproxydResult<String> {
    let raw = serde_json::to_vec(metadata).map_err(|e| SproxydError::Meta(e.to_string()))?;
    Ok(BASE64.encode(raw))
}

fn decode_usermd(header: &[u8]) -> SproxydResult<Metadata> {
    let raw = BASE64
        .decode(header)
        .map_err(|e| SproxydError::Meta(format!("bad base64 envelope: {e}")))?;
    serde_json::from_slice(&raw).map_err(|e| SproxydError::Meta(format!("bad payload: {e}")))
}
