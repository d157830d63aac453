//! Error types for the sproxyd client.

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Errors that can occur while talking to sproxyd connectors.
#[derive(Debug, Error)]
pub enum SproxydError {
    /// Endpoint URL violates the construction contract.
    #[error("invalid endpoint `{url}`: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// A reachable connector returned a `.conf` body that fails validation.
    #[error("invalid sproxyd configuration: {0}")]
    InvalidConf(String),

    /// `put_meta` was called without metadata.
    #[error("no usermd")]
    MissingMetadata,

    /// The connection to a connector could not be established in time.
    #[error("connect timeout contacting {endpoint}")]
    ConnectTimeout { endpoint: String },

    /// The connector accepted the connection but did not answer in time.
    #[error("request timeout waiting on {endpoint}")]
    RequestTimeout { endpoint: String },

    /// Transport-level failure other than a timeout (refused, reset, DNS).
    #[error("network error contacting {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The connector answered with a status the operation does not handle.
    #[error("{op}: {endpoint} responded {status} {reason}: {body}")]
    Http {
        op: &'static str,
        endpoint: String,
        status: u16,
        reason: String,
        body: String,
    },

    /// The metadata envelope could not be encoded or decoded.
    #[error("metadata codec error: {0}")]
    Meta(String),

    /// Building the underlying HTTP client failed.
    #[error("http client construction failed: {0}")]
    Client(#[source] reqwest::Error),

    /// Every configured endpoint is currently suspected dead.
    #[error("no sproxyd endpoint available")]
    NoEndpointAvailable,

    /// No client in the collection has an alive endpoint.
    #[error("no sproxyd client available")]
    NoClientAvailable,
}

impl SproxydError {
    /// Classify a transport error from `reqwest`, keeping connect timeouts,
    /// request timeouts and other network failures distinct.
    pub(crate) fn from_transport(endpoint: &Endpoint, source: reqwest::Error) -> Self {
        let endpoint = endpoint.to_string();
        if source.is_timeout() {
            if source.is_connect() {
                SproxydError::ConnectTimeout { endpoint }
            } else {
                SproxydError::RequestTimeout { endpoint }
            }
        } else {
            SproxydError::Network { endpoint, source }
        }
    }

    /// HTTP status carried by this error, if it is an HTTP-status error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            SproxydError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for sproxyd operations.
pub type SproxydResult<T> = Result<T, SproxydError>;
