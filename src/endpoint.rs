//! Validated sproxyd endpoint value type.
//!
//! An endpoint is the unit of routing: one network location of a redundant
//! sproxyd connector. Equality and hashing are structural, so a set of
//! endpoints never contains duplicates of the same location.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::error::SproxydError;

/// Characters escaped in object names. Mirrors `urllib.quote`: slashes and
/// the unreserved marks pass through, everything else is percent-encoded.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// One sproxyd connector location: scheme, host, port and base path.
///
/// Query strings, fragments and path parameters are rejected at
/// construction; they have no meaning for a connector and silently
/// stripping them would hide configuration mistakes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
    base_path: String,
}

impl Endpoint {
    /// Parse and validate an endpoint URL such as
    /// `http://storage-1:81/proxy/chord`.
    pub fn parse(raw: &str) -> Result<Self, SproxydError> {
        let url = Url::parse(raw).map_err(|e| SproxydError::InvalidEndpoint {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(&url)
    }

    /// Validate an already-parsed URL.
    pub fn from_url(url: &Url) -> Result<Self, SproxydError> {
        let reject = |reason: &str| SproxydError::InvalidEndpoint {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        if url.query().is_some() {
            return Err(reject("endpoint with query not supported"));
        }
        if url.fragment().is_some() {
            return Err(reject("endpoint with fragment not supported"));
        }
        if url.path().contains(';') {
            return Err(reject("endpoint with params not supported"));
        }

        let host = url.host_str().ok_or_else(|| reject("endpoint has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| reject("endpoint has no port"))?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
            base_path: url.path().trim_matches('/').to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base path with leading and trailing slashes normalized away.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// URL of the connector configuration used for health checking.
    pub fn conf_url(&self) -> String {
        format!("{}/.conf", self)
    }

    /// URL for one object, with the name percent-escaped. Slashes in the
    /// name are preserved, matching how the connector namespaces objects.
    pub fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self, utf8_percent_encode(name, OBJECT_NAME))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}/{}",
            self.scheme, self.host, self.port, self.base_path
        )
    }
}
