//! Connector configuration probe.
//!
//! Health checking works by fetching the connector's active configuration
//! (`<endpoint>/.conf`) and verifying that query-by-path is enabled. A
//! connector that answers but has `by_path_enabled` off is just as
//! unusable as one that does not answer, but the two cases are logged
//! differently: the former is a remote configuration problem, the latter
//! an expected, recoverable network condition.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::endpoint::Endpoint;
use crate::error::SproxydError;

fn by_path_enabled_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Works for both JSON-formatted (Ring 5+) and INI-formatted
        // (Ring 4) connector configurations.
        Regex::new(r#"(?mi)^\s*"?by_path_enabled[":=]+\s*(1|true)[",]*\s*$"#)
            .unwrap_or_else(|e| panic!("by_path_enabled regex must compile: {e}"))
    })
}

/// Check that a connector configuration has query-by-path enabled.
pub fn check_conf(conf: &str) -> Result<(), SproxydError> {
    if by_path_enabled_re().is_match(conf) {
        Ok(())
    } else {
        Err(SproxydError::InvalidConf(
            "make sure by_path_enabled is set and check sproxyd logs".to_string(),
        ))
    }
}

/// Probe for one endpoint's `.conf`, with its own short-timeout client.
#[derive(Debug, Clone)]
pub struct ConfProbe {
    client: reqwest::Client,
    endpoint: Endpoint,
    url: String,
}

impl ConfProbe {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, SproxydError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SproxydError::Client)?;
        let url = endpoint.conf_url();
        Ok(Self {
            client,
            endpoint,
            url,
        })
    }

    /// Run one probe. Every failure mode reduces to `false` for the
    /// monitoring state machine; only the logging differs.
    pub async fn check(&self) -> bool {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "could not read sproxyd configuration due to a network error"
                );
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::info!(
                endpoint = %self.endpoint,
                status = %response.status(),
                "unexpected status fetching sproxyd configuration"
            );
            return false;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::info!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "could not read sproxyd configuration body"
                );
                return false;
            }
        };

        match check_conf(&body) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "sproxyd configuration is invalid"
                );
                false
            }
        }
    }
}
