//! Fallback context: a JSON snapshot of plant data served by the backend.
//!
//! Only consulted when the gateway is not usable. One attempt per
//! invocation, time-bounded, never retried or cached.

use std::time::Duration;

use async_trait::async_trait;
use foreman_config::ContextConfig;
use foreman_core::error::ContextError;
use serde_json::Value;
use tracing::{debug, warn};

/// Path of the snapshot endpoint, relative to the service base URL.
pub const CONTEXT_PATH: &str = "/api/agent/context";

/// Bound on the single snapshot request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// What the fallback step produced for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextOutcome {
    /// The gateway was connected; no fallback was attempted
    NotNeeded,
    /// The snapshot was fetched
    Snapshot(Value),
    /// The fetch failed
    Unavailable,
}

/// A source of fallback snapshots.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, ContextError>;
}

/// HTTP client for the backend's context endpoint.
pub struct ContextClient {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl ContextClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}{CONTEXT_PATH}", base_url.trim_end_matches('/')),
            timeout: FETCH_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(&config.base_url)
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ContextSource for ContextClient {
    async fn fetch(&self) -> Result<Value, ContextError> {
        let timeout_secs = self.timeout.as_secs();
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                ContextError::Timeout { timeout_secs }
            } else {
                ContextError::Network(e.to_string())
            }
        };

        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContextError::Status {
                status_code: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&body).map_err(|e| ContextError::Body(e.to_string()))
    }
}

/// Run the fallback step.
///
/// `needed` is false when the gateway connected, in which case nothing is
/// fetched.
pub async fn resolve_context(source: &dyn ContextSource, needed: bool) -> ContextOutcome {
    if !needed {
        return ContextOutcome::NotNeeded;
    }
    match source.fetch().await {
        Ok(snapshot) => {
            debug!("Fallback context snapshot fetched");
            ContextOutcome::Snapshot(snapshot)
        }
        Err(e) => {
            warn!(error = %e, "Fallback context unavailable");
            ContextOutcome::Unavailable
        }
    }
}
