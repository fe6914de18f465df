//! Gateway transports.
//!
//! A transport knows how to reach the gateway and open a session; a session
//! knows how to list the tools behind it. Both are traits so the acquirer
//! can be exercised without a network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use foreman_config::{AuthMode, GatewayConfig};
use foreman_core::error::GatewayError;
use foreman_core::tool::Tool;
use foreman_security::{Credentials, SigV4Signer};

use crate::session::McpSession;

/// Default bound for the handshake and for each gateway request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An open gateway session.
#[async_trait]
pub trait GatewaySession: Send + Sync {
    /// Every tool the gateway exposes, in gateway order.
    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>, GatewayError>;
}

/// A way of reaching the gateway.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<Arc<dyn GatewaySession>, GatewayError>;
}

/// Unauthenticated streamable HTTP.
#[derive(Debug, Clone)]
pub struct PlainTransport {
    endpoint: String,
    timeout: Duration,
}

impl PlainTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GatewayTransport for PlainTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self) -> Result<Arc<dyn GatewaySession>, GatewayError> {
        let session = McpSession::connect(&self.endpoint, None, self.timeout).await?;
        Ok(Arc::new(session))
    }
}

/// Streamable HTTP with every request SigV4-signed.
///
/// Credentials are read from the environment at connect time unless set
/// explicitly.
#[derive(Debug, Clone)]
pub struct SigV4Transport {
    endpoint: String,
    region: String,
    service: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl SigV4Transport {
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            service: service.into(),
            credentials: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn signer(&self) -> Result<SigV4Signer, GatewayError> {
        let credentials = match &self.credentials {
            Some(credentials) => credentials.clone(),
            None => Credentials::from_env().map_err(|e| GatewayError::Signing(e.to_string()))?,
        };
        Ok(SigV4Signer::new(&self.region, &self.service, credentials))
    }
}

#[async_trait]
impl GatewayTransport for SigV4Transport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self) -> Result<Arc<dyn GatewaySession>, GatewayError> {
        let signer = self.signer()?;
        let session = McpSession::connect(&self.endpoint, Some(signer), self.timeout).await?;
        Ok(Arc::new(session))
    }
}

/// Build the transport selected by configuration, or `None` when no
/// gateway address is set.
pub fn transport_from_config(config: &GatewayConfig) -> Option<Arc<dyn GatewayTransport>> {
    if !config.is_configured() {
        return None;
    }
    let endpoint = config.url.trim().to_string();
    let transport: Arc<dyn GatewayTransport> = match config.auth_mode {
        AuthMode::Iam => Arc::new(SigV4Transport::new(
            endpoint,
            &config.region,
            &config.service,
        )),
        AuthMode::None => Arc::new(PlainTransport::new(endpoint)),
    };
    Some(transport)
}
