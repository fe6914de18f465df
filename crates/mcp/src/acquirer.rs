//! Tool acquisition with graceful degradation.
//!
//! The acquirer never fails: a missing or broken gateway leaves the caller
//! with the local tools and a status saying why.

use std::sync::Arc;

use foreman_config::GatewayConfig;
use foreman_core::error::GatewayError;
use foreman_core::tool::ToolSet;
use tracing::{debug, info, warn};

use crate::transport::{GatewaySession, GatewayTransport, transport_from_config};

/// How the gateway fared for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    /// Tools were listed successfully
    Connected,
    /// No gateway address is configured; nothing was attempted
    NotConfigured,
    /// Connecting or listing failed
    Unavailable { reason: String },
}

impl GatewayStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, GatewayStatus::Connected)
    }
}

/// Outcome of one acquisition.
pub struct Acquisition {
    /// Gateway tools (if any) followed by the local tools
    pub tools: ToolSet,
    pub status: GatewayStatus,
    /// The open gateway session, held for the invocation's lifetime even
    /// when it exposed no tools
    pub session: Option<Arc<dyn GatewaySession>>,
}

impl Acquisition {
    /// Whether the fallback context should be consulted.
    pub fn needs_fallback(&self) -> bool {
        !self.status.is_connected()
    }
}

/// Obtains the tool set for an invocation.
#[derive(Clone)]
pub struct ToolAcquirer {
    transport: Option<Arc<dyn GatewayTransport>>,
}

impl ToolAcquirer {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            transport: transport_from_config(config),
        }
    }

    pub fn with_transport(transport: Arc<dyn GatewayTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// An acquirer with no gateway configured.
    pub fn disabled() -> Self {
        Self { transport: None }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    /// Connect, list, and merge with `local`.
    ///
    /// Errors are absorbed into [`GatewayStatus::Unavailable`]; the local
    /// tools are always present, after any gateway tools.
    pub async fn acquire(&self, local: &ToolSet) -> Acquisition {
        let Some(transport) = &self.transport else {
            debug!("No gateway configured, using local tools only");
            return Acquisition {
                tools: local.clone(),
                status: GatewayStatus::NotConfigured,
                session: None,
            };
        };

        match Self::list(transport.as_ref()).await {
            Ok((session, remote)) => {
                info!(
                    endpoint = %transport.endpoint(),
                    gateway_tools = remote.len(),
                    local_tools = local.len(),
                    "Gateway tools acquired"
                );
                let mut tools = remote;
                tools.extend(local);
                Acquisition {
                    tools,
                    status: GatewayStatus::Connected,
                    session: Some(session),
                }
            }
            Err(e) => {
                warn!(endpoint = %transport.endpoint(), error = %e, "Gateway unavailable, using local tools only");
                Acquisition {
                    tools: local.clone(),
                    status: GatewayStatus::Unavailable {
                        reason: e.to_string(),
                    },
                    session: None,
                }
            }
        }
    }

    async fn list(
        transport: &dyn GatewayTransport,
    ) -> Result<(Arc<dyn GatewaySession>, ToolSet), GatewayError> {
        let session = transport.connect().await?;
        let tools = session.list_tools().await?;
        Ok((session, tools.into_iter().collect()))
    }
}
