//! An initialized MCP session and the tools it exposes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use foreman_core::error::{GatewayError, ToolError};
use foreman_core::tool::{Tool, ToolResult};
use foreman_security::SigV4Signer;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    PaginatedRequestParam, ProtocolVersion, RawContent,
};
use rmcp::service::RunningService;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::{ClientHandler, RoleClient};
use serde_json::Value;
use tracing::{debug, info};

use crate::http::GatewayHttpClient;
use crate::transport::GatewaySession;

/// Upper bound on `tools/list` pages followed for one listing.
const MAX_LIST_PAGES: usize = 64;

#[derive(Clone)]
struct ForemanClientHandler {
    info: ClientInfo,
}

impl ClientHandler for ForemanClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        protocol_version: ProtocolVersion::LATEST,
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "foreman".to_string(),
            title: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            icons: None,
            website_url: None,
        },
    }
}

/// A handshaken streamable-HTTP MCP session.
///
/// Cheap to clone; every clone shares the same underlying connection, which
/// is released once the last clone (including those held by [`RemoteTool`]s)
/// is dropped.
#[derive(Clone)]
pub struct McpSession {
    endpoint: String,
    service: Arc<RunningService<RoleClient, ForemanClientHandler>>,
    timeout: Duration,
}

impl McpSession {
    /// Run the `initialize` handshake against `endpoint`.
    pub async fn connect(
        endpoint: &str,
        signer: Option<SigV4Signer>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let transport = StreamableHttpClientTransport::with_client(
            GatewayHttpClient::new(signer),
            StreamableHttpClientTransportConfig::with_uri(endpoint.to_string()),
        );
        let handler = ForemanClientHandler {
            info: client_info(),
        };

        let service = tokio::time::timeout(timeout, rmcp::serve_client(handler, transport))
            .await
            .map_err(|_| GatewayError::Timeout {
                operation: "initialize".into(),
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|e| GatewayError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(info) = service.peer().peer_info() {
            info!(
                endpoint = %endpoint,
                server = %info.server_info.name,
                version = %info.server_info.version,
                "Gateway session initialized"
            );
        }

        Ok(Self {
            endpoint: endpoint.to_string(),
            service: Arc::new(service),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// List every tool the gateway exposes, following `nextCursor`.
    pub async fn list_remote_tools(&self) -> Result<Vec<RemoteTool>, GatewayError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..MAX_LIST_PAGES {
            let fut = self
                .service
                .peer()
                .list_tools(Some(PaginatedRequestParam { cursor }));
            let result = tokio::time::timeout(self.timeout, fut)
                .await
                .map_err(|_| GatewayError::Timeout {
                    operation: "tools/list".into(),
                    timeout_secs: self.timeout.as_secs(),
                })?
                .map_err(|e| GatewayError::Protocol(format!("tools/list failed: {e}")))?;

            debug!(page, count = result.tools.len(), "Listed gateway tools page");

            tools.extend(result.tools.into_iter().map(|tool| RemoteTool {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
                schema: Value::Object((*tool.input_schema).clone()),
                session: self.clone(),
            }));

            match result.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(GatewayError::Protocol(format!(
            "tools/list did not finish after {MAX_LIST_PAGES} pages"
        )))
    }

    /// Invoke a tool by name through `tools/call`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, ToolError> {
        let arguments = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "gateway tool arguments must be an object, got: {other}"
                )));
            }
        };

        let fut = self.service.peer().call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments,
        });
        let result = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: name.to_string(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(to_tool_result(result))
    }
}

#[async_trait]
impl GatewaySession for McpSession {
    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>, GatewayError> {
        Ok(self
            .list_remote_tools()
            .await?
            .into_iter()
            .map(|tool| Arc::new(tool) as Arc<dyn Tool>)
            .collect())
    }
}

/// Text contents joined by newlines; structured content when there is no text.
fn to_tool_result(result: CallToolResult) -> ToolResult {
    let texts: Vec<String> = result
        .content
        .into_iter()
        .filter_map(|content| match content.raw {
            RawContent::Text(text) => Some(text.text),
            _ => None,
        })
        .collect();

    let output = if texts.is_empty() {
        result
            .structured_content
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default()
    } else {
        texts.join("\n")
    };

    ToolResult {
        call_id: String::new(),
        success: !result.is_error.unwrap_or(false),
        output,
        data: result.structured_content,
    }
}

/// A tool exposed by the gateway.
pub struct RemoteTool {
    name: String,
    description: String,
    schema: Value,
    session: McpSession,
}

impl std::fmt::Debug for RemoteTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTool")
            .field("name", &self.name)
            .field("endpoint", &self.session.endpoint)
            .finish()
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        self.session.call_tool(&self.name, arguments).await
    }
}
