//! The invocation pipeline.
//!
//! acquire tools → (fallback context) → compose instruction →
//! assemble history → model session → relay.

use std::sync::Arc;

use foreman_config::AppConfig;
use foreman_core::message::{InvocationRequest, Message};
use foreman_core::tool::ToolSet;
use foreman_mcp::{GatewaySession, GatewayStatus, ToolAcquirer};
use foreman_providers::{ModelHandle, load_model};
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, info};

use crate::context::{ContextClient, ContextOutcome, ContextSource, resolve_context};
use crate::conversation::assemble;
use crate::prompt::{base_instruction, compose};
use crate::relay::relay;
use crate::session::{AgentSession, DEFAULT_MAX_ITERATIONS};
use crate::stream_event::RelayEvent;

/// Host-supplied metadata for one invocation.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Runtime session id, when the host provides one
    pub session_id: Option<String>,
    /// Unique id for log correlation
    pub request_id: String,
}

impl InvocationContext {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Everything decided before the model runs.
pub struct PreparedInvocation {
    pub tools: ToolSet,
    pub status: GatewayStatus,
    pub context: ContextOutcome,
    pub instruction: String,
    pub messages: Vec<Message>,
    /// Open gateway session, released when the invocation ends
    pub gateway: Option<Arc<dyn GatewaySession>>,
}

impl std::fmt::Debug for PreparedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedInvocation")
            .field("tools", &self.tools)
            .field("status", &self.status)
            .field("context", &self.context)
            .field("instruction", &self.instruction)
            .field("messages", &self.messages)
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}

/// Runs invocations. Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct Invoker {
    acquirer: ToolAcquirer,
    local_tools: ToolSet,
    context: Arc<dyn ContextSource>,
    model: ModelHandle,
    base: &'static str,
    max_iterations: u32,
}

impl Invoker {
    pub fn new(
        acquirer: ToolAcquirer,
        local_tools: ToolSet,
        context: Arc<dyn ContextSource>,
        model: ModelHandle,
    ) -> Self {
        Self {
            acquirer,
            local_tools,
            context,
            model,
            base: base_instruction(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Wire every collaborator from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ToolAcquirer::from_config(&config.gateway),
            foreman_tools::local_tools(&config.knowledge_base),
            Arc::new(ContextClient::from_config(&config.context)),
            load_model(&config.model),
        )
        .with_max_iterations(config.agent.max_iterations)
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn local_tools(&self) -> &ToolSet {
        &self.local_tools
    }

    /// Acquire tools, consult the fallback if needed, and build the
    /// instruction and message list.
    pub async fn prepare(&self, request: &InvocationRequest) -> PreparedInvocation {
        let acquisition = self.acquirer.acquire(&self.local_tools).await;
        let context = resolve_context(self.context.as_ref(), acquisition.needs_fallback()).await;
        let instruction = compose(self.base, &context);
        let messages = assemble(&request.messages);

        debug!(
            tools = ?acquisition.tools.names(),
            status = ?acquisition.status,
            instruction_len = instruction.len(),
            "Invocation prepared"
        );

        PreparedInvocation {
            tools: acquisition.tools,
            status: acquisition.status,
            context,
            instruction,
            messages,
            gateway: acquisition.session,
        }
    }

    /// Run one invocation, yielding caller-facing events.
    ///
    /// Acquisition and fallback problems are absorbed before the stream
    /// starts; only a generation failure shows up, as the final
    /// [`RelayEvent::Error`].
    pub async fn invoke(
        &self,
        request: InvocationRequest,
        context: InvocationContext,
    ) -> BoxStream<'static, RelayEvent> {
        info!(
            request_id = %context.request_id,
            session_id = context.session_id.as_deref().unwrap_or("-"),
            history = request.messages.len(),
            "Invocation started"
        );

        let prepared = self.prepare(&request).await;
        let session = AgentSession::new(
            self.model.clone(),
            prepared.tools,
            prepared.instruction,
            prepared.messages,
        )
        .with_max_iterations(self.max_iterations);

        // The gateway session stays open until the caller drops the stream.
        let gateway = prepared.gateway;
        relay(session.stream(request.prompt))
            .inspect(move |_| {
                let _ = &gateway;
            })
            .boxed()
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("gateway", &self.acquirer.is_configured())
            .field("local_tools", &self.local_tools)
            .field("model", &self.model)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}
