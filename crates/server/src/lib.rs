//! HTTP invocation endpoint for Foreman.
//!
//! Speaks the agent runtime contract:
//! - `POST /invocations` takes `{"prompt", "messages"}` and answers with an
//!   SSE stream, one `data:` line per relay event
//! - `GET /ping` reports liveness to the runtime
//! - `GET /health` is a richer status document for operators
//!
//! Built on Axum.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::response::Json;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Router;
use foreman_agent::{InvocationContext, Invoker};
use foreman_config::AppConfig;
use foreman_core::message::InvocationRequest;
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tracing::info;

/// Header carrying the runtime session id.
pub const SESSION_HEADER: &str = "x-amzn-bedrock-agentcore-runtime-session-id";

/// Shared state for request handlers.
pub struct ServerState {
    pub invoker: Invoker,
    pub gateway_configured: bool,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(invoker: Invoker, gateway_configured: bool) -> Self {
        Self {
            invoker,
            gateway_configured,
            start_time: Instant::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Build the router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/invocations", post(invocations_handler))
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let invoker = Invoker::from_config(&config);
    let state = Arc::new(ServerState::new(invoker, config.gateway.is_configured()));
    let app = build_router(state);

    info!(
        addr = %addr,
        model = %config.model.model_id,
        gateway = %config.gateway.url,
        "Server starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Session id from the runtime header, if present and non-empty.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

async fn invocations_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<InvocationRequest>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let context = InvocationContext::new(session_id(&headers));
    let events = state.invoker.invoke(request, context).await;

    let stream = events.map(|event| Ok(SseEvent::default().data(event.to_sse_data())));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn ping_handler() -> Json<Value> {
    Json(json!({
        "status": "Healthy",
        "time_of_last_update": chrono::Utc::now().timestamp(),
    }))
}

async fn health_handler(State(state): State<SharedState>) -> Json<Value> {
    let model = state.invoker.model();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": model.provider.name(),
        "model": model.model_id,
        "gateway_configured": state.gateway_configured,
        "local_tools": state.invoker.local_tools().names(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use foreman_agent::ContextSource;
    use foreman_core::error::{ContextError, ProviderError};
    use foreman_core::message::{ContentBlock, Message, Role, ToolUseBlock};
    use foreman_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use foreman_core::tool::ToolSet;
    use foreman_mcp::ToolAcquirer;
    use foreman_providers::ModelHandle;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Returns scripted responses in order, then fails.
    struct ScriptedProvider {
        responses: Mutex<Vec<ProviderResponse>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ProviderResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 503,
                    message: format!("no response scripted for {}", request.model),
                })
        }
    }

    struct NoContext;

    #[async_trait::async_trait]
    impl ContextSource for NoContext {
        async fn fetch(&self) -> Result<Value, ContextError> {
            Err(ContextError::Network("connection refused".into()))
        }
    }

    fn response(message: Message) -> ProviderResponse {
        ProviderResponse {
            message,
            usage: None,
            model: "test-model".into(),
        }
    }

    fn app(responses: Vec<ProviderResponse>) -> Router {
        let model = ModelHandle::new(Arc::new(ScriptedProvider::new(responses)), "test-model");
        let invoker = Invoker::new(
            ToolAcquirer::disabled(),
            ToolSet::new(),
            Arc::new(NoContext),
            model,
        );
        build_router(Arc::new(ServerState::new(invoker, false)))
    }

    fn invocation(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/invocations")
            .header("content-type", "application/json")
            .header(SESSION_HEADER, "session-123")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn data_lines(body: &str) -> Vec<Value> {
        body.lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .map(|d| serde_json::from_str(d).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn ping_reports_healthy() {
        let response = app(vec![])
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "Healthy");
        assert!(body["time_of_last_update"].is_i64());
    }

    #[tokio::test]
    async fn health_describes_the_service() {
        let response = app(vec![])
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["provider"], "scripted");
        assert_eq!(body["gateway_configured"], false);
    }

    #[tokio::test]
    async fn invocation_streams_text() {
        let app = app(vec![response(Message::assistant("Line 3 is running."))]);
        let response = app
            .oneshot(invocation(r#"{"prompt":"status?","messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));

        let events = data_lines(&body_string(response).await);
        assert_eq!(events, vec![Value::String("Line 3 is running.".into())]);
    }

    #[tokio::test]
    async fn invocation_announces_tool_use() {
        let tool_turn = Message {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse(ToolUseBlock {
                tool_use_id: "c1".into(),
                name: "get_line_status".into(),
                input: json!({"line": 3}),
            })],
        };
        let app = app(vec![response(tool_turn), response(Message::assistant("Idle."))]);

        let response = app.oneshot(invocation(r#"{"prompt":"line 3?"}"#)).await.unwrap();
        let events = data_lines(&body_string(response).await);

        assert_eq!(
            events,
            vec![
                json!({"type": "tool_use", "name": "get_line_status"}),
                Value::String("Idle.".into()),
            ]
        );
    }

    #[tokio::test]
    async fn generation_failure_is_the_last_event() {
        let response = app(vec![])
            .oneshot(invocation(r#"{"prompt":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = data_lines(&body_string(response).await);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "error");
        assert!(events[0]["message"].as_str().unwrap().contains("no response scripted"));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let response = app(vec![]).oneshot(invocation("not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn session_header_is_read() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);

        headers.insert(SESSION_HEADER, "  ".parse().unwrap());
        assert_eq!(session_id(&headers), None);

        headers.insert(SESSION_HEADER, "abc-123".parse().unwrap());
        assert_eq!(session_id(&headers).as_deref(), Some("abc-123"));
    }
}
