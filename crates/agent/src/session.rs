//! Model session: the streaming tool-use loop behind one invocation.
//!
//! A session owns its instruction, tool set and message list. `stream`
//! spawns the loop and hands back a receiver of raw [`ModelEvent`]s:
//!
//! 1. Send system + messages + tool definitions to the provider.
//! 2. Forward text fragments and in-progress tool uses as they arrive.
//! 3. If the turn closed with tool calls, execute them, append the results
//!    and go back to 1. Otherwise emit a `complete` event and stop.
//!
//! A provider failure is sent as the last item. Dropping the returned stream
//! aborts the loop, including any tool call or model read in flight.

use std::collections::HashSet;
use std::pin::Pin;
use std::task::{Context, Poll};

use foreman_core::error::ProviderError;
use foreman_core::event::ModelEvent;
use foreman_core::message::{ContentBlock, Message, Role, ToolResultBlock, ToolUseBlock};
use foreman_core::provider::StreamToolCall;
use foreman_core::tool::{ToolCall, ToolSet};
use foreman_providers::ModelHandle;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Default bound on model turns per invocation.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Raw model output, as consumed by the relay.
///
/// Owns the session task: dropping the stream aborts it.
pub struct ModelEventStream {
    events: ReceiverStream<Result<ModelEvent, ProviderError>>,
    task: JoinHandle<()>,
}

impl Stream for ModelEventStream {
    type Item = Result<ModelEvent, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for ModelEventStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Everything one model session needs, owned.
pub struct AgentSession {
    model: ModelHandle,
    tools: ToolSet,
    system: String,
    messages: Vec<Message>,
    max_iterations: u32,
}

impl AgentSession {
    pub fn new(model: ModelHandle, tools: ToolSet, system: String, messages: Vec<Message>) -> Self {
        Self {
            model,
            tools,
            system,
            messages,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Run the session for `prompt` as the active turn.
    pub fn stream(self, prompt: impl Into<String>) -> ModelEventStream {
        let (tx, rx) = mpsc::channel(128);
        let prompt = prompt.into();
        let task = tokio::spawn(self.run(prompt, tx));
        ModelEventStream {
            events: ReceiverStream::new(rx),
            task,
        }
    }

    async fn run(mut self, prompt: String, tx: mpsc::Sender<Result<ModelEvent, ProviderError>>) {
        self.messages.push(Message::user(prompt));
        let tool_defs = self.tools.definitions();

        for iteration in 1..=self.max_iterations {
            debug!(iteration, messages = self.messages.len(), "Model turn");

            let request = self.model.request(
                Some(self.system.clone()),
                self.messages.clone(),
                tool_defs.clone(),
            );
            let mut chunks = match self.model.provider.stream(request).await {
                Ok(rx) => rx,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let mut text = String::new();
            let mut announced: HashSet<String> = HashSet::new();
            let mut final_calls: Option<Vec<StreamToolCall>> = None;

            while let Some(chunk) = chunks.recv().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                if chunk.done {
                    if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                        text.push_str(&content);
                        if tx.send(Ok(ModelEvent::text(content))).await.is_err() {
                            return;
                        }
                    }
                    final_calls = Some(chunk.tool_calls);
                    break;
                }

                for call in chunk.tool_calls {
                    if !call.id.is_empty() {
                        announced.insert(call.id.clone());
                    }
                    let event = ModelEvent::tool_use(call.id, call.name, call.arguments);
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }

                if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                    text.push_str(&content);
                    if tx.send(Ok(ModelEvent::text(content))).await.is_err() {
                        return;
                    }
                }
            }

            let Some(calls) = final_calls else {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(
                        "stream ended before the turn completed".into(),
                    )))
                    .await;
                return;
            };

            // Providers that only report tool calls on the closing chunk
            // still surface each use once.
            for call in calls.iter().filter(|c| !announced.contains(&c.id)) {
                let event = ModelEvent::tool_use(&call.id, &call.name, &call.arguments);
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }

            let mut assistant = Vec::new();
            if !text.is_empty() {
                assistant.push(ContentBlock::Text(text));
            }
            if calls.is_empty() {
                self.messages.push(Message {
                    role: Role::Assistant,
                    content: assistant,
                });
                let _ = tx
                    .send(Ok(ModelEvent {
                        complete: true,
                        ..Default::default()
                    }))
                    .await;
                return;
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                let input = parse_input(&call.arguments);
                assistant.push(ContentBlock::ToolUse(ToolUseBlock {
                    tool_use_id: call.id.clone(),
                    name: call.name.clone(),
                    input: input.clone().unwrap_or_else(|_| serde_json::json!({})),
                }));
                results.push(ContentBlock::ToolResult(
                    self.execute_tool(call.id, call.name, input).await,
                ));
            }

            self.messages.push(Message {
                role: Role::Assistant,
                content: assistant,
            });
            self.messages.push(Message {
                role: Role::User,
                content: results,
            });

            if tx.is_closed() {
                return;
            }
        }

        warn!(max_iterations = self.max_iterations, "Model session hit the iteration limit");
        let _ = tx
            .send(Ok(ModelEvent {
                complete: true,
                ..Default::default()
            }))
            .await;
    }

    async fn execute_tool(
        &self,
        id: String,
        name: String,
        input: Result<serde_json::Value, String>,
    ) -> ToolResultBlock {
        let arguments = match input {
            Ok(value) => value,
            Err(reason) => {
                warn!(tool = %name, %reason, "Unparseable tool arguments");
                return ToolResultBlock {
                    tool_use_id: id,
                    content: format!("Error: invalid tool arguments: {reason}"),
                    status: "error".into(),
                };
            }
        };

        info!(tool = %name, "Executing tool");
        let call = ToolCall {
            id: id.clone(),
            name,
            arguments,
        };
        match self.tools.execute(&call).await {
            Ok(result) => ToolResultBlock {
                tool_use_id: id,
                content: result.output,
                status: if result.success { "success" } else { "error" }.into(),
            },
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResultBlock {
                    tool_use_id: id,
                    content: format!("Error: {e}"),
                    status: "error".into(),
                }
            }
        }
    }
}

fn parse_input(arguments: &str) -> Result<serde_json::Value, String> {
    if arguments.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(arguments).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, SlowTool, StaticTool, Turn, text_turn, tool_turn};
    use foreman_core::provider::StreamChunk;
    use futures::StreamExt;
    use std::sync::Arc;

    fn handle(provider: Arc<ScriptedProvider>) -> ModelHandle {
        ModelHandle::new(provider, "test-model")
    }

    async fn collect(stream: ModelEventStream) -> Vec<Result<ModelEvent, ProviderError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn text_only_turn() {
        let provider = Arc::new(ScriptedProvider::text(&["Line 3 ", "is running."]));
        let session = AgentSession::new(handle(provider.clone()), ToolSet::new(), "SYS".into(), vec![]);

        let events = collect(session.stream("status?")).await;
        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| e.as_ref().ok().and_then(|e| e.text_data()))
            .collect();
        assert_eq!(texts, vec!["Line 3 ", "is running."]);
        assert!(events.last().unwrap().as_ref().unwrap().complete);

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some("SYS"));
        assert_eq!(requests[0].messages, vec![Message::user("status?")]);
    }

    #[tokio::test]
    async fn history_precedes_prompt() {
        let provider = Arc::new(ScriptedProvider::text(&["ok"]));
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let session = AgentSession::new(handle(provider.clone()), ToolSet::new(), "SYS".into(), history);

        collect(session.stream("next")).await;
        let messages = &provider.requests()[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], Message::user("next"));
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(&[("call_1", "get_line_status", r#"{"line":3}"#)]),
            text_turn(&["Line 3 is idle."]),
        ]));
        let tools: ToolSet = [Arc::new(StaticTool { name: "get_line_status", output: "idle" })
            as Arc<dyn foreman_core::tool::Tool>]
        .into_iter()
        .collect();
        let session = AgentSession::new(handle(provider.clone()), tools.clone(), "SYS".into(), vec![]);

        let events = collect(session.stream("line 3?")).await;
        let names: Vec<_> = events
            .iter()
            .filter_map(|e| e.as_ref().ok().and_then(|e| e.tool_name()))
            .collect();
        assert_eq!(names, vec!["get_line_status"]);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);

        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].tool_uses().next().unwrap().input["line"], 3);
        match &second[2].content[0] {
            ContentBlock::ToolResult(result) => {
                assert_eq!(result.tool_use_id, "call_1");
                assert_eq!(result.content, "idle");
                assert_eq!(result.status, "success");
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn final_only_tool_calls_are_announced_once() {
        let closing = Turn::Chunks(vec![Ok(StreamChunk {
            tool_calls: vec![StreamToolCall {
                id: "c1".into(),
                name: "retrieve".into(),
                arguments: "{}".into(),
            }],
            done: true,
            ..Default::default()
        })]);
        let provider = Arc::new(ScriptedProvider::new(vec![closing, text_turn(&["done"])]));
        let session = AgentSession::new(handle(provider), ToolSet::new(), "SYS".into(), vec![]);

        let events = collect(session.stream("q")).await;
        let names: Vec<_> = events
            .iter()
            .filter_map(|e| e.as_ref().ok().and_then(|e| e.tool_name()))
            .collect();
        assert_eq!(names, vec!["retrieve"]);
    }

    #[tokio::test]
    async fn unknown_tool_reports_error_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(&[("c1", "missing", "{}")]),
            text_turn(&["sorry"]),
        ]));
        let session = AgentSession::new(handle(provider.clone()), ToolSet::new(), "SYS".into(), vec![]);
        collect(session.stream("q")).await;

        let second = &provider.requests()[1].messages;
        match &second[2].content[0] {
            ContentBlock::ToolResult(result) => {
                assert_eq!(result.status, "error");
                assert!(result.content.contains("missing"));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_failure_is_last_item() {
        let provider = Arc::new(ScriptedProvider::new(vec![Turn::Fail(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let session = AgentSession::new(handle(provider), ToolSet::new(), "SYS".into(), vec![]);

        let events = collect(session.stream("q")).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(ProviderError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn mid_stream_failure_follows_text() {
        let turn = Turn::Chunks(vec![
            Ok(StreamChunk {
                content: Some("partial".into()),
                ..Default::default()
            }),
            Err(ProviderError::StreamInterrupted("reset".into())),
        ]);
        let provider = Arc::new(ScriptedProvider::new(vec![turn]));
        let session = AgentSession::new(handle(provider), ToolSet::new(), "SYS".into(), vec![]);

        let events = collect(session.stream("q")).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().text_data(), Some("partial"));
        assert!(events[1].is_err());
    }

    #[tokio::test]
    async fn iteration_limit_stops_the_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(&[("c1", "get_line_status", "{}")]),
            tool_turn(&[("c2", "get_line_status", "{}")]),
        ]));
        let tools: ToolSet = [Arc::new(StaticTool { name: "get_line_status", output: "ok" })
            as Arc<dyn foreman_core::tool::Tool>]
        .into_iter()
        .collect();
        let session = AgentSession::new(handle(provider.clone()), tools, "SYS".into(), vec![])
            .with_max_iterations(2);

        let events = collect(session.stream("loop")).await;
        assert_eq!(provider.call_count(), 2);
        assert!(events.last().unwrap().as_ref().unwrap().complete);
    }

    #[tokio::test]
    async fn dropping_the_stream_aborts_pending_tool_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_turn(&[("c1", "read_plc", "{}")]),
            text_turn(&["never sent"]),
        ]));
        let slow = Arc::new(SlowTool {
            name: "read_plc",
            delay: std::time::Duration::from_millis(300),
            finished: Default::default(),
        });
        let tools: ToolSet = [slow.clone() as Arc<dyn foreman_core::tool::Tool>]
            .into_iter()
            .collect();
        let session = AgentSession::new(handle(provider.clone()), tools, "SYS".into(), vec![]);

        let mut stream = session.stream("read it");
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.tool_name(), Some("read_plc"));
        drop(stream);

        tokio::time::sleep(std::time::Duration::from_millis(800)).await;
        assert_eq!(slow.finished(), 0);
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn empty_arguments_are_an_empty_object() {
        assert_eq!(parse_input("").unwrap(), serde_json::json!({}));
        assert!(parse_input("{not json").is_err());
    }
}
