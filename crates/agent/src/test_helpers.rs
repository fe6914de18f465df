//! Shared test helpers: a scripted streaming provider and stub tools.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use foreman_core::error::{ProviderError, ToolError};
use foreman_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, StreamToolCall,
};
use foreman_core::tool::{Tool, ToolResult};

/// One scripted model turn.
pub enum Turn {
    Chunks(Vec<Result<StreamChunk, ProviderError>>),
    Fail(ProviderError),
}

/// A provider that replays scripted turns and records every request.
///
/// Panics if more turns are requested than scripted.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Turn>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A single turn answering with the given text fragments.
    pub fn text(fragments: &[&str]) -> Self {
        Self::new(vec![text_turn(fragments)])
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("scripted provider only streams".into()))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no more turns");

        match turn {
            Turn::Fail(err) => Err(err),
            Turn::Chunks(chunks) => {
                let (tx, rx) = tokio::sync::mpsc::channel(chunks.len().max(1));
                for chunk in chunks {
                    tx.try_send(chunk).unwrap();
                }
                Ok(rx)
            }
        }
    }
}

/// Text fragments followed by the closing chunk.
pub fn text_turn(fragments: &[&str]) -> Turn {
    let mut chunks: Vec<_> = fragments
        .iter()
        .map(|f| {
            Ok(StreamChunk {
                content: Some(f.to_string()),
                ..Default::default()
            })
        })
        .collect();
    chunks.push(Ok(StreamChunk {
        done: true,
        ..Default::default()
    }));
    Turn::Chunks(chunks)
}

/// A turn that streams partial tool calls and closes with the full calls.
///
/// Each call is `(id, name, arguments_json)`.
pub fn tool_turn(calls: &[(&str, &str, &str)]) -> Turn {
    let full: Vec<StreamToolCall> = calls
        .iter()
        .map(|(id, name, args)| StreamToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        })
        .collect();

    let mut chunks: Vec<_> = full
        .iter()
        .map(|call| {
            Ok(StreamChunk {
                tool_calls: vec![StreamToolCall {
                    arguments: String::new(),
                    ..call.clone()
                }],
                ..Default::default()
            })
        })
        .collect();
    chunks.push(Ok(StreamChunk {
        tool_calls: full,
        done: true,
        ..Default::default()
    }));
    Turn::Chunks(chunks)
}

/// A tool that answers with a fixed output.
pub struct StaticTool {
    pub name: &'static str,
    pub output: &'static str,
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "static test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: self.output.to_string(),
            data: None,
        })
    }
}

/// A tool that takes `delay` to answer and counts finished executions.
pub struct SlowTool {
    pub name: &'static str,
    pub delay: Duration,
    pub finished: AtomicUsize,
}

impl SlowTool {
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "slow test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: "done".to_string(),
            data: None,
        })
    }
}
