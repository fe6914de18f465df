//! # Foreman Core
//!
//! Domain types, traits, and error definitions for the Foreman agent
//! front-end. This crate has **no framework dependencies**: it defines the
//! vocabulary (requests, messages, tools, model events) that the acquisition,
//! model, and relay crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`] for the generative model backend
//! - [`Tool`] for callable capabilities, whether local or gateway-sourced
//!
//! Implementations live in their respective crates, so the orchestration
//! can be tested end-to-end with in-process stubs.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, GatewayError, ProviderError, ToolError};
pub use event::{ModelEvent, ToolUseDelta};
pub use message::{ContentBlock, HistoryMessage, InvocationRequest, Message, Role, ToolResultBlock, ToolUseBlock};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tool::{Tool, ToolCall, ToolResult, ToolSet};
