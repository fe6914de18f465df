//! Local tool implementations for Foreman.
//!
//! The local set is always offered to the model, after any tools the
//! gateway exposes.

pub mod retrieve;

use std::sync::Arc;

use foreman_config::KnowledgeBaseConfig;
use foreman_core::tool::ToolSet;

pub use retrieve::RetrieveTool;

/// The fixed local tool set.
pub fn local_tools(config: &KnowledgeBaseConfig) -> ToolSet {
    let mut tools = ToolSet::new();
    tools.push(Arc::new(RetrieveTool::new(config)));
    tools
}
