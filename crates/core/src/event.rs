//! Raw events produced by a running model session.
//!
//! A session emits one `ModelEvent` per streaming step. An event may carry
//! an in-progress tool use, a text fragment, both, or neither (lifecycle
//! markers). The relay decides what the caller gets to see.

use serde::{Deserialize, Serialize};

/// A tool use the model is currently building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseDelta {
    #[serde(default)]
    pub tool_use_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argument JSON received so far
    #[serde(default)]
    pub input: String,
}

/// One raw step of model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tool_use: Option<ToolUseDelta>,

    /// Text payload. Only string values are treated as text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Set on the event that closes a model turn
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub complete: bool,
}

impl ModelEvent {
    /// A text fragment event.
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: Some(serde_json::Value::String(data.into())),
            ..Default::default()
        }
    }

    /// An in-progress tool use event.
    pub fn tool_use(tool_use_id: impl Into<String>, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            current_tool_use: Some(ToolUseDelta {
                tool_use_id: tool_use_id.into(),
                name: Some(name.into()),
                input: input.into(),
            }),
            ..Default::default()
        }
    }

    /// The tool name carried by this event, if any and non-empty.
    pub fn tool_name(&self) -> Option<&str> {
        self.current_tool_use
            .as_ref()
            .and_then(|tu| tu.name.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// The text payload, if it is a string.
    pub fn text_data(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.as_str())
    }
}
