//! Caller-visible streaming events.
//!
//! `RelayEvent` is what an invocation yields after the relay has filtered
//! raw model output. The server turns each event into one SSE `data:` line.

use serde::{Deserialize, Serialize};

/// Events delivered to the caller of an invocation.
///
/// - `tool_use` : the model started using a tool (deduplicated)
/// - `text`     : a fragment of response text
/// - `error`    : generation failed; always the last event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    ToolUse { name: String },

    Text { data: String },

    Error { message: String },
}

impl RelayEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ToolUse { .. } => "tool_use",
            Self::Text { .. } => "text",
            Self::Error { .. } => "error",
        }
    }

    /// The wire value carried by this event.
    ///
    /// Text is the bare fragment; the other kinds are JSON objects with a
    /// `type` discriminator.
    pub fn to_chunk(&self) -> serde_json::Value {
        match self {
            Self::Text { data } => serde_json::Value::String(data.clone()),
            Self::ToolUse { name } => serde_json::json!({ "type": "tool_use", "name": name }),
            Self::Error { message } => serde_json::json!({ "type": "error", "message": message }),
        }
    }

    /// Encode as the payload of one SSE `data:` line.
    pub fn to_sse_data(&self) -> String {
        self.to_chunk().to_string()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_serialization() {
        let event = RelayEvent::ToolUse { name: "get_line_status".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_use""#));
        assert!(json.contains(r#""name":"get_line_status""#));
        assert_eq!(event.event_type(), "tool_use");
    }

    #[test]
    fn text_is_a_json_string_on_the_wire() {
        let event = RelayEvent::Text { data: "Line 3 is \"down\"\n".into() };
        assert_eq!(event.to_sse_data(), r#""Line 3 is \"down\"\n""#);
    }

    #[test]
    fn tool_use_and_error_are_objects_on_the_wire() {
        let tool = RelayEvent::ToolUse { name: "retrieve".into() };
        assert_eq!(
            tool.to_chunk(),
            serde_json::json!({"type": "tool_use", "name": "retrieve"})
        );

        let error = RelayEvent::Error { message: "boom".into() };
        assert_eq!(error.to_chunk()["type"], "error");
        assert!(error.is_terminal());
        assert!(!tool.is_terminal());
    }

    #[test]
    fn roundtrip() {
        let event = RelayEvent::Error { message: "model unavailable".into() };
        let json = serde_json::to_string(&event).unwrap();
        let back: RelayEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
