//! Stream relay: raw model events in, caller-facing events out.

use std::fmt::Display;

use foreman_core::event::ModelEvent;
use futures::stream::{self, Stream, StreamExt};

use crate::stream_event::RelayEvent;

/// Per-invocation relay state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayState {
    /// Name of the most recently announced tool
    pub last_tool: Option<String>,
    /// Set once the terminal error has been emitted
    pub finished: bool,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events to emit for one raw event, tool use first.
    ///
    /// A tool name equal to the last announced one is suppressed. Only
    /// string payloads become text.
    pub fn on_event(&mut self, event: &ModelEvent) -> Vec<RelayEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }

        if let Some(name) = event.tool_name() {
            if self.last_tool.as_deref() != Some(name) {
                self.last_tool = Some(name.to_string());
                out.push(RelayEvent::ToolUse {
                    name: name.to_string(),
                });
            }
        }

        if let Some(text) = event.text_data() {
            out.push(RelayEvent::Text {
                data: text.to_string(),
            });
        }

        out
    }

    /// The terminal event for a raw-stream failure.
    pub fn on_error(&mut self, error: &impl Display) -> RelayEvent {
        self.finished = true;
        RelayEvent::Error {
            message: error.to_string(),
        }
    }
}

/// Relay a raw event stream.
///
/// Ends when the raw stream ends, or right after the single
/// [`RelayEvent::Error`] produced by the first raw failure.
pub fn relay<S, E>(raw: S) -> impl Stream<Item = RelayEvent>
where
    S: Stream<Item = Result<ModelEvent, E>>,
    E: Display,
{
    let raw = Box::pin(raw);
    stream::unfold((raw, RelayState::new()), |(mut raw, mut state)| async move {
        if state.finished {
            return None;
        }
        let events = match raw.next().await? {
            Ok(event) => state.on_event(&event),
            Err(e) => vec![state.on_error(&e)],
        };
        Some((stream::iter(events), (raw, state)))
    })
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> Result<ModelEvent, String> {
        Ok(ModelEvent::tool_use("id", name, ""))
    }

    fn text(data: &str) -> Result<ModelEvent, String> {
        Ok(ModelEvent::text(data))
    }

    async fn run(raw: Vec<Result<ModelEvent, String>>) -> Vec<RelayEvent> {
        relay(stream::iter(raw)).collect().await
    }

    fn tool_names(events: &[RelayEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                RelayEvent::ToolUse { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn consecutive_repeats_are_suppressed() {
        let events = run(vec![tool("A"), tool("A"), tool("B"), tool("A")]).await;
        assert_eq!(tool_names(&events), vec!["A", "B", "A"]);
    }

    #[tokio::test]
    async fn text_passes_through_verbatim() {
        let events = run(vec![text("Line 3 "), text(""), text("is down.\n")]).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::Text { data: "Line 3 ".into() },
                RelayEvent::Text { data: String::new() },
                RelayEvent::Text { data: "is down.\n".into() },
            ]
        );
    }

    #[tokio::test]
    async fn tool_then_text_from_one_event() {
        let mut event = ModelEvent::tool_use("id", "retrieve", "");
        event.data = Some(serde_json::Value::String("Searching".into()));

        let events = run(vec![Ok(event)]).await;
        assert_eq!(
            events,
            vec![
                RelayEvent::ToolUse { name: "retrieve".into() },
                RelayEvent::Text { data: "Searching".into() },
            ]
        );
    }

    #[tokio::test]
    async fn non_string_data_and_markers_are_dropped() {
        let structured = ModelEvent {
            data: Some(serde_json::json!({"delta": 1})),
            ..Default::default()
        };
        let marker = ModelEvent {
            complete: true,
            ..Default::default()
        };
        let unnamed = ModelEvent::tool_use("id", "", "{}");

        assert!(run(vec![Ok(structured), Ok(marker), Ok(unnamed)]).await.is_empty());
    }

    #[tokio::test]
    async fn fault_is_terminal() {
        let raw = vec![
            tool("A"),
            text("partial"),
            Err("connection reset".to_string()),
            text("never seen"),
            Err("second fault".to_string()),
        ];
        let events = run(raw).await;

        assert_eq!(events.len(), 3);
        assert_eq!(
            events.last(),
            Some(&RelayEvent::Error { message: "connection reset".into() })
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn fault_on_first_step() {
        let events = run(vec![Err("model unavailable".to_string())]).await;
        assert_eq!(events, vec![RelayEvent::Error { message: "model unavailable".into() }]);
    }

    #[test]
    fn states_are_independent() {
        let mut first = RelayState::new();
        let mut second = RelayState::new();
        let a = ModelEvent::tool_use("1", "A", "");

        assert_eq!(first.on_event(&a).len(), 1);
        assert_eq!(second.on_event(&a).len(), 1);
        assert!(first.on_event(&a).is_empty());
    }

    #[test]
    fn finished_state_emits_nothing() {
        let mut state = RelayState::new();
        let _ = state.on_error(&"boom");
        assert!(state.finished);
        assert!(state.on_event(&ModelEvent::text("late")).is_empty());
    }
}
