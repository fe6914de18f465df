//! Caller history to model messages.

use foreman_core::message::{HistoryMessage, Message};

/// One text message per history entry, in order.
///
/// Roles are forwarded as given. Nothing is truncated, merged or dropped,
/// and the new prompt is not included; the session appends it as the
/// active turn.
pub fn assemble(history: &[HistoryMessage]) -> Vec<Message> {
    history
        .iter()
        .map(|entry| Message::text(entry.role.clone(), entry.content.clone()))
        .collect()
}
