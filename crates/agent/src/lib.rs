//! Invocation orchestration for Foreman.
//!
//! One invocation runs through five stages:
//!
//! 1. **Acquire tools** from the remote gateway, degrading to the local set
//! 2. **Fetch fallback context** when the gateway was not usable
//! 3. **Compose the instruction** from the base prompt and at most one notice
//! 4. **Assemble history** into model messages
//! 5. **Run the model session** and relay its events to the caller
//!
//! Only stage 5 produces caller-visible output. Everything before it
//! recovers from its own failures.

pub mod context;
pub mod conversation;
pub mod invoke;
pub mod prompt;
pub mod relay;
pub mod session;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use context::{ContextClient, ContextOutcome, ContextSource};
pub use invoke::{InvocationContext, Invoker, PreparedInvocation};
pub use relay::{RelayState, relay};
pub use session::{AgentSession, ModelEventStream};
pub use stream_event::RelayEvent;
