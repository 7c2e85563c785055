//! The conversation loop for Augur.
//!
//! A turn runs as **model call → tool dispatch → model call** until the
//! model answers without asking for tools:
//!
//! 1. **Receive** a user line; slash commands are handled first ([`slash`])
//! 2. **Stream** the model's answer, rendering text as it arrives ([`stream`])
//! 3. **If tool calls**: dispatch them in order, append their results, loop
//! 4. **If text only**: the turn is done
//!
//! Throttled model calls are retried with a fixed cooldown, a bounded
//! number of times. Any other failure aborts the turn and leaves the
//! session as it was.

pub mod loop_runner;
pub mod session;
pub mod slash;
pub mod stream;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::{AgentLoop, ITERATION_LIMIT_NOTICE, RetryPolicy, TurnOutcome};
pub use session::Session;
pub use slash::{SlashCommands, SlashContext, SlashOutcome, parse_command};
pub use stream::{FinalizedTurn, ToolRequest, TurnAccumulator, TurnStop};
pub use stream_event::{AgentEvent, NoticeLevel, RecordingRenderer, Renderer};
