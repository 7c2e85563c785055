//! Agent-level events and the sink that presents them.
//!
//! The loop emits these synchronously, in cause-effect order: text deltas
//! as they stream, a `ToolStarted` right before each dispatch and its
//! `ToolFinished` right after.

use augur_core::provider::Usage;
use augur_core::tool::ToolInvocationResult;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// Events emitted by the agent while a turn or command runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Partial text from the model.
    TextDelta { text: String },

    /// A tool is about to run.
    ToolStarted {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool ran (or was rejected before running).
    ToolFinished {
        id: String,
        name: String,
        result: ToolInvocationResult,
    },

    /// Out-of-band message for the user: throttling, command output.
    Notice { level: NoticeLevel, message: String },

    /// Clear the display.
    ClearScreen,

    /// The turn is over.
    TurnDone {
        iterations: u32,
        tool_calls: usize,
        usage: Usage,
    },
}

impl AgentEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::Notice {
            level: NoticeLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolFinished { .. } => "tool_finished",
            Self::Notice { .. } => "notice",
            Self::ClearScreen => "clear_screen",
            Self::TurnDone { .. } => "turn_done",
        }
    }
}

/// Presentation sink.
pub trait Renderer: Send {
    fn emit(&mut self, event: &AgentEvent);
}

/// Keeps every event; handy for tests and transcripts.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub events: Vec<AgentEvent>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All streamed text, concatenated.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Notice { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(AgentEvent::event_type).collect()
    }
}

impl Renderer for RecordingRenderer {
    fn emit(&mut self, event: &AgentEvent) {
        self.events.push(event.clone());
    }
}
