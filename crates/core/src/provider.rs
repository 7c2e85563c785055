//! Provider trait, the abstraction over the language-model backend.
//!
//! A provider receives the model id, system instructions, tool definitions
//! and message history, and answers with an incremental stream of
//! [`StreamEvent`]s. Reassembling those events into a message is the job of
//! the agent crate, not the provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// One model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// System instructions, sent out of band from the history
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system: String,

    /// The conversation history
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name, unique within a registry
    pub name: String,

    /// Natural-language purpose
    pub description: String,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// What kind of block a `BlockStart` opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    ToolUse { id: String, name: String },
}

/// An incremental fragment of the currently open block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text to render immediately.
    Text(String),
    /// A fragment of the JSON-encoded tool input.
    InputJson(String),
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => Self::EndTurn,
            "tool_use" => Self::ToolUse,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A single event of a streamed model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    BlockStart { kind: BlockKind },
    BlockDelta { delta: BlockDelta },
    BlockStop,
    Usage { usage: Usage },
    MessageStop { stop_reason: Option<StopReason> },
}

impl StreamEvent {
    pub fn text_start() -> Self {
        Self::BlockStart {
            kind: BlockKind::Text,
        }
    }

    pub fn tool_start(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::BlockStart {
            kind: BlockKind::ToolUse {
                id: id.into(),
                name: name.into(),
            },
        }
    }

    pub fn text(fragment: impl Into<String>) -> Self {
        Self::BlockDelta {
            delta: BlockDelta::Text(fragment.into()),
        }
    }

    pub fn input_json(fragment: impl Into<String>) -> Self {
        Self::BlockDelta {
            delta: BlockDelta::InputJson(fragment.into()),
        }
    }
}

/// Receiving half of a streamed response.
pub type EventStream = mpsc::Receiver<Result<StreamEvent, ProviderError>>;

/// The core Provider trait.
///
/// The agent loop calls `stream()` without knowing which backend answers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and receive its events as they arrive.
    ///
    /// Errors that happen before the first event (HTTP status, auth,
    /// throttling) are returned directly; later failures arrive in-band.
    async fn stream(&self, request: ProviderRequest) -> Result<EventStream, ProviderError>;
}
