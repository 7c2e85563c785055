//! Tool trait and the registry/dispatcher.
//!
//! Tools are what give the agent the ability to act: create and trade
//! markets, score headlines, touch the file system, run commands. The
//! registry is the only caller of [`Tool::execute`], and it never fails:
//! every outcome, including an unknown name, an executor error or an
//! executor panic, comes back as a [`ToolInvocationResult`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The core Tool trait.
///
/// Executors receive the model-supplied input and return a JSON value on
/// success. Object values become the tool-specific fields of the result
/// envelope; anything else is wrapped as `{"result": value}`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "create_market").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given input.
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Timing envelope attached to every invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMeta {
    pub tool: String,
    pub duration_ms: u64,
}

/// Either the tool-specific fields or an error message, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Map<String, Value>),
    Failure {
        error: String,
        /// Only set when the requested name was not registered.
        available_tools: Option<Vec<String>>,
    },
}

impl ToolOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            available_tools: None,
        }
    }

    /// Fold an executor's return value into an outcome.
    ///
    /// An object carrying a string `error` field is the tool reporting its
    /// own failure and is treated as one.
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                fields.remove("_meta");
                match fields.remove("error") {
                    Some(Value::String(error)) => Self::failure(error),
                    Some(other) => {
                        fields.insert("error".into(), other);
                        Self::Success(fields)
                    }
                    None => Self::Success(fields),
                }
            }
            other => {
                let mut fields = Map::new();
                fields.insert("result".into(), other);
                Self::Success(fields)
            }
        }
    }
}

/// The envelope returned by every dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    pub outcome: ToolOutcome,
    pub meta: InvocationMeta,
}

impl ToolInvocationResult {
    /// An error envelope for a call that never reached an executor.
    pub fn rejected(tool: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            outcome: ToolOutcome::failure(error),
            meta: InvocationMeta {
                tool: tool.to_string(),
                duration_ms,
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Failure { error, .. } => Some(error),
            ToolOutcome::Success(_) => None,
        }
    }

    /// Look up a tool-specific field of a successful result.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Success(fields) => fields.get(key),
            ToolOutcome::Failure { .. } => None,
        }
    }

    /// The flat JSON form: tool fields or `error`, plus `_meta`.
    pub fn to_json(&self) -> Value {
        let mut object = match &self.outcome {
            ToolOutcome::Success(fields) => fields.clone(),
            ToolOutcome::Failure {
                error,
                available_tools,
            } => {
                let mut object = Map::new();
                object.insert("error".into(), Value::String(error.clone()));
                if let Some(names) = available_tools {
                    object.insert("availableTools".into(), serde_json::json!(names));
                }
                object
            }
        };
        object.insert("_meta".into(), serde_json::json!(self.meta));
        Value::Object(object)
    }

    /// The string fed back to the model as `ToolResult` content.
    pub fn to_content(&self) -> String {
        self.to_json().to_string()
    }
}

impl Serialize for ToolInvocationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A registry of available tools.
///
/// Built once at startup and then shared behind an `Arc`; nothing mutates
/// it afterwards. Registration order is preserved for `definitions()`.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. A name that is already taken is rejected.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// All registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch a call by name. Never fails; see the module docs.
    pub async fn execute(&self, name: &str, input: Value) -> ToolInvocationResult {
        let start = Instant::now();

        let outcome = match self.get(name) {
            None => {
                warn!(tool = %name, "Unknown tool requested");
                ToolOutcome::Failure {
                    error: format!("Unknown tool: {name}"),
                    available_tools: Some(self.names().into_iter().map(String::from).collect()),
                }
            }
            Some(tool) => {
                debug!(tool = %name, "Dispatching tool");
                match AssertUnwindSafe(tool.execute(input)).catch_unwind().await {
                    Ok(Ok(value)) => ToolOutcome::from_value(value),
                    Ok(Err(e)) => {
                        warn!(tool = %name, error = %e, "Tool execution failed");
                        ToolOutcome::failure(e.to_string())
                    }
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        warn!(tool = %name, reason = %reason, "Tool panicked");
                        ToolOutcome::failure(format!("Tool '{name}' panicked: {reason}"))
                    }
                }
            }
        };

        ToolInvocationResult {
            outcome,
            meta: InvocationMeta {
                tool: name.to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
