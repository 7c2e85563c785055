//! File write tool, scoped to the workspace sandbox.

use async_trait::async_trait;
use augur_core::error::ToolError;
use augur_core::tool::Tool;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::parse_input;
use crate::sandbox::Sandbox;

pub struct FileWriteTool {
    sandbox: Sandbox,
}

#[derive(Deserialize)]
struct FileWriteInput {
    path: String,
    content: String,
}

impl FileWriteTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: FileWriteInput = parse_input(input)?;
        let path = self
            .sandbox
            .resolve(&input.path)
            .map_err(|e| ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::failed(self.name(), format!("Failed to create directory: {e}"))
            })?;
        }
        tokio::fs::write(&path, &input.content)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to write file: {e}")))?;

        Ok(json!({
            "path": path.display().to_string(),
            "bytesWritten": input.content.len(),
        }))
    }
}
