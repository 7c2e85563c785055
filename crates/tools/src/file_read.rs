//! File read tool, scoped to the workspace sandbox.

use async_trait::async_trait;
use augur_core::error::ToolError;
use augur_core::tool::Tool;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;

use crate::parse_input;
use crate::sandbox::Sandbox;

/// Larger files are truncated to this many bytes.
const MAX_READ_BYTES: usize = 256 * 1024;

pub struct FileReadTool {
    sandbox: Sandbox,
}

#[derive(Deserialize)]
struct FileReadInput {
    path: String,
}

impl FileReadTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read, relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: FileReadInput = parse_input(input)?;
        let path = self
            .sandbox
            .resolve(&input.path)
            .map_err(|e| ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let read_error =
            |e: std::io::Error| ToolError::failed(self.name(), format!("Failed to read file: {e}"));

        // Devices and FIFOs never end; only regular files are read.
        let metadata = tokio::fs::metadata(&path).await.map_err(read_error)?;
        if !metadata.is_file() {
            return Err(ToolError::failed(
                self.name(),
                format!("Not a regular file: {}", path.display()),
            ));
        }

        let file = tokio::fs::File::open(&path).await.map_err(read_error)?;
        let mut bytes = Vec::new();
        file.take(MAX_READ_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .await
            .map_err(read_error)?;

        let truncated = bytes.len() > MAX_READ_BYTES;
        bytes.truncate(MAX_READ_BYTES);
        let content = String::from_utf8_lossy(&bytes);

        Ok(json!({
            "path": path.display().to_string(),
            "bytes": metadata.len(),
            "truncated": truncated,
            "content": content,
        }))
    }
}
