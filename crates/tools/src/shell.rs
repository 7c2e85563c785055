//! Shell tool: run an allowlisted command inside the workspace.
//!
//! A non-zero exit status is reported as data (`exitCode`, `success`), not
//! as an error. Commands that outlive the timeout are killed.
//!
//! With an allowlist configured, the command must be a single simple
//! command: separators, pipes, substitutions and redirections are refused
//! before anything reaches the shell.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use augur_core::error::ToolError;
use augur_core::tool::Tool;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::parse_input;

/// Characters that let one command line run more than the named program.
const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '$', '`', '<', '>', '(', ')', '\n', '\r'];

pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
struct ShellInput {
    command: String,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>, timeout: Duration) -> Self {
        Self {
            allowed_commands,
            timeout,
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Why `command` may not run, if it may not.
    fn check_command(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        if let Some(c) = command.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(format!("Shell metacharacter {c:?} is not allowed"));
        }
        let base_cmd = command.split_whitespace().next().unwrap_or("");
        if self.allowed_commands.iter().any(|a| a == base_cmd) {
            Ok(())
        } else {
            Err(format!("Command '{base_cmd}' not in allowlist"))
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its exit code, stdout and stderr."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let ShellInput { command } = parse_input(input)?;

        if let Err(reason) = self.check_command(&command) {
            warn!(command = %command, %reason, "Shell command refused");
            return Err(ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason,
            });
        }

        debug!(command = %command, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", &command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", &command]);
            c
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| ToolError::failed(self.name(), e))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ToolError::failed(self.name(), e))?,
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: self.name().into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();
        if !success {
            warn!(command = %command, exit_code, "Command failed");
        }

        Ok(json!({
            "exitCode": exit_code,
            "stdout": String::from_utf8_lossy(&output.stdout).trim_end(),
            "stderr": String::from_utf8_lossy(&output.stderr).trim_end(),
            "success": success,
        }))
    }
}
