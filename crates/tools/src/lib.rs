//! Built-in tool implementations for Augur.
//!
//! Tools give the agent the ability to act: create and trade prediction
//! markets, score news headlines for market potential, run allowlisted
//! shell commands, and read/write files inside the workspace.

pub mod file_read;
pub mod file_write;
pub mod market;
pub mod news;
pub mod sandbox;
pub mod shell;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use augur_core::error::ToolError;
use augur_core::tool::ToolRegistry;
use serde::de::DeserializeOwned;
use serde_json::Value;

use market::MarketBackend;
use news::{KeywordScorer, ScoreCache};
use sandbox::Sandbox;

/// Knobs for the built-in tools.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub shell_allowed_commands: Vec<String>,
    pub shell_timeout: Duration,
    pub workspace_root: Option<PathBuf>,
    pub forbidden_paths: Vec<String>,
    pub default_duration_days: u32,
    pub default_liquidity_usdc: f64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            shell_allowed_commands: ["ls", "cat", "head", "tail", "echo", "pwd", "date", "wc", "grep"]
                .into_iter()
                .map(String::from)
                .collect(),
            shell_timeout: Duration::from_secs(30),
            workspace_root: None,
            forbidden_paths: vec!["/etc".into(), "~/.ssh".into()],
            default_duration_days: 30,
            default_liquidity_usdc: 1.0,
        }
    }
}

/// Create the registry with every built-in tool.
///
/// Market tools come first so they lead the definitions sent to the model.
pub fn default_registry(
    settings: &ToolSettings,
    market: Arc<dyn MarketBackend>,
    scores: ScoreCache,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(market::CreateMarketTool::new(
        market.clone(),
        settings.default_duration_days,
        settings.default_liquidity_usdc,
    )))?;
    registry.register(Box::new(market::ListMarketsTool::new(market.clone())))?;
    registry.register(Box::new(market::GetMarketTool::new(market.clone())))?;
    registry.register(Box::new(market::MarketStatsTool::new(market.clone())))?;
    registry.register(Box::new(market::BuySharesTool::new(market.clone())))?;
    registry.register(Box::new(market::SellSharesTool::new(market)))?;
    registry.register(Box::new(news::ScoreNewsTool::new(
        Arc::new(KeywordScorer),
        scores,
    )))?;

    let sandbox = Sandbox::new(
        settings.workspace_root.clone(),
        settings.forbidden_paths.clone(),
    );
    registry.register(Box::new(
        shell::ShellTool::new(settings.shell_allowed_commands.clone(), settings.shell_timeout)
            .with_working_dir(settings.workspace_root.clone()),
    ))?;
    registry.register(Box::new(file_read::FileReadTool::new(sandbox.clone())))?;
    registry.register(Box::new(file_write::FileWriteTool::new(sandbox)))?;

    Ok(registry)
}

/// Deserialize tool input, mapping failures to `InvalidArguments`.
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
