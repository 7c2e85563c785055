//! Wiring from configuration to a running agent.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use augur_agent::{AgentLoop, RetryPolicy, Session, SlashCommands};
use augur_config::AppConfig;
use augur_core::event::EventBus;
use augur_core::provider::Provider;
use augur_core::tool::ToolRegistry;
use augur_providers::AnthropicProvider;
use augur_tools::market::PaperMarket;
use augur_tools::news::ScoreCache;
use augur_tools::{ToolSettings, default_registry};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Augur, an assistant for creating and trading \
prediction markets. Use the market tools to create, list, inspect and trade markets, and \
score_news to judge whether a headline would make a good market. Market questions must be \
yes/no, unambiguous, and resolvable by a specific date. Before spending funds (creating a \
market or trading), state what you are about to do. Keep answers short.";

/// The config file in effect: `--config` if given, else the default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(AppConfig::default_path, Path::to_path_buf)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    AppConfig::load_with_env(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

pub fn tool_settings(config: &AppConfig) -> ToolSettings {
    ToolSettings {
        shell_allowed_commands: config.tools.shell_allowed_commands.clone(),
        shell_timeout: Duration::from_secs(config.tools.shell_timeout_secs),
        workspace_root: config.tools.workspace_root.clone(),
        forbidden_paths: config.tools.forbidden_paths.clone(),
        default_duration_days: config.markets.default_duration_days,
        default_liquidity_usdc: config.markets.default_liquidity_usdc,
    }
}

pub fn build_registry(config: &AppConfig) -> anyhow::Result<ToolRegistry> {
    let market = Arc::new(PaperMarket::with_network(config.markets.network.clone()));
    default_registry(&tool_settings(config), market, ScoreCache::new())
        .context("Failed to register tools")
}

pub fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let Some(api_key) = config.api_key.as_deref() else {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export ANTHROPIC_API_KEY='sk-ant-...'");
        eprintln!("    export AUGUR_API_KEY='sk-ant-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::default_path().display());
        eprintln!();
        bail!("No API key found. See above for setup instructions.");
    };

    let mut provider = AnthropicProvider::new(api_key);
    if let Some(url) = &config.api_url {
        provider = provider.with_base_url(url.clone());
    }
    Ok(Arc::new(provider))
}

pub fn build_agent(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
) -> AgentLoop {
    AgentLoop::new(provider, tools, Arc::new(EventBus::default()))
        .with_retry(RetryPolicy {
            cooldown: Duration::from_secs(config.retry.cooldown_secs),
            max_retries: config.retry.max_attempts,
        })
        .with_max_iterations(config.agent.max_iterations)
        .with_max_tokens(config.max_tokens)
        .with_temperature(config.temperature)
}

pub fn new_session(config: &AppConfig, verbose: bool) -> Session {
    let prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    Session::new(config.model.clone(), prompt).with_verbose(verbose)
}

pub fn slash_commands(config: &AppConfig) -> SlashCommands {
    SlashCommands::new(
        config.markets.default_duration_days,
        config.markets.default_liquidity_usdc,
    )
}
