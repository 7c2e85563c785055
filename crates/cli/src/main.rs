//! Augur CLI: the main entry point.
//!
//! Commands:
//! - `chat`    Interactive chat, or a single message with `-m`
//! - `config`  Show the effective configuration
//! - `tools`   List the built-in tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod render;
mod runtime;

#[derive(Parser)]
#[command(
    name = "augur",
    about = "Augur: a prediction-market agent for the terminal",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output and debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.augur/config.toml
    #[arg(short, long, global = true, env = "AUGUR_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the market agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show the effective configuration (secrets redacted)
    Config,

    /// List the available tools
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs stay quiet by default so they do not interleave with streamed text.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = runtime::config_path(cli.config.as_deref());
    let config = runtime::load_config(&config_path)?;

    match cli.command.unwrap_or(Commands::Chat { message: None }) {
        Commands::Chat { message } => commands::chat::run(config, message, cli.verbose).await?,
        Commands::Config => commands::config_cmd::show(&config, &config_path)?,
        Commands::Tools => commands::tools::list(&config)?,
    }

    Ok(())
}
