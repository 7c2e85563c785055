//! `augur chat`: interactive REPL or single-message mode.

use std::io::Write;
use std::sync::Arc;

use augur_agent::{AgentEvent, Renderer, SlashContext, SlashOutcome};
use augur_config::AppConfig;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::render::ConsoleRenderer;
use crate::runtime;

/// Read stdin lines on a background task.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    rx
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

pub async fn run(config: AppConfig, message: Option<String>, verbose: bool) -> anyhow::Result<()> {
    // A missing key is fatal before any turn starts.
    let provider = runtime::build_provider(&config)?;
    let tools = Arc::new(runtime::build_registry(&config)?);
    let agent = runtime::build_agent(&config, provider, tools.clone());
    let slash = runtime::slash_commands(&config);
    let mut session = runtime::new_session(&config, verbose);
    let mut renderer = ConsoleRenderer::new(verbose);

    if let Some(msg) = message {
        let input = match slash
            .handle(
                &msg,
                SlashContext {
                    session: &mut session,
                    tools: &tools,
                    renderer: &mut renderer,
                },
            )
            .await
        {
            SlashOutcome::Handled | SlashOutcome::Exit => return Ok(()),
            SlashOutcome::Forwarded(prompt) => prompt,
            SlashOutcome::NotACommand => msg,
        };
        agent.run_turn(&mut session, &input, &mut renderer).await?;
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        Augur: prediction-market agent        ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", agent.provider_name());
    println!("  Model:     {}", session.model);
    println!("  Network:   {}", config.markets.network);
    println!("  Tools:     {}", tools.names().join(", "));
    println!();
    println!("  Type a message, or /help for commands. Ctrl+C to quit.");
    println!();

    let mut rx = spawn_stdin_reader();
    prompt()?;

    loop {
        let line = tokio::select! {
            line = rx.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        let input = match slash
            .handle(
                &line,
                SlashContext {
                    session: &mut session,
                    tools: &tools,
                    renderer: &mut renderer,
                },
            )
            .await
        {
            SlashOutcome::Exit => break,
            SlashOutcome::Handled => None,
            SlashOutcome::Forwarded(prompt) => Some(prompt),
            SlashOutcome::NotACommand => Some(line),
        };

        if let Some(input) = input {
            renderer.verbose = session.verbose;
            println!();
            // A Ctrl-C mid-turn ends the process; nothing is persisted.
            let result = tokio::select! {
                result = agent.run_turn(&mut session, &input, &mut renderer) => result,
                _ = tokio::signal::ctrl_c() => break,
            };
            if let Err(e) = result {
                renderer.emit(&AgentEvent::error(e.to_string()));
            }
            println!();
        }

        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
