//! Slash commands typed at the prompt.
//!
//! Every line goes through [`SlashCommands::handle`] before the model sees
//! it. A command either runs locally (`Handled`/`Exit`), calls one tool
//! directly without touching the history, or rewrites itself into a prompt
//! for the model (`Forwarded`). Anything not starting with `/` is
//! `NotACommand` and goes to the model unchanged.

use augur_core::tool::ToolRegistry;
use serde_json::{Value, json};
use tracing::debug;

use crate::session::Session;
use crate::stream_event::{AgentEvent, Renderer};

const DEFAULT_GENERATE_TOPIC: &str = "crypto, technology and world events";
const DEFAULT_NEWS_TOPIC: &str = "today's top stories";

/// A recognized command and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum SlashCommand {
    Help,
    Config,
    Clear,
    Exit,
    Verbose,
    Tools,
    Create { question: String },
    List,
    Stats,
    Score { headline: String },
    Buy { market_id: String, outcome: String, amount_usdc: f64 },
    Sell { market_id: String, outcome: String, shares: f64 },
    Generate { topic: Option<String> },
    News { topic: Option<String> },
}

/// Result of parsing one input line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedInput {
    NotACommand,
    Command(SlashCommand),
    /// Required arguments were missing or unparsable.
    Usage { usage: &'static str },
    Unknown(String),
}

/// What the caller should do after a line was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashOutcome {
    /// Done locally; nothing goes to the model.
    Handled,
    /// Done locally, and the session should end.
    Exit,
    /// Send this prompt to the model instead of the raw line.
    Forwarded(String),
    /// Not a command; send the raw line to the model.
    NotACommand,
}

const CREATE_USAGE: &str = "/create <question>";
const SCORE_USAGE: &str = "/score <headline>";
const BUY_USAGE: &str = "/buy <market-id> <yes|no> <usdc>";
const SELL_USAGE: &str = "/sell <market-id> <yes|no> <shares>";

/// Parse a line. Pure; no side effects.
pub fn parse_command(input: &str) -> ParsedInput {
    let trimmed = input.trim();
    let Some(slashless) = trimmed.strip_prefix('/') else {
        return ParsedInput::NotACommand;
    };
    if slashless.is_empty() {
        return ParsedInput::Unknown("/".to_string());
    }

    let mut parts = slashless.splitn(2, char::is_whitespace);
    let command = parts
        .next()
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();
    let topic = (!arg.is_empty()).then(|| arg.to_string());

    let command = match command.as_str() {
        "help" | "?" => SlashCommand::Help,
        "config" => SlashCommand::Config,
        "clear" => SlashCommand::Clear,
        "exit" | "quit" => SlashCommand::Exit,
        "verbose" => SlashCommand::Verbose,
        "tools" => SlashCommand::Tools,
        "list" => SlashCommand::List,
        "stats" => SlashCommand::Stats,
        "generate" => SlashCommand::Generate { topic },
        "news" => SlashCommand::News { topic },
        "create" if arg.is_empty() => return ParsedInput::Usage { usage: CREATE_USAGE },
        "create" => SlashCommand::Create {
            question: arg.to_string(),
        },
        "score" if arg.is_empty() => return ParsedInput::Usage { usage: SCORE_USAGE },
        "score" => SlashCommand::Score {
            headline: arg.to_string(),
        },
        "buy" => match trade_args(arg) {
            Some((market_id, outcome, amount_usdc)) => SlashCommand::Buy {
                market_id,
                outcome,
                amount_usdc,
            },
            None => return ParsedInput::Usage { usage: BUY_USAGE },
        },
        "sell" => match trade_args(arg) {
            Some((market_id, outcome, shares)) => SlashCommand::Sell {
                market_id,
                outcome,
                shares,
            },
            None => return ParsedInput::Usage { usage: SELL_USAGE },
        },
        other => return ParsedInput::Unknown(format!("/{other}")),
    };
    ParsedInput::Command(command)
}

fn trade_args(arg: &str) -> Option<(String, String, f64)> {
    let mut it = arg.split_whitespace();
    let market_id = it.next()?.to_string();
    let outcome = it.next()?.to_string();
    let amount = it.next()?.parse::<f64>().ok()?;
    if it.next().is_some() {
        return None;
    }
    Some((market_id, outcome, amount))
}

pub fn help_text() -> &'static str {
    "Commands:
  /help                              show this list
  /config                            show model, tools and session info
  /clear                             clear the conversation and the screen
  /verbose                           toggle verbose output
  /tools                             list available tools
  /create <question>                 create a market directly
  /list                              list markets
  /stats                             platform statistics
  /score <headline>                  score a headline for market potential
  /buy <market-id> <yes|no> <usdc>   buy shares
  /sell <market-id> <yes|no> <n>     sell shares
  /generate [topic]                  ask the agent for market ideas
  /news [topic]                      ask the agent to score current headlines
  /exit, /quit                       leave

Anything else is sent to the agent as a message."
}

/// What a command may touch.
pub struct SlashContext<'a> {
    pub session: &'a mut Session,
    pub tools: &'a ToolRegistry,
    pub renderer: &'a mut dyn Renderer,
}

/// Executes parsed commands.
#[derive(Debug, Clone)]
pub struct SlashCommands {
    default_duration_days: u32,
    default_liquidity_usdc: f64,
}

impl Default for SlashCommands {
    fn default() -> Self {
        Self::new(30, 1.0)
    }
}

impl SlashCommands {
    pub fn new(default_duration_days: u32, default_liquidity_usdc: f64) -> Self {
        Self {
            default_duration_days,
            default_liquidity_usdc,
        }
    }

    pub async fn handle(&self, raw: &str, ctx: SlashContext<'_>) -> SlashOutcome {
        let command = match parse_command(raw) {
            ParsedInput::NotACommand => return SlashOutcome::NotACommand,
            ParsedInput::Command(command) => command,
            ParsedInput::Usage { usage } => {
                ctx.renderer.emit(&AgentEvent::warn(format!("Usage: {usage}")));
                return SlashOutcome::Handled;
            }
            ParsedInput::Unknown(name) => {
                ctx.renderer.emit(&AgentEvent::warn(format!(
                    "Unknown command {name}. Type /help for the list."
                )));
                return SlashOutcome::Handled;
            }
        };
        debug!(command = ?command, "Slash command");

        let SlashContext {
            session,
            tools,
            renderer,
        } = ctx;

        match command {
            SlashCommand::Help => renderer.emit(&AgentEvent::info(help_text())),
            SlashCommand::Config => renderer.emit(&AgentEvent::info(describe(session, tools))),
            SlashCommand::Clear => {
                session.clear();
                renderer.emit(&AgentEvent::ClearScreen);
                renderer.emit(&AgentEvent::info("Conversation cleared."));
            }
            SlashCommand::Exit => return SlashOutcome::Exit,
            SlashCommand::Verbose => {
                session.verbose = !session.verbose;
                let state = if session.verbose { "on" } else { "off" };
                renderer.emit(&AgentEvent::info(format!("Verbose output {state}.")));
            }
            SlashCommand::Tools => {
                let listing = tools
                    .definitions()
                    .iter()
                    .map(|d| format!("  {:<16} {}", d.name, d.description))
                    .collect::<Vec<_>>()
                    .join("\n");
                renderer.emit(&AgentEvent::info(format!("Tools:\n{listing}")));
            }
            SlashCommand::Create { question } => {
                let input = json!({
                    "question": question,
                    "durationDays": self.default_duration_days,
                    "liquidityUsdc": whole_or_fraction(self.default_liquidity_usdc),
                });
                direct(tools, renderer, "create_market", input).await;
            }
            SlashCommand::List => direct(tools, renderer, "list_markets", json!({})).await,
            SlashCommand::Stats => direct(tools, renderer, "market_stats", json!({})).await,
            SlashCommand::Score { headline } => {
                direct(tools, renderer, "score_news", json!({ "headline": headline })).await;
            }
            SlashCommand::Buy {
                market_id,
                outcome,
                amount_usdc,
            } => {
                let input = json!({
                    "marketId": market_id,
                    "outcome": outcome,
                    "amountUsdc": amount_usdc,
                });
                direct(tools, renderer, "buy_shares", input).await;
            }
            SlashCommand::Sell {
                market_id,
                outcome,
                shares,
            } => {
                let input = json!({
                    "marketId": market_id,
                    "outcome": outcome,
                    "shares": shares,
                });
                direct(tools, renderer, "sell_shares", input).await;
            }
            SlashCommand::Generate { topic } => {
                let topic = topic.as_deref().unwrap_or(DEFAULT_GENERATE_TOPIC);
                return SlashOutcome::Forwarded(format!(
                    "Suggest 5 prediction market ideas about {topic}. For each, give a clear \
                     yes/no question, a resolution date, and why traders would care. \
                     Do not create any market until I confirm."
                ));
            }
            SlashCommand::News { topic } => {
                let topic = topic.as_deref().unwrap_or(DEFAULT_NEWS_TOPIC);
                return SlashOutcome::Forwarded(format!(
                    "Take 5 recent news headlines about {topic}, score each one with the \
                     score_news tool, and recommend the best one as a market question."
                ));
            }
        }
        SlashOutcome::Handled
    }
}

/// `1.0` goes out as `1`; fractional amounts stay as they are.
fn whole_or_fraction(amount: f64) -> Value {
    if amount.fract() == 0.0 && amount.abs() < i64::MAX as f64 {
        json!(amount as i64)
    } else {
        json!(amount)
    }
}

/// Call one tool outside the conversation and show its envelope.
async fn direct(tools: &ToolRegistry, renderer: &mut dyn Renderer, name: &str, input: Value) {
    let id = format!("slash-{name}");
    renderer.emit(&AgentEvent::ToolStarted {
        id: id.clone(),
        name: name.to_string(),
        input: input.clone(),
    });
    let result = tools.execute(name, input).await;
    let pretty = serde_json::to_string_pretty(&result.to_json()).unwrap_or_else(|_| result.to_content());
    renderer.emit(&AgentEvent::ToolFinished {
        id,
        name: name.to_string(),
        result,
    });
    renderer.emit(&AgentEvent::info(pretty));
}

fn describe(session: &Session, tools: &ToolRegistry) -> String {
    format!(
        "Model:    {}\nTools:    {} ({})\nVerbose:  {}\nHistory:  {} messages\nTokens:   {} in / {} out\nSession:  {}",
        session.model,
        tools.len(),
        tools.names().join(", "),
        if session.verbose { "on" } else { "off" },
        session.history().len(),
        session.usage.input_tokens,
        session.usage.output_tokens,
        session.id,
    )
}
