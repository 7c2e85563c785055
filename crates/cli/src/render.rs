//! Terminal renderer.

use std::io::Write;

use augur_agent::{AgentEvent, NoticeLevel, Renderer};

/// Streams model text to stdout and tool/notice lines to stderr.
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    pub verbose: bool,
    /// Whether the cursor sits mid-line after streamed text
    mid_line: bool,
}

impl ConsoleRenderer {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            mid_line: false,
        }
    }

    fn break_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}

impl Renderer for ConsoleRenderer {
    fn emit(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::TextDelta { text } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
                self.mid_line = !text.ends_with('\n');
            }
            AgentEvent::ToolStarted { name, input, .. } => {
                self.break_line();
                if self.verbose {
                    eprintln!("  ⚙ {name} {input}");
                } else {
                    eprintln!("  ⚙ {name}");
                }
            }
            AgentEvent::ToolFinished { name, result, .. } => match result.error() {
                Some(error) => eprintln!("  ✗ {name}: {error}"),
                None => eprintln!("  ✓ {name} ({}ms)", result.meta.duration_ms),
            },
            AgentEvent::Notice { level, message } => {
                self.break_line();
                match level {
                    NoticeLevel::Info => println!("{message}"),
                    NoticeLevel::Warn => eprintln!("  [!] {message}"),
                    NoticeLevel::Error => eprintln!("  [Error] {message}"),
                }
            }
            AgentEvent::ClearScreen => {
                print!("\x1B[2J\x1B[H");
                let _ = std::io::stdout().flush();
                self.mid_line = false;
            }
            AgentEvent::TurnDone {
                iterations,
                tool_calls,
                usage,
            } => {
                self.break_line();
                if self.verbose {
                    eprintln!(
                        "  [{iterations} model calls, {tool_calls} tool calls, {} in / {} out tokens]",
                        usage.input_tokens, usage.output_tokens
                    );
                }
            }
        }
    }
}
