//! Reassembly of a streamed model response into one assistant message.
//!
//! [`TurnAccumulator`] is a reducer: feed it every [`StreamEvent`] of one
//! model call with [`TurnAccumulator::apply`], then call
//! [`TurnAccumulator::finish`]. Text fragments come back out of `apply` as
//! they arrive so the caller can render them before the next event. Tool
//! input is buffered and parsed once, when its block closes.

use augur_core::error::ProviderError;
use augur_core::message::{ContentBlock, Message, Role};
use augur_core::provider::{BlockDelta, BlockKind, StopReason, StreamEvent, Usage};
use serde_json::Value;

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    /// The parsed input, or why it could not be parsed.
    pub input: Result<Value, String>,
}

/// How a model call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStop {
    /// The model answered; nothing left to dispatch.
    Done,
    /// The model asked for tools and waits for their results.
    PendingTools,
}

/// The outcome of one model call.
#[derive(Debug, Clone)]
pub struct FinalizedTurn {
    /// Assistant message: one merged text block (if any text), then the
    /// tool-use blocks in the order they were emitted.
    pub message: Message,
    pub tool_requests: Vec<ToolRequest>,
    pub usage: Usage,
    pub stop_reason: Option<StopReason>,
    pub stop: TurnStop,
}

impl FinalizedTurn {
    pub fn text(&self) -> String {
        self.message.text()
    }
}

#[derive(Debug)]
enum OpenBlock {
    Text,
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
}

#[derive(Debug, Default)]
pub struct TurnAccumulator {
    text: String,
    open: Option<OpenBlock>,
    requests: Vec<ToolRequest>,
    usage: Usage,
    stop_reason: Option<StopReason>,
    stopped: bool,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event in. Returns the text to render, if any.
    pub fn apply(&mut self, event: StreamEvent) -> Result<Option<String>, ProviderError> {
        if self.stopped {
            return Err(violation("event after message stop"));
        }

        match event {
            StreamEvent::BlockStart { kind } => {
                if self.open.is_some() {
                    return Err(violation("block started while another is open"));
                }
                self.open = Some(match kind {
                    BlockKind::Text => OpenBlock::Text,
                    BlockKind::ToolUse { id, name } => OpenBlock::ToolUse {
                        id,
                        name,
                        input_json: String::new(),
                    },
                });
                Ok(None)
            }
            StreamEvent::BlockDelta { delta } => match (&mut self.open, delta) {
                (Some(OpenBlock::Text), BlockDelta::Text(fragment)) => {
                    self.text.push_str(&fragment);
                    Ok(Some(fragment))
                }
                (Some(OpenBlock::ToolUse { input_json, .. }), BlockDelta::InputJson(fragment)) => {
                    input_json.push_str(&fragment);
                    Ok(None)
                }
                (None, _) => Err(violation("delta without an open block")),
                (Some(_), _) => Err(violation("delta does not match the open block")),
            },
            StreamEvent::BlockStop => {
                let block = self
                    .open
                    .take()
                    .ok_or_else(|| violation("block stop without an open block"))?;
                self.close(block);
                Ok(None)
            }
            StreamEvent::Usage { usage } => {
                self.usage.add(usage);
                Ok(None)
            }
            StreamEvent::MessageStop { stop_reason } => {
                self.stop_reason = stop_reason;
                self.stopped = true;
                Ok(None)
            }
        }
    }

    fn close(&mut self, block: OpenBlock) {
        if let OpenBlock::ToolUse {
            id,
            name,
            input_json,
        } = block
        {
            let input = parse_tool_input(&input_json);
            self.requests.push(ToolRequest { id, name, input });
        }
    }

    /// Finalize the turn. A block still open at this point is closed first.
    pub fn finish(mut self) -> FinalizedTurn {
        if let Some(block) = self.open.take() {
            self.close(block);
        }

        let mut content = Vec::with_capacity(self.requests.len() + 1);
        if !self.text.is_empty() {
            content.push(ContentBlock::text(self.text));
        }
        content.extend(self.requests.iter().map(|r| ContentBlock::ToolUse {
            id: r.id.clone(),
            name: r.name.clone(),
            input: r
                .input
                .clone()
                .unwrap_or_else(|_| Value::Object(Default::default())),
        }));

        let stop = if self.requests.is_empty() {
            TurnStop::Done
        } else {
            TurnStop::PendingTools
        };

        FinalizedTurn {
            message: Message::new(Role::Assistant, content),
            tool_requests: self.requests,
            usage: self.usage,
            stop_reason: self.stop_reason,
            stop,
        }
    }
}

fn parse_tool_input(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| format!("Malformed tool input: {e}"))
}

fn violation(what: &str) -> ProviderError {
    ProviderError::StreamInterrupted(format!("protocol violation: {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(events: Vec<StreamEvent>) -> (Vec<String>, FinalizedTurn) {
        let mut acc = TurnAccumulator::new();
        let mut rendered = Vec::new();
        for event in events {
            if let Some(text) = acc.apply(event).unwrap() {
                rendered.push(text);
            }
        }
        (rendered, acc.finish())
    }

    #[test]
    fn text_is_emitted_in_arrival_order() {
        let (rendered, turn) = feed(vec![
            StreamEvent::text_start(),
            StreamEvent::text("Hel"),
            StreamEvent::text("lo"),
            StreamEvent::BlockStop,
            StreamEvent::MessageStop {
                stop_reason: Some(StopReason::EndTurn),
            },
        ]);
        assert_eq!(rendered, vec!["Hel", "lo"]);
        assert_eq!(turn.text(), "Hello");
        assert_eq!(turn.stop, TurnStop::Done);
        assert!(turn.tool_requests.is_empty());
    }

    #[test]
    fn fragmented_tool_input_becomes_one_tool_use() {
        let (_, turn) = feed(vec![
            StreamEvent::tool_start("toolu_1", "score_news"),
            StreamEvent::input_json("{\"head"),
            StreamEvent::input_json("line\":"),
            StreamEvent::input_json("\"A\"}"),
            StreamEvent::BlockStop,
        ]);
        assert_eq!(turn.stop, TurnStop::PendingTools);
        assert_eq!(turn.tool_requests.len(), 1);
        assert_eq!(turn.tool_requests[0].input, Ok(json!({"headline": "A"})));
        assert_eq!(
            turn.message.content,
            vec![ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "score_news".into(),
                input: json!({"headline": "A"}),
            }]
        );
    }

    #[test]
    fn empty_tool_input_is_empty_object() {
        let (_, turn) = feed(vec![
            StreamEvent::tool_start("toolu_1", "market_stats"),
            StreamEvent::BlockStop,
        ]);
        assert_eq!(turn.tool_requests[0].input, Ok(json!({})));
    }

    #[test]
    fn malformed_input_is_kept_with_error() {
        let (_, turn) = feed(vec![
            StreamEvent::tool_start("toolu_1", "create_market"),
            StreamEvent::input_json("{\"question\": "),
            StreamEvent::BlockStop,
        ]);
        let request = &turn.tool_requests[0];
        assert!(request.input.as_ref().unwrap_err().contains("Malformed"));
        assert_eq!(
            turn.message.content[0],
            ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "create_market".into(),
                input: json!({}),
            }
        );
    }

    #[test]
    fn text_is_merged_ahead_of_tool_uses() {
        let (_, turn) = feed(vec![
            StreamEvent::text_start(),
            StreamEvent::text("Let me check. "),
            StreamEvent::BlockStop,
            StreamEvent::tool_start("a", "list_markets"),
            StreamEvent::BlockStop,
            StreamEvent::text_start(),
            StreamEvent::text("And stats."),
            StreamEvent::BlockStop,
            StreamEvent::tool_start("b", "market_stats"),
            StreamEvent::BlockStop,
        ]);
        assert_eq!(turn.message.content.len(), 3);
        assert_eq!(
            turn.message.content[0],
            ContentBlock::text("Let me check. And stats.")
        );
        assert_eq!(turn.message.tool_use_ids(), vec!["a", "b"]);
    }

    #[test]
    fn open_block_is_finalized_at_finish() {
        let (_, turn) = feed(vec![
            StreamEvent::tool_start("toolu_1", "score_news"),
            StreamEvent::input_json("{\"headline\":\"B\"}"),
        ]);
        assert_eq!(turn.tool_requests[0].input, Ok(json!({"headline": "B"})));
    }

    #[test]
    fn usage_accumulates() {
        let (_, turn) = feed(vec![
            StreamEvent::Usage {
                usage: Usage {
                    input_tokens: 12,
                    output_tokens: 0,
                },
            },
            StreamEvent::Usage {
                usage: Usage {
                    input_tokens: 0,
                    output_tokens: 7,
                },
            },
        ]);
        assert_eq!(turn.usage.total(), 19);
    }

    #[test]
    fn protocol_violations_are_errors() {
        let mut acc = TurnAccumulator::new();
        assert!(matches!(
            acc.apply(StreamEvent::text("orphan")),
            Err(ProviderError::StreamInterrupted(_))
        ));

        let mut acc = TurnAccumulator::new();
        acc.apply(StreamEvent::text_start()).unwrap();
        assert!(acc.apply(StreamEvent::input_json("{}")).is_err());

        let mut acc = TurnAccumulator::new();
        assert!(acc.apply(StreamEvent::BlockStop).is_err());
    }
}
