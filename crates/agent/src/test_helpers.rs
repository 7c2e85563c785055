//! Shared test helpers: a scripted streaming provider and stock replies.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use augur_core::error::ProviderError;
use augur_core::provider::{EventStream, Provider, ProviderRequest, StopReason, StreamEvent, Usage};
use serde_json::Value;
use tokio::sync::mpsc;

/// One scripted answer to a `stream` call.
pub enum Script {
    /// Stream these events, then close.
    Events(Vec<StreamEvent>),
    /// Fail before streaming anything.
    Fail(ProviderError),
    /// Stream some events, then fail in-band.
    FailMidStream(Vec<StreamEvent>, ProviderError),
}

/// A provider that answers each call with the next script in the queue.
///
/// Panics if more calls are made than scripts provided. Every request is
/// recorded so tests can inspect what the loop sent.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<EventStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();

        let (events, tail) = match script {
            Some(Script::Events(events)) => (events, None),
            Some(Script::Fail(e)) => return Err(e),
            Some(Script::FailMidStream(events, e)) => (events, Some(e)),
            None => panic!(
                "ScriptedProvider: no more scripts (call #{})",
                self.call_count()
            ),
        };

        let (tx, rx) = mpsc::channel(events.len() + 1);
        for event in events {
            tx.try_send(Ok(event)).unwrap();
        }
        if let Some(e) = tail {
            tx.try_send(Err(e)).unwrap();
        }
        Ok(rx)
    }
}

fn usage() -> StreamEvent {
    StreamEvent::Usage {
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
    }
}

/// A plain text answer.
pub fn text_reply(text: &str) -> Script {
    Script::Events(vec![
        usage(),
        StreamEvent::text_start(),
        StreamEvent::text(text),
        StreamEvent::BlockStop,
        StreamEvent::MessageStop {
            stop_reason: Some(StopReason::EndTurn),
        },
    ])
}

/// An answer asking for tools: `(id, name, input)`.
pub fn tool_reply(calls: &[(&str, &str, Value)]) -> Script {
    let mut events = vec![usage()];
    for (id, name, input) in calls {
        events.push(StreamEvent::tool_start(*id, *name));
        events.push(StreamEvent::input_json(input.to_string()));
        events.push(StreamEvent::BlockStop);
    }
    events.push(StreamEvent::MessageStop {
        stop_reason: Some(StopReason::ToolUse),
    });
    Script::Events(events)
}

pub fn rate_limited() -> Script {
    Script::Fail(ProviderError::RateLimited {
        retry_after_secs: 5,
    })
}
