//! The conversation loop implementation.

use std::sync::Arc;
use std::time::Duration;

use augur_core::error::{Error, ProviderError};
use augur_core::event::{DomainEvent, EventBus};
use augur_core::message::{ContentBlock, Message, Role};
use augur_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use augur_core::tool::{ToolInvocationResult, ToolRegistry};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::session::Session;
use crate::stream::{FinalizedTurn, ToolRequest, TurnAccumulator, TurnStop};
use crate::stream_event::{AgentEvent, Renderer};

/// Appended as the assistant's answer when a turn hits the iteration ceiling.
pub const ITERATION_LIMIT_NOTICE: &str =
    "I've reached the maximum number of tool call iterations for this request. Please provide further guidance.";

/// How throttled model calls are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed pause before each retry
    pub cooldown: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// Summary of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text of the final assistant message
    pub text: String,
    /// Model calls made, retries excluded
    pub iterations: u32,
    pub tool_calls: usize,
    pub usage: Usage,
    pub hit_iteration_limit: bool,
}

enum TurnState {
    Idle,
    AwaitingModel,
    DispatchingTools(Vec<ToolRequest>),
    Finished { text: String, hit_limit: bool },
}

/// The loop that drives a session: model call, tool dispatch, repeat.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    retry: RetryPolicy,
    max_iterations: u32,
    max_tokens: u32,
    temperature: f32,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            tools,
            event_bus,
            retry: RetryPolicy::default(),
            max_iterations: 25,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one user turn to completion.
    ///
    /// On error the turn's messages are removed again, so the session is
    /// left exactly as it was before the call and stays usable.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome, Error> {
        info!(session_id = %session.id, "Processing turn");
        let checkpoint = session.history().len();

        match self.drive(session, input, renderer).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Turn aborted");
                session.truncate(checkpoint);
                self.event_bus.publish(DomainEvent::TurnFailed {
                    session_id: session.id.to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e.into())
            }
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome, ProviderError> {
        let definitions = self.tools.definitions();
        let mut iterations = 0u32;
        let mut tool_calls = 0usize;
        let mut usage = Usage::default();
        let mut state = TurnState::Idle;

        loop {
            state = match state {
                TurnState::Idle => {
                    session.push(Message::user(input));
                    TurnState::AwaitingModel
                }
                TurnState::AwaitingModel if iterations >= self.max_iterations => {
                    warn!(
                        session_id = %session.id,
                        iterations,
                        "Max tool iterations reached"
                    );
                    session.push(Message::assistant(ITERATION_LIMIT_NOTICE));
                    renderer.emit(&AgentEvent::warn(ITERATION_LIMIT_NOTICE));
                    TurnState::Finished {
                        text: ITERATION_LIMIT_NOTICE.to_string(),
                        hit_limit: true,
                    }
                }
                TurnState::AwaitingModel => {
                    iterations += 1;
                    debug!(session_id = %session.id, iteration = iterations, "Agent loop iteration");

                    let turn = self.call_model(session, &definitions, renderer).await?;
                    usage.add(turn.usage);
                    session.usage.add(turn.usage);
                    self.event_bus.publish(DomainEvent::ResponseGenerated {
                        session_id: session.id.to_string(),
                        model: session.model.clone(),
                        tokens_used: turn.usage.total(),
                        timestamp: Utc::now(),
                    });

                    let text = turn.text();
                    let FinalizedTurn {
                        message,
                        tool_requests,
                        stop,
                        ..
                    } = turn;
                    session.push(message);

                    match stop {
                        TurnStop::Done => TurnState::Finished {
                            text,
                            hit_limit: false,
                        },
                        TurnStop::PendingTools => TurnState::DispatchingTools(tool_requests),
                    }
                }
                TurnState::DispatchingTools(requests) => {
                    debug!(tool_count = requests.len(), "Executing tool calls");
                    let mut results = Vec::with_capacity(requests.len());
                    for request in requests {
                        tool_calls += 1;
                        let id = request.id.clone();
                        let result = self.dispatch(request, renderer).await;
                        results.push(ContentBlock::tool_result(id, result.to_content()));
                    }
                    session.push(Message::new(Role::User, results));
                    TurnState::AwaitingModel
                }
                TurnState::Finished { text, hit_limit } => {
                    renderer.emit(&AgentEvent::TurnDone {
                        iterations,
                        tool_calls,
                        usage,
                    });
                    return Ok(TurnOutcome {
                        text,
                        iterations,
                        tool_calls,
                        usage,
                        hit_iteration_limit: hit_limit,
                    });
                }
            };
        }
    }

    fn request(&self, session: &Session, tools: &[ToolDefinition]) -> ProviderRequest {
        ProviderRequest {
            model: session.model.clone(),
            system: session.system_prompt.clone(),
            messages: session.history().to_vec(),
            tools: tools.to_vec(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// One model call, retried on throttling with a fixed cooldown.
    async fn call_model(
        &self,
        session: &Session,
        tools: &[ToolDefinition],
        renderer: &mut dyn Renderer,
    ) -> Result<FinalizedTurn, ProviderError> {
        let mut attempt = 0u32;
        loop {
            let mut rendered = false;
            match self
                .stream_once(self.request(session, tools), renderer, &mut rendered)
                .await
            {
                Err(e) if e.is_rate_limited() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    if rendered {
                        // The retry streams the answer again from the start.
                        renderer.emit(&AgentEvent::warn("Partial response discarded"));
                    }
                    let cooldown = self.retry.cooldown.as_secs();
                    warn!(attempt, cooldown_secs = cooldown, "Provider throttled, retrying");
                    self.event_bus.publish(DomainEvent::ProviderThrottled {
                        attempt,
                        cooldown_secs: cooldown,
                        timestamp: Utc::now(),
                    });
                    renderer.emit(&AgentEvent::warn(format!(
                        "Rate limited. Retrying in {cooldown}s (attempt {attempt}/{})",
                        self.retry.max_retries
                    )));
                    tokio::time::sleep(self.retry.cooldown).await;
                }
                other => return other,
            }
        }
    }

    /// Stream one model response; `rendered` records whether any text
    /// reached the renderer, even if the stream later fails.
    async fn stream_once(
        &self,
        request: ProviderRequest,
        renderer: &mut dyn Renderer,
        rendered: &mut bool,
    ) -> Result<FinalizedTurn, ProviderError> {
        let mut events = self.provider.stream(request).await?;
        let mut accumulator = TurnAccumulator::new();
        while let Some(event) = events.recv().await {
            if let Some(text) = accumulator.apply(event?)? {
                *rendered = true;
                renderer.emit(&AgentEvent::TextDelta { text });
            }
        }
        Ok(accumulator.finish())
    }

    async fn dispatch(
        &self,
        request: ToolRequest,
        renderer: &mut dyn Renderer,
    ) -> ToolInvocationResult {
        let ToolRequest { id, name, input } = request;

        let result = match input {
            Ok(input) => {
                renderer.emit(&AgentEvent::ToolStarted {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
                self.tools.execute(&name, input).await
            }
            Err(reason) => {
                warn!(tool = %name, reason = %reason, "Rejecting tool call with malformed input");
                renderer.emit(&AgentEvent::ToolStarted {
                    id: id.clone(),
                    name: name.clone(),
                    input: Value::Object(Default::default()),
                });
                ToolInvocationResult::rejected(&name, reason, 0)
            }
        };

        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: name.clone(),
            success: !result.is_error(),
            duration_ms: result.meta.duration_ms,
            timestamp: Utc::now(),
        });
        renderer.emit(&AgentEvent::ToolFinished {
            id,
            name,
            result: result.clone(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_event::RecordingRenderer;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use augur_core::error::ToolError;
    use augur_core::provider::StreamEvent;
    use augur_core::tool::Tool;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes the headline"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"headline": {"type": "string"}}})
        }
        async fn execute(&self, input: Value) -> Result<Value, ToolError> {
            match input.get("headline") {
                Some(h) => Ok(json!({ "echo": h })),
                None => Err(ToolError::InvalidArguments("Missing 'headline'".into())),
            }
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "explode"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
            panic!("tool blew up")
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register(Box::new(PanicTool)).unwrap();
        Arc::new(registry)
    }

    fn agent(provider: Arc<ScriptedProvider>) -> AgentLoop {
        AgentLoop::new(provider, registry(), Arc::new(EventBus::default()))
    }

    fn session() -> Session {
        Session::new("mock-model", "You are a market assistant.")
    }

    /// Every ToolUse is answered by exactly one ToolResult, in the next message.
    fn assert_tool_pairing(history: &[Message]) {
        for (i, message) in history.iter().enumerate() {
            let uses = message.tool_use_ids();
            if uses.is_empty() {
                continue;
            }
            let next = history.get(i + 1).expect("tool use without a following message");
            assert_eq!(next.role, Role::User);
            assert_eq!(next.tool_result_ids(), uses);
        }
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("Hello! How can I help?")]));
        let agent = agent(provider.clone());
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        let outcome = agent
            .run_turn(&mut session, "Hello!", &mut renderer)
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello! How can I help?");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(session.history().len(), 2);
        assert_eq!(renderer.text(), "Hello! How can I help?");
        assert_eq!(renderer.event_types().last(), Some(&"turn_done"));

        let request = &provider.requests()[0];
        assert_eq!(request.system, "You are a market assistant.");
        assert_eq!(request.tools.len(), 2);
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn tool_round_trip_pairs_every_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply(&[
                ("toolu_1", "echo", json!({"headline": "A"})),
                ("toolu_2", "echo", json!({"headline": "B"})),
            ]),
            text_reply("Both scored."),
        ]));
        let agent = agent(provider.clone());
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        let outcome = agent
            .run_turn(&mut session, "score A and B", &mut renderer)
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(outcome.iterations, 2);
        // user, assistant(tool_use x2), user(tool_result x2), assistant
        assert_eq!(session.history().len(), 4);
        assert_tool_pairing(session.history());

        let ContentBlock::ToolResult { content, .. } = &session.history()[2].content[0] else {
            panic!("expected a tool result");
        };
        let envelope: Value = serde_json::from_str(content).unwrap();
        assert_eq!(envelope["echo"], "A");
        assert_eq!(envelope["_meta"]["tool"], "echo");

        // The second model call sees the tool results.
        assert_eq!(provider.requests()[1].messages.len(), 3);

        assert_eq!(
            renderer.event_types(),
            vec![
                "tool_started",
                "tool_finished",
                "tool_started",
                "tool_finished",
                "text_delta",
                "turn_done"
            ]
        );
    }

    #[tokio::test]
    async fn fragmented_input_reaches_tool_as_one_object() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Script::Events(vec![
                StreamEvent::tool_start("toolu_1", "echo"),
                StreamEvent::input_json("{\"head"),
                StreamEvent::input_json("line\": \"A\"}"),
                StreamEvent::BlockStop,
                StreamEvent::MessageStop { stop_reason: None },
            ]),
            text_reply("done"),
        ]));
        let agent = agent(provider);
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        agent.run_turn(&mut session, "go", &mut renderer).await.unwrap();

        assert_eq!(
            session.history()[1].content,
            vec![ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "echo".into(),
                input: json!({"headline": "A"}),
            }]
        );
    }

    #[tokio::test]
    async fn unknown_tool_and_panics_are_data() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply(&[
                ("a", "does_not_exist", json!({})),
                ("b", "explode", json!({})),
                ("c", "echo", json!({})),
            ]),
            text_reply("recovered"),
        ]));
        let agent = agent(provider);
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        let outcome = agent
            .run_turn(&mut session, "try things", &mut renderer)
            .await
            .unwrap();
        assert_eq!(outcome.text, "recovered");
        assert_tool_pairing(session.history());

        let envelopes: Vec<Value> = session.history()[2]
            .content
            .iter()
            .map(|b| match b {
                ContentBlock::ToolResult { content, .. } => serde_json::from_str(content).unwrap(),
                other => panic!("unexpected block {other:?}"),
            })
            .collect();

        assert!(envelopes[0]["error"].as_str().unwrap().contains("Unknown tool"));
        assert_eq!(envelopes[0]["availableTools"], json!(["echo", "explode"]));
        assert!(envelopes[1]["error"].as_str().unwrap().contains("tool blew up"));
        assert!(envelopes[2]["error"].as_str().unwrap().contains("Missing 'headline'"));
        for envelope in &envelopes {
            assert!(envelope.get("echo").is_none());
            assert!(envelope["_meta"]["durationMs"].as_u64().is_some());
        }
    }

    #[tokio::test]
    async fn malformed_input_never_reaches_the_tool() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Script::Events(vec![
                StreamEvent::tool_start("toolu_1", "explode"),
                StreamEvent::input_json("{not json"),
                StreamEvent::BlockStop,
            ]),
            text_reply("sorry"),
        ]));
        let agent = agent(provider);
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        agent.run_turn(&mut session, "go", &mut renderer).await.unwrap();

        let ContentBlock::ToolResult { content, .. } = &session.history()[2].content[0] else {
            panic!("expected a tool result");
        };
        let envelope: Value = serde_json::from_str(content).unwrap();
        // The panicking tool would have said "tool blew up".
        assert!(envelope["error"].as_str().unwrap().contains("Malformed tool input"));
        assert_eq!(envelope["_meta"]["tool"], "explode");
        assert_tool_pairing(session.history());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_same_history() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            rate_limited(),
            rate_limited(),
            text_reply("finally"),
        ]));
        let agent = agent(provider.clone()).with_retry(RetryPolicy {
            cooldown: Duration::from_secs(30),
            max_retries: 3,
        });
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        let started = tokio::time::Instant::now();
        let outcome = agent
            .run_turn(&mut session, "hi", &mut renderer)
            .await
            .unwrap();

        assert_eq!(outcome.text, "finally");
        assert_eq!(outcome.iterations, 1);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(session.history().len(), 2);

        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        for request in &requests {
            assert_eq!(request.messages.len(), 1);
            assert_eq!(request.messages[0].id, requests[0].messages[0].id);
        }
        assert_eq!(renderer.notices().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn in_band_throttle_discards_partial_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Script::FailMidStream(
                vec![StreamEvent::text_start(), StreamEvent::text("Hel")],
                ProviderError::RateLimited {
                    retry_after_secs: 5,
                },
            ),
            text_reply("Hello"),
        ]));
        let agent = agent(provider.clone());
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        let outcome = agent
            .run_turn(&mut session, "hi", &mut renderer)
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello");
        assert_eq!(provider.call_count(), 2);

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text(), "hi");
        assert_eq!(history[1].text(), "Hello");

        // The discarded fragment is marked before the retried answer starts.
        assert_eq!(
            renderer.event_types(),
            vec!["text_delta", "notice", "notice", "text_delta", "turn_done"]
        );
        let notices = renderer.notices();
        assert_eq!(notices[0], "Partial response discarded");
        assert!(notices[1].starts_with("Rate limited"));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_before_any_text_has_no_discard_notice() {
        let provider = Arc::new(ScriptedProvider::new(vec![rate_limited(), text_reply("ok")]));
        let agent = agent(provider);
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        agent
            .run_turn(&mut session, "hi", &mut renderer)
            .await
            .unwrap();

        assert_eq!(renderer.notices().len(), 1);
        assert!(!renderer.notices()[0].contains("discarded"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_gives_up_after_max_retries() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            rate_limited(),
            rate_limited(),
            rate_limited(),
            rate_limited(),
        ]));
        let agent = agent(provider.clone());
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        let err = agent
            .run_turn(&mut session, "hi", &mut renderer)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::RateLimited { .. })
        ));
        assert_eq!(provider.call_count(), 4);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn provider_error_rolls_back_and_session_stays_usable() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply(&[("toolu_1", "echo", json!({"headline": "A"}))]),
            Script::Fail(ProviderError::Network("connection reset".into())),
            text_reply("back online"),
        ]));
        let agent = agent(provider);
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        let err = agent
            .run_turn(&mut session, "first", &mut renderer)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(session.history().is_empty());

        let outcome = agent
            .run_turn(&mut session, "second", &mut renderer)
            .await
            .unwrap();
        assert_eq!(outcome.text, "back online");
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].text(), "second");
    }

    #[tokio::test]
    async fn mid_stream_failure_aborts_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::FailMidStream(
            vec![StreamEvent::text_start(), StreamEvent::text("partial")],
            ProviderError::StreamInterrupted("eof".into()),
        )]));
        let agent = agent(provider);
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        assert!(agent.run_turn(&mut session, "hi", &mut renderer).await.is_err());
        assert_eq!(renderer.text(), "partial");
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn iteration_ceiling_appends_notice() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply(&[("a", "echo", json!({"headline": "1"}))]),
            tool_reply(&[("b", "echo", json!({"headline": "2"}))]),
        ]));
        let agent = agent(provider.clone()).with_max_iterations(2);
        let mut session = session();
        let mut renderer = RecordingRenderer::new();

        let outcome = agent
            .run_turn(&mut session, "loop forever", &mut renderer)
            .await
            .unwrap();

        assert!(outcome.hit_iteration_limit);
        assert_eq!(outcome.text, ITERATION_LIMIT_NOTICE);
        assert_eq!(provider.call_count(), 2);
        let last = session.history().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.text(), ITERATION_LIMIT_NOTICE);
        assert_tool_pairing(session.history());
    }

    #[tokio::test]
    async fn replayed_pair_in_fresh_history_terminates() {
        let first = Arc::new(ScriptedProvider::new(vec![
            tool_reply(&[("toolu_1", "echo", json!({"headline": "A"}))]),
            text_reply("first done"),
        ]));
        let mut original = session();
        agent(first)
            .run_turn(&mut original, "score A", &mut RecordingRenderer::new())
            .await
            .unwrap();

        let mut fresh = session();
        fresh.push(original.history()[1].clone());
        fresh.push(original.history()[2].clone());

        let second = Arc::new(ScriptedProvider::new(vec![text_reply("fine")]));
        let outcome = agent(second)
            .run_turn(&mut fresh, "and now?", &mut RecordingRenderer::new())
            .await
            .unwrap();
        assert_eq!(outcome.text, "fine");
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn domain_events_are_published() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply(&[("toolu_1", "echo", json!({"headline": "A"}))]),
            text_reply("ok"),
        ]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let agent = AgentLoop::new(provider, registry(), bus);
        let mut session = session();

        agent
            .run_turn(&mut session, "go", &mut RecordingRenderer::new())
            .await
            .unwrap();

        let mut tools_executed = 0;
        let mut responses = 0;
        while let Ok(event) = rx.try_recv() {
            match event.as_ref() {
                DomainEvent::ToolExecuted { success, .. } => {
                    assert!(success);
                    tools_executed += 1;
                }
                DomainEvent::ResponseGenerated { tokens_used, .. } => {
                    assert_eq!(*tokens_used, 15);
                    responses += 1;
                }
                _ => {}
            }
        }
        assert_eq!(tools_executed, 1);
        assert_eq!(responses, 2);
        assert_eq!(session.usage.total(), 30);
    }
}
