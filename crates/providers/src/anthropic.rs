//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native `tool_use` / `tool_result` content blocks
//! - Streaming via SSE, translated into [`StreamEvent`]s
//!
//! The provider does not reassemble messages. It forwards block starts,
//! deltas and stops as they arrive and leaves the reduction to the agent.

use async_trait::async_trait;
use augur_core::error::ProviderError;
use augur_core::message::{ContentBlock, Message, Role};
use augur_core::provider::*;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert history into the API's message shape.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage<'_>> {
        messages
            .iter()
            .map(|m| AnthropicMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": true,
        });

        if !request.system.is_empty() {
            body["system"] = serde_json::json!(request.system);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request.tools);
        }

        body
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<EventStream, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            provider = "anthropic",
            model = %request.model,
            messages = request.messages.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 || status == 529 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::default();
            let mut translator = EventTranslator::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for data in lines.push(&bytes) {
                    let event: serde_json::Value = match serde_json::from_str(&data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    match translator.translate(&event) {
                        Ok(events) => {
                            for ev in events {
                                let finished = matches!(ev, StreamEvent::MessageStop { .. });
                                if tx.send(Ok(ev)).await.is_err() || finished {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without message_stop
            let _ = tx
                .send(Ok(StreamEvent::MessageStop {
                    stop_reason: translator.stop_reason.take(),
                }))
                .await;
        });

        Ok(rx)
    }
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Chunks are buffered as raw bytes; a line is decoded only once its
/// newline has arrived, so a character split across chunks stays intact.
#[derive(Default)]
struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    /// Append a chunk and return every complete `data:` payload in it.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    trace!(error = %e, "Skipping SSE line that is not UTF-8");
                    continue;
                }
            };
            let line = line.trim_end_matches(['\n', '\r']);

            // Anthropic repeats the event type inside the data payload, so
            // `event:` lines carry nothing we need.
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }

        payloads
    }
}

/// Maps Anthropic's SSE payloads onto provider-neutral stream events.
#[derive(Default)]
struct EventTranslator {
    /// Inside a block kind we do not surface (e.g. `thinking`)
    skipping_block: bool,
    stop_reason: Option<StopReason>,
}

impl EventTranslator {
    fn translate(&mut self, event: &serde_json::Value) -> Result<Vec<StreamEvent>, ProviderError> {
        let event_type = event["type"].as_str().unwrap_or("");

        let events = match event_type {
            "message_start" => match event["message"]["usage"]["input_tokens"].as_u64() {
                Some(input) => vec![StreamEvent::Usage {
                    usage: Usage {
                        input_tokens: input as u32,
                        output_tokens: 0,
                    },
                }],
                None => vec![],
            },
            "content_block_start" => {
                let block = &event["content_block"];
                match block["type"].as_str() {
                    Some("text") => {
                        self.skipping_block = false;
                        let mut out = vec![StreamEvent::text_start()];
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(StreamEvent::text(text));
                        }
                        out
                    }
                    Some("tool_use") => {
                        self.skipping_block = false;
                        vec![StreamEvent::tool_start(
                            block["id"].as_str().unwrap_or(""),
                            block["name"].as_str().unwrap_or(""),
                        )]
                    }
                    other => {
                        trace!(block_type = ?other, "Skipping content block");
                        self.skipping_block = true;
                        vec![]
                    }
                }
            }
            "content_block_delta" if !self.skipping_block => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => delta["text"]
                        .as_str()
                        .map(|t| vec![StreamEvent::text(t)])
                        .unwrap_or_default(),
                    "input_json_delta" => delta["partial_json"]
                        .as_str()
                        .map(|p| vec![StreamEvent::input_json(p)])
                        .unwrap_or_default(),
                    _ => vec![],
                }
            }
            "content_block_stop" => {
                if std::mem::take(&mut self.skipping_block) {
                    vec![]
                } else {
                    vec![StreamEvent::BlockStop]
                }
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(StopReason::parse(reason));
                }
                match event["usage"]["output_tokens"].as_u64() {
                    Some(out) => vec![StreamEvent::Usage {
                        usage: Usage {
                            input_tokens: 0,
                            output_tokens: out as u32,
                        },
                    }],
                    None => vec![],
                }
            }
            "message_stop" => vec![StreamEvent::MessageStop {
                stop_reason: self.stop_reason.take(),
            }],
            "error" => {
                let error = &event["error"];
                let message = error["message"].as_str().unwrap_or("unknown error").to_string();
                return Err(match error["type"].as_str().unwrap_or("") {
                    "overloaded_error" | "rate_limit_error" => ProviderError::RateLimited {
                        retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
                    },
                    "authentication_error" | "permission_error" => {
                        ProviderError::AuthenticationFailed(message)
                    }
                    _ => ProviderError::StreamInterrupted(message),
                });
            }
            _ => vec![],
        };

        Ok(events)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a [ContentBlock],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider =
            AnthropicProvider::new("sk-ant-test").with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn request_body_shape() {
        let mut assistant = Message::assistant("Let me check");
        assistant.content.push(ContentBlock::ToolUse {
            id: "toolu_1".into(),
            name: "list_markets".into(),
            input: json!({}),
        });
        let request = ProviderRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: "You run prediction markets".into(),
            messages: vec![
                Message::user("what's open?"),
                assistant,
                Message::new(
                    Role::User,
                    vec![ContentBlock::tool_result("toolu_1", "{\"markets\":[]}")],
                ),
            ],
            tools: vec![ToolDefinition {
                name: "list_markets".into(),
                description: "List markets".into(),
                input_schema: json!({"type": "object"}),
            }],
            max_tokens: 1024,
            temperature: 0.5,
        };

        let body = AnthropicProvider::build_body(&request);
        assert_eq!(body["system"], "You run prediction markets");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
        assert!(messages[0].get("id").is_none(), "internal ids must not leak");
    }

    #[test]
    fn empty_system_is_omitted() {
        let request = ProviderRequest {
            model: "m".into(),
            system: String::new(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: 16,
            temperature: 0.0,
        };
        let body = AnthropicProvider::build_body(&request);
        assert!(body.get("system").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn sse_lines_handle_split_chunks() {
        let mut lines = SseLines::default();
        assert!(lines.push(b"event: ping\ndata: {\"type\":").is_empty());
        let out = lines.push(b"\"ping\"}\r\n\r\n: comment\ndata: {}\n");
        assert_eq!(out, vec!["{\"type\":\"ping\"}".to_string(), "{}".to_string()]);
    }

    #[test]
    fn sse_lines_keep_characters_split_across_chunks() {
        let payload = "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"café\"}}\n";
        let bytes = payload.as_bytes();
        // Cut between the two bytes of 'é'
        let split = payload.find('é').unwrap() + 1;

        let mut lines = SseLines::default();
        assert!(lines.push(&bytes[..split]).is_empty());
        let out = lines.push(&bytes[split..]);
        assert_eq!(out.len(), 1);

        let event: serde_json::Value = serde_json::from_str(&out[0]).unwrap();
        let mut t = EventTranslator::default();
        assert_eq!(t.translate(&event).unwrap(), vec![StreamEvent::text("café")]);
    }

    #[test]
    fn translates_a_tool_use_stream() {
        let mut t = EventTranslator::default();
        let payloads = [
            json!({"type": "message_start", "message": {"usage": {"input_tokens": 12}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Scoring"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_9", "name": "score_news", "input": {}}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"headline\":"}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"A\"}"}}),
            json!({"type": "content_block_stop", "index": 1}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 7}}),
            json!({"type": "message_stop"}),
        ];

        let events: Vec<StreamEvent> = payloads
            .iter()
            .flat_map(|p| t.translate(p).unwrap())
            .collect();

        assert_eq!(
            events,
            vec![
                StreamEvent::Usage { usage: Usage { input_tokens: 12, output_tokens: 0 } },
                StreamEvent::text_start(),
                StreamEvent::text("Scoring"),
                StreamEvent::BlockStop,
                StreamEvent::tool_start("toolu_9", "score_news"),
                StreamEvent::input_json("{\"headline\":"),
                StreamEvent::input_json("\"A\"}"),
                StreamEvent::BlockStop,
                StreamEvent::Usage { usage: Usage { input_tokens: 0, output_tokens: 7 } },
                StreamEvent::MessageStop { stop_reason: Some(StopReason::ToolUse) },
            ]
        );
    }

    #[test]
    fn thinking_blocks_are_skipped() {
        let mut t = EventTranslator::default();
        assert!(t
            .translate(&json!({"type": "content_block_start", "content_block": {"type": "thinking", "thinking": ""}}))
            .unwrap()
            .is_empty());
        assert!(t
            .translate(&json!({"type": "content_block_delta", "delta": {"type": "thinking_delta", "thinking": "hmm"}}))
            .unwrap()
            .is_empty());
        assert!(t
            .translate(&json!({"type": "content_block_stop"}))
            .unwrap()
            .is_empty());
        // The next block is surfaced again
        assert_eq!(
            t.translate(&json!({"type": "content_block_start", "content_block": {"type": "text", "text": ""}}))
                .unwrap(),
            vec![StreamEvent::text_start()]
        );
    }

    #[test]
    fn overloaded_error_maps_to_rate_limit() {
        let mut t = EventTranslator::default();
        let err = t
            .translate(&json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}))
            .unwrap_err();
        assert!(err.is_rate_limited());

        let err = t
            .translate(&json!({"type": "error", "error": {"type": "api_error", "message": "boom"}}))
            .unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(m) if m == "boom"));
    }
}
