//! Chat-completion clients.
//!
//! The runtime speaks [`ChatMessage`]s and [`ToolDefinition`]s; [`OpenAiCompatibleClient`]
//! maps them onto the `/chat/completions` wire format used by OpenAI and Ollama.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rise_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const RETRY_BASE_DELAY_MS: u64 = 250;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    /// Non-blank text content, if any.
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_deref().map(str::trim).filter(|text| !text.is_empty())
    }

    /// A reply with neither text nor tool calls.
    pub fn is_empty_reply(&self) -> bool {
        self.tool_calls.is_empty() && self.text_content().is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm api error (status={status}): {body}")]
    Api { status: u16, body: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Configuration(_) => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError>;
}

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(base_url), _) => base_url.clone(),
            (None, LlmProvider::OpenAi) => OPENAI_DEFAULT_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => {
                return Err(LlmError::Configuration("ollama requires llm.base_url".to_string()))
            }
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| LlmError::Configuration(format!("could not build http client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete_once(&self, payload: &WireRequest<'_>) -> Result<ChatMessage, LlmError> {
        let mut request = self.http.post(&self.endpoint).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| LlmError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| LlmError::Transport(e.to_string()))?;
        if status != StatusCode::OK {
            return Err(LlmError::Api { status: status.as_u16(), body: body.trim().to_string() });
        }

        let parsed: WireResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Decode("response contained no choices".to_string()))?;
        Ok(choice.message.into_chat_message())
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage, LlmError> {
        let payload = WireRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.complete_once(&payload).await {
                Ok(message) => return Ok(message),
                Err(error) if error.is_transient() && attempt <= self.max_retries => {
                    warn!(
                        event_name = "agent.llm.retry",
                        attempt,
                        error = %error,
                        "transient llm failure, retrying"
                    );
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn retry_backoff(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(6);
    Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(1_u64 << shift))
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: Role,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments. Some servers send an object instead of a string.
    arguments: Value,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: Value::String(call.arguments.to_string()),
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

impl From<&ToolDefinition> for WireTool {
    fn from(definition: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: definition.name.clone(),
                description: definition.description.clone(),
                parameters: definition.parameters.clone(),
            },
        }
    }
}

impl WireMessage {
    fn into_chat_message(self) -> ChatMessage {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: decode_arguments(call.function.arguments),
            })
            .collect();

        ChatMessage {
            role: self.role,
            content: self.content,
            tool_calls,
            tool_call_id: self.tool_call_id,
        }
    }
}

/// Undecodable argument strings are kept verbatim so the tool can report the problem.
fn decode_arguments(raw: Value) -> Value {
    match raw {
        Value::String(text) if text.trim().is_empty() => Value::Object(Default::default()),
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        decode_arguments, retry_backoff, ChatMessage, LlmError, Role, ToolCall, WireMessage,
        WireResponse,
    };

    #[test]
    fn tool_calls_decode_string_arguments() {
        let response: WireResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "negotiate_price",
                            "arguments": "{\"car_id\": 1, \"user_offer\": 45000}"
                        }
                    }]
                }
            }]
        }))
        .expect("decode response");

        let message = response.choices.into_iter().next().expect("choice").message.into_chat_message();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].arguments["user_offer"], 45000);
        assert!(!message.is_empty_reply());
    }

    #[test]
    fn malformed_arguments_are_kept_as_text() {
        assert_eq!(decode_arguments(json!("{not json")), json!("{not json"));
        assert_eq!(decode_arguments(json!("")), json!({}));
        assert_eq!(decode_arguments(json!({"price": 1})), json!({"price": 1}));
    }

    #[test]
    fn outgoing_tool_calls_encode_arguments_as_strings() {
        let message = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_9".to_string(),
                name: "get_all_cars".to_string(),
                arguments: json!({}),
            }],
            tool_call_id: None,
        };

        let wire = serde_json::to_value(WireMessage::from(&message)).expect("encode");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert!(wire.get("tool_call_id").is_none());
    }

    #[test]
    fn blank_text_counts_as_empty_reply() {
        assert!(ChatMessage::assistant("   ").is_empty_reply());
        assert!(!ChatMessage::assistant("Hi there").is_empty_reply());
    }

    #[test]
    fn only_throttling_and_server_errors_are_transient() {
        assert!(LlmError::Transport("reset".to_string()).is_transient());
        assert!(LlmError::Api { status: 429, body: String::new() }.is_transient());
        assert!(LlmError::Api { status: 503, body: String::new() }.is_transient());
        assert!(!LlmError::Api { status: 401, body: String::new() }.is_transient());
        assert!(!LlmError::Decode("bad".to_string()).is_transient());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(1).as_millis(), 250);
        assert_eq!(retry_backoff(2).as_millis(), 500);
        assert_eq!(retry_backoff(20), retry_backoff(7));
    }
}
