use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopkeep_core::config::LlmConfig;
use thiserror::Error;
use tracing::debug;

use crate::conversation::{Message, Role, ToolArguments};
use crate::tools::ToolDescriptor;

/// One stateless chat exchange: the backend sees everything it needs on every call.
#[derive(Clone, Copy, Debug)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDescriptor],
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: ResponseMessage,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<RawToolCall>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: RawFunction,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: ToolArguments,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("model backend unreachable: {0}")]
    Transport(String),
    #[error("model backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode model backend response: {0}")]
    Decode(String),
    #[error("model backend could not be configured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, BackendError>;
}

/// Client for an Ollama-compatible `/api/chat` endpoint.
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    client: Client,
    endpoint: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| BackendError::Configuration(error.to_string()))?;

        Ok(Self { client, endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')) })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BackendError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, BackendError> {
        let body = WireRequest::from_request(&request);
        debug!(
            event_name = "llm.ollama.request",
            endpoint = %self.endpoint,
            model = request.model,
            message_count = request.messages.len(),
            "sending chat request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| BackendError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status: status.as_u16(), body });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|error| BackendError::Decode(error.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    tools: Vec<WireTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDescriptor,
}

impl<'a> WireRequest<'a> {
    fn from_request(request: &ChatRequest<'a>) -> Self {
        let mut tool_names: HashMap<&'a str, &'a str> = HashMap::new();
        let mut messages = Vec::with_capacity(request.messages.len());

        for message in request.messages {
            let tool_calls = message
                .tool_calls
                .iter()
                .flatten()
                .map(|call| {
                    tool_names.insert(call.id.as_str(), call.name.as_str());
                    WireToolCall {
                        function: WireFunction {
                            name: &call.name,
                            arguments: wire_arguments(&call.arguments),
                        },
                    }
                })
                .collect();
            let tool_name = message
                .tool_call_id
                .as_deref()
                .and_then(|call_id| tool_names.get(call_id).copied());

            messages.push(WireMessage {
                role: message.role,
                content: &message.content,
                tool_calls,
                tool_name,
            });
        }

        Self {
            model: request.model,
            messages,
            tools: request
                .tools
                .iter()
                .map(|descriptor| WireTool { kind: "function", function: descriptor })
                .collect(),
            stream: false,
        }
    }
}

fn wire_arguments(arguments: &ToolArguments) -> Value {
    match arguments.normalize() {
        Ok(value) => value,
        Err(_) => match arguments {
            ToolArguments::Encoded(raw) => Value::String(raw.clone()),
            ToolArguments::Structured(value) => value.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{ChatRequest, ChatResponse, OllamaBackend, WireRequest};
    use crate::conversation::{Message, ToolArguments, ToolCallRequest};
    use crate::tools::ToolRegistry;

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let backend =
            OllamaBackend::new("http://localhost:11434/", Duration::from_secs(5)).expect("client");

        assert_eq!(backend.endpoint(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn response_parses_tool_calls_with_either_argument_encoding() {
        let response: ChatResponse = serde_json::from_value(json!({
            "model": "llama3.1",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "search_products", "arguments": {"query": "mouse"}}},
                    {"function": {"name": "get_product_details", "arguments": "{\"product_id\":2}"}}
                ]
            },
            "prompt_eval_count": 120,
            "eval_count": 30,
            "done": true
        }))
        .expect("parse response");

        let calls = response.message.tool_calls.expect("tool calls");
        assert!(matches!(calls[0].function.arguments, ToolArguments::Structured(_)));
        assert!(matches!(calls[1].function.arguments, ToolArguments::Encoded(_)));
        assert_eq!(response.prompt_eval_count, Some(120));
        assert_eq!(response.eval_count, Some(30));
    }

    #[test]
    fn missing_counters_default_to_none() {
        let response: ChatResponse =
            serde_json::from_value(json!({"message": {"content": "hello"}})).expect("parse");

        assert_eq!(response.message.content, "hello");
        assert_eq!(response.prompt_eval_count, None);
        assert_eq!(response.eval_count, None);
    }

    #[test]
    fn wire_request_carries_history_tools_and_tool_names() {
        let messages = vec![
            Message::system("sys"),
            Message::user("find a mouse"),
            Message::assistant_tool_calls(
                "",
                vec![ToolCallRequest {
                    id: "call-1".to_string(),
                    name: "search_products".to_string(),
                    arguments: ToolArguments::Encoded("{\"query\":\"mouse\"}".to_string()),
                }],
            ),
            Message::tool("call-1", "[]"),
        ];
        let request = ChatRequest {
            model: "llama3.1",
            messages: &messages,
            tools: ToolRegistry::standard().descriptors(),
        };

        let wire = serde_json::to_value(WireRequest::from_request(&request)).expect("serialize");

        assert_eq!(wire["stream"], false);
        assert_eq!(wire["messages"].as_array().map(Vec::len), Some(4));
        assert_eq!(wire["messages"][2]["tool_calls"][0]["function"]["arguments"]["query"], "mouse");
        assert_eq!(wire["messages"][3]["tool_name"], "search_products");
        assert!(wire["messages"][1].get("tool_calls").is_none());
        assert_eq!(wire["tools"][0]["type"], "function");
        assert_eq!(wire["tools"][0]["function"]["name"], "get_products");
    }
}
