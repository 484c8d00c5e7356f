//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。请求体与响应体使用自带类型
//! （create_byot），以便精确表达 tool_calls、tool 结果消息与 json_object 响应格式。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{ChatRequest, LlmClient, LlmError, ModelReply, ResponseFormat, ToolChoice};
use crate::memory::{Message, Role, ToolInvocationRequest};
use crate::tools::ToolSpec;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn build_body(&self, request: &ChatRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": to_wire_messages(request.messages),
        });
        if !request.tools.is_empty() {
            body["tools"] = to_wire_tools(request.tools);
            body["tool_choice"] = json!(match request.tool_choice {
                ToolChoice::Auto => "auto",
                ToolChoice::None => "none",
                ToolChoice::Required => "required",
            });
        }
        if request.response_format == ResponseFormat::JsonObject {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

/// 将内部消息转换为 chat-completions 线上格式
pub(crate) fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::System => json!({ "role": "system", "content": m.text() }),
            Role::User => json!({ "role": "user", "content": m.text() }),
            Role::Assistant if !m.tool_calls.is_empty() => json!({
                "role": "assistant",
                "content": m.content,
                "tool_calls": m.tool_calls.iter().map(|tc| json!({
                    "id": tc.id,
                    "type": "function",
                    "function": { "name": tc.name, "arguments": tc.arguments },
                })).collect::<Vec<_>>(),
            }),
            Role::Assistant => json!({ "role": "assistant", "content": m.text() }),
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id,
                "name": m.name,
                "content": m.text(),
            }),
        })
        .collect()
}

pub(crate) fn to_wire_tools(tools: &[ToolSpec]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn map_openai_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::ApiError(api) => {
            let lower = api.message.to_lowercase();
            if lower.contains("rate limit") || lower.contains("rate_limit") {
                LlmError::RateLimited { retry_after_ms: 1000 }
            } else {
                LlmError::Api(api.message)
            }
        }
        other => {
            let msg = other.to_string();
            if msg.contains("429") {
                LlmError::RateLimited { retry_after_ms: 1000 }
            } else if msg.to_lowercase().contains("deserializ") {
                LlmError::InvalidResponse(msg)
            } else {
                LlmError::Network(msg)
            }
        }
    }
}

fn parse_reply(response: WireResponse) -> Result<ModelReply, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;
    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolInvocationRequest::new(tc.id, tc.function.name, tc.function.arguments))
        .collect();
    Ok(ModelReply {
        content: choice.message.content,
        tool_calls,
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn chat(&self, request: ChatRequest<'_>) -> Result<ModelReply, LlmError> {
        let body = self.build_body(&request);
        let chat = self.client.chat();
        let response: WireResponse = tokio::time::timeout(self.request_timeout, chat.create_byot(body))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        let reply = parse_reply(response)?;
        tracing::debug!(
            model = %self.model,
            tool_calls = reply.tool_calls.len(),
            "chat completion received"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_messages_keep_tool_protocol() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("cozy fall fits"),
            Message::tool_request(
                None,
                vec![ToolInvocationRequest::new("call_1", "glossary_lookup_tool", r#"{"term":"cozy"}"#)],
            ),
            Message::tool_result("call_1", "glossary_lookup_tool", "[]"),
        ];
        let wire = to_wire_messages(&msgs);
        assert_eq!(wire[2]["role"], "assistant");
        assert!(wire[2]["content"].is_null());
        assert_eq!(wire[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], r#"{"term":"cozy"}"#);
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_body_includes_tools_and_json_format() {
        let client = OpenAiClient::new(Some("http://localhost:1"), "gpt-4o", Some("sk-test"));
        let tools = vec![ToolSpec {
            name: "glossary_lookup_tool".to_string(),
            description: "look up".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let msgs = vec![Message::user("hi")];
        let body = client.build_body(&ChatRequest::with_tools(&msgs, &tools));
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "glossary_lookup_tool");
        assert!(body.get("response_format").is_none());

        let body = client.build_body(&ChatRequest::text(&msgs).json());
        assert!(body.get("tools").is_none());
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_parse_reply_with_tool_calls() {
        let raw = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_a",
                        "type": "function",
                        "function": {"name": "catalog_search_tool", "arguments": "{\"query\":\"wool coat\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let resp: WireResponse = serde_json::from_value(raw).unwrap();
        let reply = parse_reply(resp).unwrap();
        assert!(reply.has_tool_calls());
        assert_eq!(reply.tool_calls[0].name, "catalog_search_tool");
        assert!(reply.content.is_none());
    }

    #[test]
    fn test_parse_reply_without_choices_is_invalid() {
        let resp: WireResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(parse_reply(resp), Err(LlmError::InvalidResponse(_))));
    }
}
