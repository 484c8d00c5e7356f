//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient::chat：提交对话 + 工具声明 + tool_choice，
//! 返回纯文本或一批工具调用请求。重试不属于编排层，由 RetryingLlmClient 包在外面。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{Message, ToolInvocationRequest};
use crate::tools::ToolSpec;

/// 模型调用层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 限流、超时、网络错误可重试；API 拒绝与响应格式错误不重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Timeout | LlmError::Network(_)
        )
    }
}

/// 工具选择策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

/// 一次模型调用的输入
#[derive(Clone, Copy, Debug)]
pub struct ChatRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
    pub tool_choice: ToolChoice,
    pub response_format: ResponseFormat,
}

impl<'a> ChatRequest<'a> {
    /// 带工具声明、tool_choice=auto 的请求
    pub fn with_tools(messages: &'a [Message], tools: &'a [ToolSpec]) -> Self {
        Self {
            messages,
            tools,
            tool_choice: ToolChoice::Auto,
            response_format: ResponseFormat::Text,
        }
    }

    /// 不带工具的纯文本请求
    pub fn text(messages: &'a [Message]) -> Self {
        Self {
            messages,
            tools: &[],
            tool_choice: ToolChoice::None,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::JsonObject;
        self
    }
}

/// 模型返回：文字（可空）+ 工具调用请求（可空）
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocationRequest>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolInvocationRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ModelReply, LlmError>;

    /// 不带工具的文本完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let reply = self.chat(ChatRequest::text(messages)).await?;
        Ok(reply.content.unwrap_or_default())
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试参数：指数退避，RateLimited 时以服务端给出的等待时间为下限
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试（从 0 开始）前的等待时间
    pub fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        let backoff = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        let floor = match err {
            LlmError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => 0,
        };
        Duration::from_millis(backoff.max(floor).min(self.max_delay_ms.max(floor)))
    }
}

/// 对内层客户端的可重试错误做退避重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ModelReply, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.chat(request).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(error = %e, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retrying model call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_rate_limit() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::RateLimited { retry_after_ms: 1 }),
            Ok(ModelReply::text("hello")),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry());
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "hello");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_api_error() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::Api("invalid model".to_string())),
            Ok(ModelReply::text("never")),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry());
        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, LlmError::Api("invalid model".to_string()));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let mock = Arc::new(MockLlmClient::scripted(vec![
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
            Ok(ModelReply::text("late")),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry());
        assert_eq!(client.complete(&[]).await.unwrap_err(), LlmError::Timeout);
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn test_delay_respects_cap_and_retry_after() {
        let cfg = RetryConfig {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        };
        assert_eq!(cfg.delay_for(0, &LlmError::Timeout), Duration::from_millis(100));
        assert_eq!(cfg.delay_for(10, &LlmError::Timeout), Duration::from_millis(1000));
        assert_eq!(
            cfg.delay_for(0, &LlmError::RateLimited { retry_after_ms: 3000 }),
            Duration::from_millis(3000)
        );
    }
}
