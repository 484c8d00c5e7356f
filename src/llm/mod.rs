//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、重试包装、嵌入

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use embedding::{create_embedder_from_config, Embedder, OpenAiEmbedder};
pub use mock::{MockLlmClient, RecordedCall};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{
    ChatRequest, LlmClient, LlmError, ModelReply, ResponseFormat, RetryConfig, RetryingLlmClient,
    ToolChoice,
};

use crate::config::LlmSection;

/// 按配置构建模型客户端（provider = openai / mock），外层包 RetryingLlmClient
pub fn create_llm_from_config(llm: &LlmSection, model: &str) -> Arc<dyn LlmClient> {
    let inner: Arc<dyn LlmClient> = match llm.provider.as_str() {
        "mock" => {
            tracing::info!("using mock LLM client");
            Arc::new(MockLlmClient::new())
        }
        other => {
            if other != "openai" {
                tracing::warn!(provider = other, "unknown LLM provider, falling back to openai-compatible client");
            }
            Arc::new(
                OpenAiClient::new(llm.base_url.as_deref(), model, llm.api_key.as_deref())
                    .with_request_timeout(Duration::from_secs(llm.request_timeout_secs)),
            )
        }
    };
    Arc::new(RetryingLlmClient::new(inner, llm.retry.clone()))
}
