//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本依次返回预设的回复或错误；脚本耗尽后使用兜底回复（默认回显最后一条 User 消息）。
//! 每次调用都会记录收到的消息与工具声明，便于断言模型「看到了什么」。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatRequest, LlmClient, LlmError, ModelReply, ResponseFormat, ToolChoice};
use crate::memory::{Message, Role};

/// 一次被记录的模型调用
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub tool_choice: ToolChoice,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<Result<ModelReply, LlmError>>,
    calls: Vec<RecordedCall>,
}

/// Mock 客户端：脚本化回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    state: Mutex<MockState>,
    /// 脚本耗尽后的固定回复；None 时回显最后一条 User 消息
    fallback: Option<ModelReply>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Result<ModelReply, LlmError>>) -> Self {
        Self {
            state: Mutex::new(MockState {
                script: script.into(),
                calls: Vec::new(),
            }),
            fallback: None,
        }
    }

    /// 每次都返回同一个回复（用于触发循环上限）
    pub fn always(reply: ModelReply) -> Self {
        Self {
            state: Mutex::default(),
            fallback: Some(reply),
        }
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().map(|s| s.calls.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ModelReply, LlmError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| LlmError::Api("mock state poisoned".to_string()))?;
        state.calls.push(RecordedCall {
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            tool_choice: request.tool_choice,
            response_format: request.response_format,
        });
        if let Some(next) = state.script.pop_front() {
            return next;
        }
        if let Some(reply) = &self.fallback {
            return Ok(reply.clone());
        }
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or("(no input)");
        Ok(ModelReply::text(format!("Echo from Mock: {last_user}")))
    }
}
