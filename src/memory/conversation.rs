//! 对话消息与持久历史
//!
//! - **Message**：与 chat-completions 协议一致的一条消息（system / user / assistant / tool），
//!   assistant 消息可携带工具调用请求，tool 消息回指发起它的调用 id；
//! - **SessionHistory**：跨轮保留的有界历史，仅含 user / assistant 消息，满了丢最旧的（环形缓冲）。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 模型发出的一次工具调用请求；id 由模型调用层分配，arguments 为原始 JSON 文本
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolInvocationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// 仅发起工具调用、没有文字时为 None
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocationRequest>,
    /// tool 消息：对应的调用 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// tool 消息：工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// assistant 的工具调用请求消息，原样保留模型给出的文字与全部调用
    pub fn tool_request(content: Option<String>, tool_calls: Vec<ToolInvocationRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    /// 文本内容，None 视为空串
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// 是否为可进入持久历史的对话消息（user / assistant 且不带工具调用）
    pub fn is_conversational(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant) && self.tool_calls.is_empty()
    }
}

/// 持久会话历史：最多保留 max_len 条 user/assistant 消息，超出时从头部淘汰
#[derive(Clone, Debug)]
pub struct SessionHistory {
    messages: VecDeque<Message>,
    max_len: usize,
}

impl SessionHistory {
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            messages: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    /// 追加到尾部；超出容量时静默丢弃最旧的消息。
    /// 非对话消息（system / tool / 工具调用请求）不进入持久历史，返回 false。
    pub fn append(&mut self, msg: Message) -> bool {
        if !msg.is_conversational() {
            tracing::warn!(role = ?msg.role, "rejected non-conversational message for session history");
            return false;
        }
        while self.messages.len() >= self.max_len {
            self.messages.pop_front();
        }
        self.messages.push_back(msg);
        true
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// 不可变副本，交给一次编排调用使用，之后对历史的修改不会影响它
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// 已记录的 user/assistant 轮次数
    pub fn turn_count(&self) -> usize {
        self.messages.len()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}
