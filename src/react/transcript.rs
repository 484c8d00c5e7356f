//! 工作对话：单轮私有，不持久化
//!
//! 顺序：系统提示词、画像上下文、持久历史、本轮用户消息，之后随循环追加
//! assistant 工具请求与对应的 tool 结果。

use std::collections::HashSet;

use crate::memory::{Message, Role, ToolInvocationRequest};
use crate::react::UserProfile;
use crate::tools::ToolResult;

#[derive(Clone, Debug, Default)]
pub struct WorkingTranscript {
    messages: Vec<Message>,
}

impl WorkingTranscript {
    pub fn seed(system_prompt: &str, profile: &UserProfile, history: &[Message], user_message: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(Message::system(system_prompt));
        messages.push(Message::system(profile.context_text()));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(user_message));
        Self { messages }
    }

    /// 原样追加模型的工具请求（内容 + 全部调用），须在执行任何调用之前
    pub fn push_tool_request(&mut self, content: Option<String>, calls: Vec<ToolInvocationRequest>) {
        self.messages.push(Message::tool_request(content, calls));
    }

    /// 按请求顺序追加工具结果
    pub fn push_tool_results(&mut self, results: &[ToolResult]) {
        self.messages.extend(results.iter().map(ToolResult::to_message));
    }

    pub fn push_answer(&mut self, answer: &str) {
        self.messages.push(Message::assistant(answer));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// 最近一条工具请求中尚无对应结果的调用 id；正常情况下进入下一次模型调用前应为空
    pub fn unresolved_invocations(&self) -> Vec<String> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant && !m.tool_calls.is_empty())
        else {
            return Vec::new();
        };
        let answered: HashSet<&str> = self.messages[pos + 1..]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        self.messages[pos]
            .tool_calls
            .iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect()
    }
}
