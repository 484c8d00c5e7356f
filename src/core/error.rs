//! 错误分类
//!
//! 两层错误：
//! - **AgentError**：整轮致命错误（模型调用失败、超过截止时间、取消、会话锁获取失败），向调用方传播；
//! - **ToolError**：工具调用层错误（参数解析、未知工具、处理器失败、超时），在本地吸收，
//!   转成模型可见的结构化错误描述写回工作对话，永不向调用方抛出。

use serde_json::{json, Value};
use thiserror::Error;

use crate::llm::LlmError;

/// 一轮对话中可能导致整轮失败的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    ModelCall(#[from] LlmError),

    #[error("turn deadline exceeded")]
    DeadlineExceeded,

    #[error("turn cancelled")]
    Cancelled,

    /// 在限定时间内无法拿到会话锁（同一会话有其他请求正在进行）
    #[error("session busy: {0}")]
    SessionBusy(String),
}

/// 工具调用失败的种类；每一种都会被转换成一条 ToolResult，而不是中止本轮
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// 参数不是合法 JSON 对象；执行器按空对象继续调用处理器
    #[error("argument parse error: {0}")]
    ArgumentParse(String),

    #[error("unknown_tool:{name}")]
    UnknownTool { name: String, args: Value },

    #[error("{message}")]
    Handler { message: String, args: Value },

    #[error("timeout:{tool}")]
    Timeout { tool: String, args: Value },
}

impl ToolError {
    /// 模型可见的错误描述：`{"error": "...", "args": {...}}`
    pub fn descriptor(&self) -> Value {
        match self {
            ToolError::ArgumentParse(msg) => json!({ "error": msg, "args": {} }),
            ToolError::UnknownTool { args, .. }
            | ToolError::Handler { args, .. }
            | ToolError::Timeout { args, .. } => json!({ "error": self.to_string(), "args": args }),
        }
    }

    /// 审计日志中的 outcome 字段
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::ArgumentParse(_) => "argument_parse",
            ToolError::UnknownTool { .. } => "unknown_tool",
            ToolError::Handler { .. } => "error",
            ToolError::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_descriptor() {
        let err = ToolError::UnknownTool {
            name: "catalog_serch_tool".to_string(),
            args: json!({"query": "boots"}),
        };
        let d = err.descriptor();
        assert_eq!(d["error"], "unknown_tool:catalog_serch_tool");
        assert_eq!(d["args"]["query"], "boots");
        assert_eq!(err.kind(), "unknown_tool");
    }

    #[test]
    fn test_handler_descriptor_keeps_message_and_args() {
        let err = ToolError::Handler {
            message: "milvus unavailable".to_string(),
            args: json!({"term": "gorpcore"}),
        };
        let d = err.descriptor();
        assert_eq!(d["error"], "milvus unavailable");
        assert_eq!(d["args"]["term"], "gorpcore");
    }

    #[test]
    fn test_model_call_error_display() {
        let err = AgentError::from(LlmError::Api("bad gateway".to_string()));
        assert!(err.to_string().contains("bad gateway"));
    }
}
