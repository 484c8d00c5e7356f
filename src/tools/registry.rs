//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时负责参数解析、超时与错误转换。注册表本身无状态、无副作用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// 处理器失败：错误信息 + 引发错误的参数
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub args: Value,
}

impl HandlerError {
    pub fn new(message: impl Into<String>, args: &Value) -> Self {
        Self {
            message: message.into(),
            args: args.clone(),
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为已解析的 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 tool_calls 中的 function.name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        })
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<Value, HandlerError>;
}

/// 暴露给模型的工具声明
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，声明顺序即注册顺序
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具后注册者覆盖先注册者
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 供模型调用层使用的工具声明列表
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        async fn execute(&self, args: Value) -> Result<Value, HandlerError> {
            Ok(args)
        }
    }

    #[test]
    fn test_lookup_and_not_found() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("glossary_lookup_tool"));
        assert!(registry.get("glossary_lookup_tool").is_some());
        assert!(registry.get("glossary_lookup").is_none());
    }

    #[test]
    fn test_specs_follow_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Named("b"));
        registry.register(Named("a"));
        registry.register(Named("b"));
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(registry.tool_names(), vec!["b", "a"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_handler_error_keeps_args() {
        let args = json!({"query": "boots"});
        let err = HandlerError::new("backend down", &args);
        assert_eq!(err.to_string(), "backend down");
        assert_eq!(err.args, args);
    }
}
