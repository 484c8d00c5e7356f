//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时。每个 ToolInvocationRequest 恰好产出一个 ToolResult：
//! 参数解析失败按空对象继续、未知工具与处理器失败/超时都转成结构化错误描述，永不向上抛出。
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::ToolError;
use crate::memory::{Message, ToolInvocationRequest};
use crate::tools::{Tool, ToolRegistry, ToolSpec};

/// 一次工具调用的结果：成功载荷或错误描述
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    Success(Value),
    Failure(ToolError),
}

/// 与调用请求一一对应的结果
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub invocation_id: String,
    pub tool_name: String,
    pub output: ToolOutput,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        matches!(self.output, ToolOutput::Failure(_))
    }

    pub fn error(&self) -> Option<&ToolError> {
        match &self.output {
            ToolOutput::Failure(e) => Some(e),
            ToolOutput::Success(_) => None,
        }
    }

    /// 写回工作对话的 JSON 文本（中文等非 ASCII 字符原样保留）
    pub fn content(&self) -> String {
        let value = match &self.output {
            ToolOutput::Success(v) => v.clone(),
            ToolOutput::Failure(e) => e.descriptor(),
        };
        value.to_string()
    }

    /// 转为 tool 角色消息，回指调用 id
    pub fn to_message(&self) -> Message {
        Message::tool_result(&self.invocation_id, &self.tool_name, self.content())
    }
}

/// 解析原始参数文本；空串、非法 JSON 或非对象一律视为空对象
pub fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) => Ok(v),
        Ok(other) => Err(ToolError::ArgumentParse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ToolError::ArgumentParse(e.to_string())),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolResult
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    parallel: bool,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            parallel: true,
        }
    }

    /// 同一轮的多个调用是否并发执行（结果顺序始终与请求顺序一致）
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 执行单个调用，恰好返回一个 ToolResult；输出 JSON 审计日志
    pub async fn invoke(&self, call: &ToolInvocationRequest) -> ToolResult {
        let start = Instant::now();
        let args = match parse_arguments(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(tool = %call.name, id = %call.id, error = %e, "malformed tool arguments, using empty object");
                Value::Object(Map::new())
            }
        };
        let args_preview = args_preview(&args);

        let output = match self.registry.get(&call.name) {
            None => ToolOutput::Failure(ToolError::UnknownTool {
                name: call.name.clone(),
                args,
            }),
            Some(tool) => self.run_handler(tool, &call.name, args).await,
        };

        let outcome = match &output {
            ToolOutput::Success(_) => "ok",
            ToolOutput::Failure(e) => e.kind(),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "id": call.id,
            "ok": matches!(output, ToolOutput::Success(_)),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        ToolResult {
            invocation_id: call.id.clone(),
            tool_name: call.name.clone(),
            output,
        }
    }

    async fn run_handler(&self, tool: Arc<dyn Tool>, name: &str, args: Value) -> ToolOutput {
        match timeout(self.timeout, tool.execute(args.clone())).await {
            Ok(Ok(v)) => ToolOutput::Success(v),
            Ok(Err(e)) => ToolOutput::Failure(ToolError::Handler {
                message: e.message,
                args: e.args,
            }),
            Err(_) => ToolOutput::Failure(ToolError::Timeout {
                tool: name.to_string(),
                args,
            }),
        }
    }

    /// 执行一轮中的全部调用；返回的结果与 calls 一一对应、顺序一致
    pub async fn invoke_all(&self, calls: &[ToolInvocationRequest]) -> Vec<ToolResult> {
        if self.parallel && calls.len() > 1 {
            join_all(calls.iter().map(|c| self.invoke(c))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.invoke(call).await);
            }
            results
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
