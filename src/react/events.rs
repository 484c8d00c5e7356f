//! 单轮过程事件：供 CLI / SSE 等前端实时展示工具调用与观察结果

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 开始第 round 次模型调用
    RoundStarted { round: usize, max_rounds: usize },
    /// 模型请求调用工具（参数为原始文本）
    ToolCall {
        id: String,
        tool: String,
        arguments: String,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        id: String,
        tool: String,
        preview: String,
    },
    /// 工具失败，已转成结构化错误写回对话
    ToolFailure { id: String, tool: String, reason: String },
    /// 达到工具轮数上限，返回兜底回复
    LoopLimit { rounds: usize },
    /// 最终回复
    FinalAnswer { text: String },
}
