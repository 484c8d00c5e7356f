//! Tailord - 时尚导购对话助手
//!
//! 模块划分：
//! - **agent**: 无头 Agent 运行时（会话锁内跑一轮对话并写回历史）
//! - **catalog**: 外部协作方：商品检索、风格词典、查询规范化（嵌入 + Milvus）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、重试、嵌入
//! - **memory**: 消息类型与有界持久历史
//! - **react**: 单轮状态机与工具调用主循环
//! - **session**: 多会话存储
//! - **tools**: 工具注册表、执行器与三个导购工具
//! - **server**: HTTP 接口（feature = "web"）

pub mod agent;
pub mod catalog;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
#[cfg(feature = "web")]
pub mod server;
pub mod session;
pub mod tools;

pub use agent::{ChatReply, ChatTurn, ShoppingAgent};
pub use react::{run_turn, TurnOutcome, TurnSession, TurnStatus};
