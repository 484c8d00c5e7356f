//! 记忆层：对话消息与有界持久历史

pub mod conversation;

pub use conversation::{Message, Role, SessionHistory, ToolInvocationRequest};
