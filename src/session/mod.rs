//! 会话管理：多会话存储，每个会话独立加锁

pub mod store;

pub use store::{new_session_id, Session, SessionId, SessionStore};
