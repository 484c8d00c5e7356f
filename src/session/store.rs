//! 会话存储
//!
//! 按会话 ID 保存持久历史与用户画像；每个会话有独立的互斥锁，
//! 读取历史、跑一轮对话、写回结果都在同一把锁内完成，同一会话的并发请求不会交错。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::core::AgentError;
use crate::memory::SessionHistory;
use crate::react::UserProfile;

/// 会话 ID
pub type SessionId = String;

/// 生成新的会话 ID
pub fn new_session_id() -> SessionId {
    format!("session_{}", uuid::Uuid::new_v4())
}

/// 单个会话
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// 持久历史（仅 user / assistant）
    pub history: SessionHistory,
    pub profile: UserProfile,
    /// 最后活跃时间
    pub last_active: Instant,
    pub created_at: Instant,
}

impl Session {
    pub fn new(id: SessionId, max_history: usize, profile: UserProfile) -> Self {
        let now = Instant::now();
        Self {
            id,
            history: SessionHistory::new(max_history),
            profile,
            last_active: now,
            created_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// 会话是否过期
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_active.elapsed() > timeout
    }
}

/// 会话存储：session_id -> Arc<Mutex<Session>>
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    max_history: usize,
    session_timeout: Duration,
    lock_timeout: Duration,
    default_profile: UserProfile,
}

impl SessionStore {
    pub fn new(max_history: usize, session_timeout_secs: u64, lock_timeout_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history,
            session_timeout: Duration::from_secs(session_timeout_secs),
            lock_timeout: Duration::from_secs(lock_timeout_secs),
            default_profile: UserProfile::default(),
        }
    }

    /// 新建会话使用的默认画像
    pub fn with_default_profile(mut self, profile: UserProfile) -> Self {
        self.default_profile = profile;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    async fn handle(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(s) = self.sessions.read().await.get(session_id) {
            return s.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "session created");
                Arc::new(Mutex::new(Session::new(
                    session_id.to_string(),
                    self.max_history,
                    self.default_profile.clone(),
                )))
            })
            .clone()
    }

    /// 获取（不存在则创建）会话并持有其锁；在 lock_timeout 内拿不到锁返回 SessionBusy
    pub async fn acquire(&self, session_id: &str) -> Result<OwnedMutexGuard<Session>, AgentError> {
        let handle = self.handle(session_id).await;
        let mut guard = tokio::time::timeout(self.lock_timeout, handle.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(session_id, "timed out waiting for session lock");
                AgentError::SessionBusy(session_id.to_string())
            })?;
        guard.touch();
        Ok(guard)
    }

    /// 清理过期会话。
    ///
    /// 仅移除无人持有句柄的会话：acquire 在拿锁前已克隆句柄（引用计数 > 1），
    /// 此时移除会让后续请求新建同 ID 会话，两把锁并存。
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let timeout = self.session_timeout;
        sessions.retain(|_, s| {
            if Arc::strong_count(s) > 1 {
                return true;
            }
            match s.try_lock() {
                Ok(session) => !session.is_expired(timeout),
                Err(_) => true,
            }
        });
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "expired sessions cleaned up");
        }
        removed
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// 获取活跃会话数
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
