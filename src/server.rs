//! HTTP 接口（feature = "web"）
//!
//! - POST /chat：`{message, reset?, session_id?}` → `{reply, turns, session_id}`
//! - GET /api/health
//!
//! 未给 session_id 时使用 "default" 会话，所有此类请求共享同一份历史。

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::agent::{ChatTurn, ShoppingAgent};
use crate::core::AgentError;

pub const DEFAULT_SESSION_ID: &str = "default";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub turns: usize,
    pub session_id: String,
}

pub fn router(agent: Arc<ShoppingAgent>) -> Router {
    Router::new()
        .route("/chat", post(api_chat))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(agent)
}

async fn api_chat(
    State(agent): State<Arc<ShoppingAgent>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

    let turn = ChatTurn::new(session_id.clone(), message).with_reset(req.reset);
    match agent.chat(turn).await {
        Ok(r) => Ok(Json(ChatResponse {
            reply: r.reply,
            turns: r.turns,
            session_id,
        })),
        Err(e @ AgentError::SessionBusy(_)) => Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, format!("agent_error: {e}"))),
    }
}

/// 后台定期清理过期会话
pub fn spawn_session_cleanup(agent: Arc<ShoppingAgent>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            agent.sessions().cleanup_expired().await;
        }
    })
}
