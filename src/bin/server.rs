//! Tailord HTTP 服务：POST /chat、GET /api/health

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tailord::config::load_config;
use tailord::server::{router, spawn_session_cleanup};
use tailord::{observability, ShoppingAgent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let agent = Arc::new(ShoppingAgent::from_config(&cfg));

    // 每分钟清理一次过期会话
    spawn_session_cleanup(agent.clone(), Duration::from_secs(60));

    let addr = cfg.app.bind_addr.clone();
    tracing::info!("Tailord API: http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, router(agent)).await?;

    Ok(())
}
