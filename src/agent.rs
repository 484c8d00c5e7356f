//! Headless Agent 运行时
//!
//! 供 CLI 与 HTTP 前端调用：create_agent_components 按配置构建模型客户端、工具集与系统提示词，
//! ShoppingAgent::chat 对单条用户输入在会话锁内跑一轮对话并写回持久历史。
//!
//! 写回策略：先取历史快照，本轮用户消息只进入工作对话；成功（含达到轮数上限的兜底回复）后
//! 才把用户消息与回复一并追加到持久历史。整轮失败时持久历史保持不变。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::catalog::{
    CatalogSearch, GlossaryLookup, LlmQueryNormalizer, MilvusCatalog, MilvusClient, MilvusGlossary,
    QueryNormalizer,
};
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_embedder_from_config, create_llm_from_config, LlmClient};
use crate::memory::Message;
use crate::react::{load_system_prompt, run_turn, TurnEvent, TurnSession, TurnStatus, UserProfile};
use crate::session::SessionStore;
use crate::tools::{shopping_registry, ToolExecutor};

/// 预构建的 Agent 组件：模型客户端、工具执行器、系统提示词，可多会话共享
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub executor: ToolExecutor,
    pub system_prompt: String,
    pub max_tool_iterations: usize,
    /// 未显式给出截止时间时的整轮超时
    pub turn_timeout: Option<Duration>,
}

/// 用三个协作方构建工具执行器（glossary → normalizer → catalog）
pub fn build_executor(
    cfg: &AppConfig,
    catalog: Arc<dyn CatalogSearch>,
    glossary: Arc<dyn GlossaryLookup>,
    normalizer: Arc<dyn QueryNormalizer>,
) -> ToolExecutor {
    let registry = shopping_registry(
        catalog,
        glossary,
        normalizer,
        cfg.tools.catalog.default_top_k,
        cfg.tools.catalog.max_top_k,
    );
    ToolExecutor::new(registry, cfg.tools.tool_timeout_secs).with_parallel(cfg.orchestrator.parallel_tools)
}

/// 创建 Agent 组件：对话模型、规范化模型、嵌入 + Milvus 检索、系统提示词
pub fn create_agent_components(cfg: &AppConfig) -> AgentComponents {
    let llm = create_llm_from_config(&cfg.llm, &cfg.llm.model);
    let normalizer_llm = create_llm_from_config(&cfg.llm, &cfg.llm.normalizer_model);

    let embedding_base = cfg
        .vector
        .embedding_base_url
        .as_deref()
        .or(cfg.llm.base_url.as_deref());
    let embedder = create_embedder_from_config(
        embedding_base,
        &cfg.vector.embedding_model,
        cfg.llm.api_key.as_deref(),
    );
    let milvus = MilvusClient::new(
        &cfg.vector.milvus_url,
        cfg.vector.token.as_deref(),
        cfg.vector.request_timeout_secs,
    );

    let catalog = Arc::new(
        MilvusCatalog::new(milvus.clone(), embedder.clone(), cfg.tools.catalog.collection.clone())
            .with_only_in_stock(cfg.tools.catalog.only_in_stock),
    );
    let glossary = Arc::new(MilvusGlossary::new(
        milvus,
        embedder,
        cfg.tools.glossary.collection.clone(),
        cfg.tools.glossary.threshold,
        cfg.tools.glossary.top_k,
    ));
    let normalizer = Arc::new(LlmQueryNormalizer::new(normalizer_llm));

    let executor = build_executor(cfg, catalog, glossary, normalizer);
    tracing::info!(tools = ?executor.tool_names(), "agent tools registered");
    AgentComponents::new(
        llm,
        executor,
        load_system_prompt(cfg.app.system_prompt_path.as_deref()),
        cfg,
    )
}

impl AgentComponents {
    pub fn new(llm: Arc<dyn LlmClient>, executor: ToolExecutor, system_prompt: String, cfg: &AppConfig) -> Self {
        Self {
            llm,
            executor,
            system_prompt,
            max_tool_iterations: cfg.orchestrator.max_tool_iterations,
            turn_timeout: cfg.orchestrator.turn_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// 一次对话请求
#[derive(Debug, Default)]
pub struct ChatTurn {
    pub session_id: String,
    pub message: String,
    /// 先清空该会话历史
    pub reset: bool,
    /// 覆盖会话画像
    pub profile: Option<UserProfile>,
    /// 整轮截止时间；None 时使用 turn_timeout
    pub deadline: Option<Instant>,
}

impl ChatTurn {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }
}

/// 一次对话的回复：文本与该会话持久历史中的消息数
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub reply: String,
    pub turns: usize,
    pub status: TurnStatus,
}

/// 多会话购物助手
pub struct ShoppingAgent {
    components: AgentComponents,
    sessions: SessionStore,
}

impl ShoppingAgent {
    pub fn new(components: AgentComponents, sessions: SessionStore) -> Self {
        Self { components, sessions }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let sessions = SessionStore::new(
            cfg.app.max_history,
            cfg.app.session_timeout_secs,
            cfg.app.session_lock_timeout_secs,
        )
        .with_default_profile(UserProfile::from(&cfg.profile));
        Self::new(create_agent_components(cfg), sessions)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn components(&self) -> &AgentComponents {
        &self.components
    }

    /// 处理单条用户消息（无事件推送）
    pub async fn chat(&self, turn: ChatTurn) -> Result<ChatReply, AgentError> {
        self.chat_with_events(turn, None, CancellationToken::new()).await
    }

    /// 处理单条用户消息：可选 event_tx 推送过程事件，cancel_token 可中止本轮
    pub async fn chat_with_events(
        &self,
        turn: ChatTurn,
        event_tx: Option<&mpsc::UnboundedSender<TurnEvent>>,
        cancel_token: CancellationToken,
    ) -> Result<ChatReply, AgentError> {
        let mut session = self.sessions.acquire(&turn.session_id).await?;

        // reset 与画像覆盖随本轮一起提交，失败时会话保持原样
        let history = if turn.reset {
            Vec::new()
        } else {
            session.history.snapshot()
        };
        let profile = turn.profile.unwrap_or_else(|| session.profile.clone());
        let deadline = turn
            .deadline
            .or_else(|| self.components.turn_timeout.map(|t| Instant::now() + t));

        let mut turn_session = TurnSession::new(
            self.components.llm.as_ref(),
            &self.components.executor,
            &self.components.system_prompt,
            &profile,
            self.components.max_tool_iterations,
        )
        .with_deadline(deadline)
        .with_cancel_token(cancel_token);
        if let Some(tx) = event_tx {
            turn_session = turn_session.with_event_tx(tx);
        }

        let outcome = match run_turn(&turn_session, &history, &turn.message).await {
            Ok(o) => o,
            Err(e) => {
                tracing::error!(session_id = %turn.session_id, error = %e, "turn failed, history unchanged");
                return Err(e);
            }
        };
        drop(turn_session);

        if turn.reset {
            tracing::info!(session_id = %turn.session_id, "session history reset");
            session.history.reset();
        }
        session.profile = profile;
        session.history.append(Message::user(turn.message));
        session.history.append(Message::assistant(outcome.answer.clone()));
        session.touch();

        Ok(ChatReply {
            reply: outcome.answer,
            turns: session.history.turn_count(),
            status: outcome.status,
        })
    }
}
