//! 工具调用主循环
//!
//! 调用模型 -> 若有工具调用则原样记录请求、执行全部调用并按序写回结果 -> 再调用模型；
//! 模型给出不含工具调用的回复即结束。工具轮数超过上限时不再调用模型，返回固定兜底回复。
//! 可选 event_tx：向前端推送 RoundStarted / ToolCall / Observation / FinalAnswer 等事件。
//! 可选 deadline 与 cancel_token：中止卡住的模型或工具调用。

use std::future::Future;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{ChatRequest, LlmClient};
use crate::memory::Message;
use crate::react::{TurnEvent, TurnMachine, TurnState, UserProfile, WorkingTranscript};
use crate::tools::{ToolExecutor, ToolOutput, ToolResult};

/// 达到工具轮数上限时的回复
pub const FALLBACK_MESSAGE: &str = "I hit a tool-call loop limit—try rephrasing or /reset.";

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    LoopLimitExceeded,
}

/// 单轮结果；transcript 仅供检查，不会写入持久历史
#[derive(Debug)]
pub struct TurnOutcome {
    pub answer: String,
    pub status: TurnStatus,
    /// 已完成的工具轮数
    pub rounds: usize,
    pub transcript: Vec<Message>,
}

/// 单轮配置
pub struct TurnSession<'a> {
    pub llm: &'a dyn LlmClient,
    pub executor: &'a ToolExecutor,
    pub system_prompt: &'a str,
    pub profile: &'a UserProfile,
    pub max_tool_iterations: usize,
    /// 可选：整轮截止时间
    pub deadline: Option<Instant>,
    pub cancel_token: CancellationToken,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a mpsc::UnboundedSender<TurnEvent>>,
}

impl<'a> TurnSession<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        executor: &'a ToolExecutor,
        system_prompt: &'a str,
        profile: &'a UserProfile,
        max_tool_iterations: usize,
    ) -> Self {
        Self {
            llm,
            executor,
            system_prompt,
            profile,
            max_tool_iterations,
            deadline: None,
            cancel_token: CancellationToken::new(),
            event_tx: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a mpsc::UnboundedSender<TurnEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, ev: TurnEvent) {
        if let Some(t) = self.event_tx {
            let _ = t.send(ev);
        }
    }

    /// 在截止时间与取消令牌约束下等待 fut
    async fn guarded<F: Future>(&self, fut: F) -> Result<F::Output, AgentError> {
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| AgentError::DeadlineExceeded),
                None => Ok(fut.await),
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(AgentError::Cancelled),
            r = bounded => r,
        }
    }

    fn report_results(&self, results: &[ToolResult]) {
        for r in results {
            let ev = match &r.output {
                ToolOutput::Success(_) => TurnEvent::Observation {
                    id: r.invocation_id.clone(),
                    tool: r.tool_name.clone(),
                    preview: preview(&r.content()),
                },
                ToolOutput::Failure(e) => TurnEvent::ToolFailure {
                    id: r.invocation_id.clone(),
                    tool: r.tool_name.clone(),
                    reason: e.to_string(),
                },
            };
            self.send_event(ev);
        }
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", s.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 跑完一轮对话
///
/// history 为持久历史快照（不含本轮用户消息）；本函数不修改持久历史，
/// 由调用方在成功后写回用户消息与 answer。模型调用失败、超时或取消时返回错误。
pub async fn run_turn(
    session: &TurnSession<'_>,
    history: &[Message],
    user_message: &str,
) -> Result<TurnOutcome, AgentError> {
    let mut transcript = WorkingTranscript::seed(session.system_prompt, session.profile, history, user_message);
    let specs = session.executor.specs();
    let mut machine = TurnMachine::new(session.max_tool_iterations);

    loop {
        let round = machine.rounds() + 1;
        session.send_event(TurnEvent::RoundStarted {
            round,
            max_rounds: machine.max_model_calls(),
        });
        debug_assert!(transcript.unresolved_invocations().is_empty());

        let reply = session
            .guarded(session.llm.chat(ChatRequest::with_tools(transcript.messages(), &specs)))
            .await??;

        if machine.on_model_reply(reply.has_tool_calls()) == TurnState::Done {
            let answer = reply.content.unwrap_or_default();
            tracing::info!(rounds = machine.rounds(), "turn completed");
            transcript.push_answer(&answer);
            session.send_event(TurnEvent::FinalAnswer { text: answer.clone() });
            return Ok(TurnOutcome {
                answer,
                status: TurnStatus::Completed,
                rounds: machine.rounds(),
                transcript: transcript.into_messages(),
            });
        }

        let calls = reply.tool_calls;
        for c in &calls {
            tracing::debug!(round, tool = %c.name, id = %c.id, "tool call requested");
            session.send_event(TurnEvent::ToolCall {
                id: c.id.clone(),
                tool: c.name.clone(),
                arguments: c.arguments.clone(),
            });
        }
        transcript.push_tool_request(reply.content, calls.clone());

        let results = session.guarded(session.executor.invoke_all(&calls)).await?;
        session.report_results(&results);
        transcript.push_tool_results(&results);

        if machine.on_round_complete() == TurnState::LoopLimitExceeded {
            tracing::warn!(rounds = machine.rounds(), max = session.max_tool_iterations, "tool-call loop limit reached");
            session.send_event(TurnEvent::LoopLimit { rounds: machine.rounds() });
            transcript.push_answer(FALLBACK_MESSAGE);
            return Ok(TurnOutcome {
                answer: FALLBACK_MESSAGE.to_string(),
                status: TurnStatus::LoopLimitExceeded,
                rounds: machine.rounds(),
                transcript: transcript.into_messages(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient, ModelReply};
    use crate::memory::{Role, ToolInvocationRequest};
    use crate::tools::{HandlerError, Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes args"
        }

        async fn execute(&self, args: Value) -> Result<Value, HandlerError> {
            Ok(json!({ "echo": args }))
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn execute(&self, args: Value) -> Result<Value, HandlerError> {
            Err(HandlerError::new("backend exploded", &args))
        }
    }

    struct Stall;

    #[async_trait]
    impl Tool for Stall {
        fn name(&self) -> &str {
            "stall"
        }

        fn description(&self) -> &str {
            "never returns in time"
        }

        async fn execute(&self, _args: Value) -> Result<Value, HandlerError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Value::Null)
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry.register(Broken);
        registry.register(Stall);
        ToolExecutor::new(registry, 30)
    }

    fn calls(specs: &[(&str, &str, &str)]) -> ModelReply {
        ModelReply::tool_calls(
            specs
                .iter()
                .map(|(id, name, args)| ToolInvocationRequest::new(*id, *name, *args))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let llm = MockLlmClient::scripted(vec![Ok(ModelReply::text("Hi! What vibe are you after?"))]);
        let exec = executor();
        let profile = UserProfile::default();
        let session = TurnSession::new(&llm, &exec, "SYS", &profile, 4);
        let out = run_turn(&session, &[], "hello").await.unwrap();
        assert_eq!(out.answer, "Hi! What vibe are you after?");
        assert_eq!(out.status, TurnStatus::Completed);
        assert_eq!(out.rounds, 0);
        assert_eq!(llm.call_count(), 1);
        let seen = &llm.calls()[0];
        assert_eq!(seen.tool_names, vec!["echo", "broken", "stall"]);
        assert_eq!(seen.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_every_invocation_gets_one_result_in_order() {
        let llm = MockLlmClient::scripted(vec![
            Ok(calls(&[
                ("c1", "echo", r#"{"q":"wool"}"#),
                ("c2", "catalog_serch_tool", r#"{"query":"boots"}"#),
                ("c3", "broken", r#"{"term":"goth"}"#),
                ("c4", "echo", "{not json"),
            ])),
            Ok(ModelReply::text("done")),
        ]);
        let exec = executor();
        let profile = UserProfile::default();
        let session = TurnSession::new(&llm, &exec, "SYS", &profile, 4);
        let out = run_turn(&session, &[], "find boots").await.unwrap();
        assert_eq!(out.answer, "done");
        assert_eq!(out.rounds, 1);

        let second = &llm.calls()[1].messages;
        let request = second.iter().find(|m| !m.tool_calls.is_empty()).unwrap();
        assert_eq!(request.tool_calls.len(), 4);
        let results: Vec<&Message> = second.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(results.len(), 4);
        let ids: Vec<&str> = results.iter().filter_map(|m| m.tool_call_id.as_deref()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);

        let unknown: Value = serde_json::from_str(results[1].text()).unwrap();
        assert_eq!(unknown["error"], "unknown_tool:catalog_serch_tool");
        let failed: Value = serde_json::from_str(results[2].text()).unwrap();
        assert_eq!(failed, json!({"error": "backend exploded", "args": {"term": "goth"}}));
        let malformed: Value = serde_json::from_str(results[3].text()).unwrap();
        assert_eq!(malformed, json!({"echo": {}}));
    }

    #[tokio::test]
    async fn test_loop_limit_stops_after_max_plus_one_calls() {
        let llm = MockLlmClient::always(calls(&[("loop", "echo", "{}")]));
        let exec = executor();
        let profile = UserProfile::default();
        let session = TurnSession::new(&llm, &exec, "SYS", &profile, 2);
        let out = run_turn(&session, &[], "again").await.unwrap();
        assert_eq!(out.status, TurnStatus::LoopLimitExceeded);
        assert_eq!(out.answer, FALLBACK_MESSAGE);
        assert_eq!(out.rounds, 3);
        assert_eq!(llm.call_count(), 3);
        assert_eq!(out.transcript.last().map(|m| m.text()), Some(FALLBACK_MESSAGE));
    }

    #[tokio::test]
    async fn test_model_failure_is_fatal() {
        let llm = MockLlmClient::scripted(vec![
            Ok(calls(&[("c1", "echo", "{}")])),
            Err(LlmError::Api("model overloaded".to_string())),
        ]);
        let exec = executor();
        let profile = UserProfile::default();
        let session = TurnSession::new(&llm, &exec, "SYS", &profile, 4);
        let err = run_turn(&session, &[], "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::ModelCall(LlmError::Api(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let llm = MockLlmClient::new();
        let exec = executor();
        let profile = UserProfile::default();
        let token = CancellationToken::new();
        token.cancel();
        let session = TurnSession::new(&llm, &exec, "SYS", &profile, 4).with_cancel_token(token);
        let err = run_turn(&session, &[], "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_aborts_stalled_tool() {
        let llm = MockLlmClient::scripted(vec![Ok(calls(&[("s", "stall", "{}")]))]);
        let exec = executor();
        let profile = UserProfile::default();
        let session = TurnSession::new(&llm, &exec, "SYS", &profile, 4)
            .with_deadline(Some(Instant::now() + Duration::from_millis(50)));
        let err = run_turn(&session, &[], "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::DeadlineExceeded));
    }

    /// 迟迟不返回的模型
    struct SlowModel;

    #[async_trait]
    impl LlmClient for SlowModel {
        async fn chat(&self, _request: ChatRequest<'_>) -> Result<ModelReply, LlmError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ModelReply::text("late"))
        }
    }

    #[tokio::test]
    async fn test_deadline_aborts_slow_model_call() {
        let exec = executor();
        let profile = UserProfile::default();
        let started = Instant::now();
        let session = TurnSession::new(&SlowModel, &exec, "SYS", &profile, 4)
            .with_deadline(Some(started + Duration::from_millis(50)));
        let err = run_turn(&session, &[], "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let llm = MockLlmClient::scripted(vec![
            Ok(calls(&[("c1", "echo", r#"{"a":1}"#), ("c2", "broken", "{}")])),
            Ok(ModelReply::text("ok")),
        ]);
        let exec = executor();
        let profile = UserProfile::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = TurnSession::new(&llm, &exec, "SYS", &profile, 4).with_event_tx(&tx);
        run_turn(&session, &[], "hi").await.unwrap();
        drop(session);
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(events.first(), Some(&TurnEvent::RoundStarted { round: 1, max_rounds: 5 }));
        assert!(events.iter().any(|e| matches!(e, TurnEvent::Observation { id, .. } if id == "c1")));
        assert!(events.iter().any(|e| matches!(e, TurnEvent::ToolFailure { id, .. } if id == "c2")));
        assert_eq!(events.last(), Some(&TurnEvent::FinalAnswer { text: "ok".to_string() }));
    }
}
