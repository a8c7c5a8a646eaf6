//! Turn Controller：单次调用的显式状态机
//!
//! 入口（新问题 / 回填外部工具结果） -> AwaitingModel -> Classifying ->
//! ExecutingInternal（执行后回到 AwaitingModel，不把控制权交还调用方）
//! 或 ReturningExternalPlan（挂起，等调用方下次带结果回来）或 Final。
//!
//! 整个调用期间持有会话锁：同一会话的调用端到端串行，不同会话并行。
//! 任何未恢复的失败都以显式错误结束本次调用，会话中已追加的消息保留；
//! 例外是模型回复无法翻译、或本次追加的工具结果已被 FIFO 剪成孤儿：此时会话恢复到调用开始前。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::core::{ChatRequest, ChatResponse, OrchestratorError, TurnInput};
use crate::llm::{Completion, Credential, LlmClient, LlmError};
use crate::memory::{Session, SessionId, SessionSnapshot, SessionStore, ToolCallPlan, ToolResult};
use crate::tools::{classify, merge_catalogs, CatalogEntry, ToolExecutor};

/// 单次调用内最多执行的内部工具轮数，防止模型反复调用工具形成死循环
pub const DEFAULT_MAX_INTERNAL_ROUNDS: usize = 8;
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;

/// 调用内的状态；每个状态携带进入它所需的数据
#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    AwaitingModel,
    Classifying(ToolCallPlan),
    ExecutingInternal(ToolCallPlan),
    ReturningExternalPlan(ToolCallPlan),
    Final(String),
}

impl TurnState {
    pub fn name(&self) -> &'static str {
        match self {
            TurnState::AwaitingModel => "awaiting_model",
            TurnState::Classifying(_) => "classifying",
            TurnState::ExecutingInternal(_) => "executing_internal",
            TurnState::ReturningExternalPlan(_) => "returning_external_plan",
            TurnState::Final(_) => "final",
        }
    }
}

/// 编排器：模型客户端 + 内部工具执行器 + 会话存储，可在多个请求间共享
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    sessions: SessionStore,
    max_internal_rounds: usize,
    model_timeout: Duration,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, executor: ToolExecutor, sessions: SessionStore) -> Self {
        Self {
            llm,
            executor,
            sessions,
            max_internal_rounds: DEFAULT_MAX_INTERNAL_ROUNDS,
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
        }
    }

    pub fn with_max_internal_rounds(mut self, rounds: usize) -> Self {
        self.max_internal_rounds = rounds;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn internal_tool_names(&self) -> &HashSet<String> {
        self.executor.internal_names()
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, OrchestratorError> {
        Ok(self.sessions.snapshot(session_id).await?)
    }

    /// 处理一次调用；session_id 缺省时生成新的 `session_<uuid>`
    pub async fn handle(
        &self,
        request: ChatRequest,
        credential: Option<Credential>,
    ) -> Result<ChatResponse, OrchestratorError> {
        let input = request.validate()?;
        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_session_id);
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("turn", session_id = %session_id, request_id = %request_id);

        async move {
            let catalog = merge_catalogs(self.executor.catalog(), &request.tools);
            let result = self
                .run_turn(&session_id, input, &catalog, credential.as_ref())
                .await;
            match &result {
                Ok(response) => tracing::info!(pending = response.is_pending(), "turn finished"),
                Err(e) => tracing::warn!(kind = e.kind(), error = %e, "turn failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_turn(
        &self,
        session_id: &SessionId,
        input: TurnInput,
        catalog: &[CatalogEntry],
        credential: Option<&Credential>,
    ) -> Result<ChatResponse, OrchestratorError> {
        let mut session = self.sessions.acquire(session_id).await;
        let checkpoint = session.checkpoint();
        let result = self
            .drive(&mut session, session_id, input, catalog, credential)
            .await;
        if let Err(e) = &result {
            if e.restores_session() {
                tracing::debug!(kind = e.kind(), "session restored to turn entry");
                session.restore(checkpoint);
            }
        }
        result
    }

    async fn drive(
        &self,
        session: &mut Session,
        session_id: &SessionId,
        input: TurnInput,
        catalog: &[CatalogEntry],
        credential: Option<&Credential>,
    ) -> Result<ChatResponse, OrchestratorError> {
        // 本次调用追加的 tool 消息 id；它们必须在发给模型时仍有对应的 assistant 请求
        let mut fresh_ids: HashSet<String> = self.enter(session, input)?;

        let mut state = TurnState::AwaitingModel;
        let mut rounds = 0usize;
        loop {
            tracing::debug!(state = state.name(), "turn state");
            state = match state {
                TurnState::AwaitingModel => {
                    let orphaned: Vec<String> = session
                        .orphaned_tool_ids()
                        .into_iter()
                        .filter(|id| fresh_ids.contains(*id))
                        .map(str::to_string)
                        .collect();
                    if !orphaned.is_empty() {
                        return Err(OrchestratorError::OrphanedToolResults(orphaned));
                    }
                    let completion = self.call_model(session, catalog, credential).await?;
                    if completion.has_tool_requests() {
                        let plan = completion.tool_requests.clone();
                        session.append(completion.into_message());
                        TurnState::Classifying(plan)
                    } else {
                        let text = completion.text.clone().unwrap_or_default();
                        session.append(completion.into_message());
                        TurnState::Final(text)
                    }
                }
                TurnState::Classifying(plan) => {
                    let classified = classify(&plan, self.executor.internal_names());
                    if classified.is_mixed() {
                        return Err(OrchestratorError::MixedPlan {
                            internal: classified.internal.into_iter().map(|r| r.name).collect(),
                            external: classified.external.into_iter().map(|r| r.name).collect(),
                        });
                    }
                    if classified.internal.is_empty() {
                        TurnState::ReturningExternalPlan(classified.external)
                    } else {
                        TurnState::ExecutingInternal(classified.internal)
                    }
                }
                TurnState::ExecutingInternal(plan) => {
                    rounds += 1;
                    if rounds > self.max_internal_rounds {
                        return Err(OrchestratorError::RoundLimitExceeded(self.max_internal_rounds));
                    }
                    let results = self.executor.execute_plan(&plan).await?;
                    let failed = results.iter().filter(|r| r.is_error()).count();
                    tracing::info!(round = rounds, calls = results.len(), failed, "internal tools executed");
                    for result in results {
                        fresh_ids.insert(result.tool_call_id.clone());
                        session.append(result.into_message());
                    }
                    TurnState::AwaitingModel
                }
                TurnState::ReturningExternalPlan(plan) => {
                    let response = ChatResponse::pending(session_id.clone(), &plan);
                    session.set_pending_plan(plan);
                    return Ok(response);
                }
                TurnState::Final(text) => {
                    return Ok(ChatResponse::completed(session_id.clone(), text));
                }
            };
        }
    }

    /// 入口：新问题追加 user 消息；回填结果先与待回填计划核对，再按给出的顺序追加 tool 消息。
    /// 返回追加的 tool 消息 id。
    fn enter(&self, session: &mut Session, input: TurnInput) -> Result<HashSet<String>, OrchestratorError> {
        let mut appended = HashSet::new();
        match input {
            TurnInput::NewQuery(query) => {
                if session.pending_plan().is_some() {
                    return Err(OrchestratorError::PlanConflict(session.id.clone()));
                }
                session.append(crate::memory::Message::user(query));
            }
            TurnInput::Resume(results) => {
                let pending = session.pending_plan().ok_or_else(|| {
                    OrchestratorError::PlanMismatch(format!(
                        "session {} has no pending tool call plan",
                        session.id
                    ))
                })?;
                reconcile(pending, &results).map_err(OrchestratorError::PlanMismatch)?;
                session.take_pending_plan();
                for result in results {
                    appended.insert(result.tool_call_id.clone());
                    session.append(result.into_message());
                }
            }
        }
        Ok(appended)
    }

    async fn call_model(
        &self,
        session: &Session,
        catalog: &[CatalogEntry],
        credential: Option<&Credential>,
    ) -> Result<Completion, OrchestratorError> {
        let history = session.history();
        let completion = tokio::time::timeout(
            self.model_timeout,
            self.llm.complete(&history, catalog, credential),
        )
        .await
        .map_err(|_| LlmError::Timeout(self.model_timeout.as_secs()))??;
        tracing::debug!(
            tool_requests = completion.tool_requests.len(),
            has_text = completion.text.is_some(),
            "model replied"
        );
        Ok(completion)
    }
}

fn new_session_id() -> SessionId {
    format!("session_{}", uuid::Uuid::new_v4())
}

/// 回填结果必须恰好覆盖待回填计划的 id：不缺、不多、不重复
fn reconcile(pending: &ToolCallPlan, results: &[ToolResult]) -> Result<(), String> {
    let expected: HashSet<&str> = pending.iter().map(|r| r.id.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    for result in results {
        let id = result.tool_call_id.as_str();
        if !expected.contains(id) {
            return Err(format!("unexpected tool_call_id `{id}`"));
        }
        if !seen.insert(id) {
            return Err(format!("duplicate tool_call_id `{id}`"));
        }
    }
    let missing: Vec<&str> = pending
        .iter()
        .map(|r| r.id.as_str())
        .filter(|id| !seen.contains(id))
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing results for {}", missing.join(", ")));
    }
    Ok(())
}
