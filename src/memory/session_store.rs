//! 会话存储
//!
//! session_id -> Session 的进程内映射。会话在首次引用时惰性创建，从不主动过期。
//! 每个会话有独立的互斥锁：同一会话的调用串行，不同会话并行。
//! Turn Controller 在整个调用期间持有该锁，保证历史追加顺序与步骤顺序一致。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::conversation::{ConversationMemory, Message, ToolCallPlan};

/// 会话 ID（调用方给出的不透明字符串）
pub type SessionId = String;

/// 单个会话：有界历史 + 至多一个待回填的外部工具计划
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    history: ConversationMemory,
    pending_plan: Option<ToolCallPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, max_history: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            history: ConversationMemory::new(max_history),
            pending_plan: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn append(&mut self, message: Message) {
        self.history.push(message);
        self.updated_at = Utc::now();
    }

    pub fn history(&self) -> Vec<Message> {
        self.history.messages()
    }

    pub fn orphaned_tool_ids(&self) -> Vec<&str> {
        self.history.orphaned_tool_ids()
    }

    /// 记下当前历史与待回填计划，失败时用 restore 原样恢复
    pub fn checkpoint(&self) -> SessionCheckpoint {
        SessionCheckpoint {
            history: self.history.clone(),
            pending_plan: self.pending_plan.clone(),
            updated_at: self.updated_at,
        }
    }

    pub fn restore(&mut self, checkpoint: SessionCheckpoint) {
        self.history = checkpoint.history;
        self.pending_plan = checkpoint.pending_plan;
        self.updated_at = checkpoint.updated_at;
    }

    pub fn pending_plan(&self) -> Option<&ToolCallPlan> {
        self.pending_plan.as_ref()
    }

    pub fn set_pending_plan(&mut self, plan: ToolCallPlan) {
        self.pending_plan = Some(plan);
        self.updated_at = Utc::now();
    }

    pub fn take_pending_plan(&mut self) -> Option<ToolCallPlan> {
        self.pending_plan.take()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            history: self.history(),
            pending_plan: self.pending_plan.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionCheckpoint {
    history: ConversationMemory,
    pending_plan: Option<ToolCallPlan>,
    updated_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Session {0} not found")]
    NotFound(SessionId),

    #[error("Session {0} is busy with a running turn")]
    Busy(SessionId),
}

/// 会话只读快照（供检查与排障）
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub history: Vec<Message>,
    pub pending_plan: Option<ToolCallPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 会话存储：外层 RwLock 只保护映射本身，内层 Mutex 按会话串行化
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    max_history: usize,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history,
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    async fn entry(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "session created");
                Arc::new(Mutex::new(Session::new(session_id, self.max_history)))
            })
            .clone()
    }

    /// 获取会话的独占句柄（不存在则创建）；句柄存活期间同一会话的其他调用等待
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<Session> {
        self.entry(session_id).await.lock_owned().await
    }

    pub async fn append(&self, session_id: &str, message: Message) {
        self.acquire(session_id).await.append(message);
    }

    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        self.acquire(session_id).await.history()
    }

    /// 只读查看，不创建会话；会话正被某次调用持有时立即返回 Busy，不等待
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SnapshotError> {
        let session = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SnapshotError::NotFound(session_id.to_string()))?;
        let guard = session
            .try_lock()
            .map_err(|_| SnapshotError::Busy(session_id.to_string()))?;
        Ok(guard.snapshot())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(20)
    }
}
