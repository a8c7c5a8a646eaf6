//! 编排器错误类型
//!
//! 每个变体有稳定的 kind（snake_case，出现在错误响应里）和客户端 / 服务端归类。
//! 工具自身的执行失败不在这里：它们被就地转成带错误标记的 ToolResult。

use thiserror::Error;

use crate::llm::{LlmError, TranslateError};
use crate::memory::SnapshotError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unknown message role: {0}")]
    UnknownRole(String),

    #[error("Malformed message record: {0}")]
    MalformedRecord(String),

    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    #[error("Model requested internal tools {internal:?} and external tools {external:?} in the same turn")]
    MixedPlan {
        internal: Vec<String>,
        external: Vec<String>,
    },

    #[error("Unknown internal tool: {0}")]
    UnknownTool(String),

    #[error("Session {0} already has a pending tool call plan")]
    PlanConflict(String),

    #[error("Tool results do not match the pending plan: {0}")]
    PlanMismatch(String),

    #[error("Internal tool rounds exceeded limit of {0}")]
    RoundLimitExceeded(usize),

    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Tool results {0:?} no longer answer any request in the session history")]
    OrphanedToolResults(Vec<String>),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session {0} is busy with a running turn")]
    SessionBusy(String),
}

impl OrchestratorError {
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::MalformedRequest(_) => "malformed_request",
            OrchestratorError::UnknownRole(_) => "unknown_role",
            OrchestratorError::MalformedRecord(_) => "malformed_record",
            OrchestratorError::InvalidToolArguments { .. } => "invalid_tool_arguments",
            OrchestratorError::MixedPlan { .. } => "mixed_plan",
            OrchestratorError::UnknownTool(_) => "unknown_tool",
            OrchestratorError::PlanConflict(_) => "plan_conflict",
            OrchestratorError::PlanMismatch(_) => "plan_mismatch",
            OrchestratorError::RoundLimitExceeded(_) => "round_limit_exceeded",
            OrchestratorError::CollaboratorUnavailable(_) => "collaborator_unavailable",
            OrchestratorError::OrphanedToolResults(_) => "orphaned_tool_results",
            OrchestratorError::SessionNotFound(_) => "session_not_found",
            OrchestratorError::SessionBusy(_) => "session_busy",
        }
    }

    /// 调用方可以通过修正请求解决的错误
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::MalformedRequest(_)
                | OrchestratorError::PlanConflict(_)
                | OrchestratorError::PlanMismatch(_)
                | OrchestratorError::SessionNotFound(_)
                | OrchestratorError::SessionBusy(_)
        )
    }

    /// 这些失败发生时会话必须回到调用开始前的样子
    pub fn restores_session(&self) -> bool {
        matches!(
            self,
            OrchestratorError::UnknownRole(_)
                | OrchestratorError::MalformedRecord(_)
                | OrchestratorError::InvalidToolArguments { .. }
                | OrchestratorError::OrphanedToolResults(_)
        )
    }
}

impl From<SnapshotError> for OrchestratorError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::NotFound(id) => OrchestratorError::SessionNotFound(id),
            SnapshotError::Busy(id) => OrchestratorError::SessionBusy(id),
        }
    }
}

impl From<TranslateError> for OrchestratorError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::UnknownRole(role) => OrchestratorError::UnknownRole(role),
            TranslateError::MissingField(field) => OrchestratorError::MalformedRecord(field),
            TranslateError::InvalidArguments { tool, reason } => {
                OrchestratorError::InvalidToolArguments { tool, reason }
            }
        }
    }
}

impl From<LlmError> for OrchestratorError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Translate(inner) => inner.into(),
            other => OrchestratorError::CollaboratorUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(OrchestratorError::MalformedRequest("x".into()).is_client_error());
        assert!(OrchestratorError::PlanConflict("s".into()).is_client_error());
        assert!(!OrchestratorError::UnknownTool("t".into()).is_client_error());
        assert!(!OrchestratorError::MixedPlan {
            internal: vec![],
            external: vec![]
        }
        .is_client_error());
    }

    #[test]
    fn test_translate_errors_keep_their_kind() {
        let err: OrchestratorError = LlmError::Translate(TranslateError::UnknownRole("robot".into())).into();
        assert_eq!(err.kind(), "unknown_role");

        let err: OrchestratorError = LlmError::Timeout(60).into();
        assert_eq!(err.kind(), "collaborator_unavailable");
    }

    #[test]
    fn test_snapshot_errors_are_client_errors() {
        let err: OrchestratorError = SnapshotError::Busy("s1".into()).into();
        assert_eq!(err.kind(), "session_busy");
        assert!(err.is_client_error());
        let err: OrchestratorError = SnapshotError::NotFound("s1".into()).into();
        assert_eq!(err.kind(), "session_not_found");
    }

    #[test]
    fn test_restoring_errors() {
        assert!(OrchestratorError::UnknownRole("robot".into()).restores_session());
        assert!(OrchestratorError::OrphanedToolResults(vec!["a".into()]).restores_session());
        assert!(!OrchestratorError::RoundLimitExceeded(8).restores_session());
        assert!(!OrchestratorError::CollaboratorUnavailable("down".into()).restores_session());
    }
}
