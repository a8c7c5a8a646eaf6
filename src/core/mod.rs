//! 核心编排层：错误分类、请求 / 响应类型、Turn Controller 状态机

pub mod error;
pub mod orchestrator;
pub mod request;

pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, TurnState, DEFAULT_MAX_INTERNAL_ROUNDS, DEFAULT_MODEL_TIMEOUT_SECS};
pub use request::{ChatRequest, ChatResponse, ErrorBody, ErrorResponse, PlannedCall, ToolResultItem, TurnInput};
