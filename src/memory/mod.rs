//! 记忆层：消息模型、有界对话历史、按会话串行化的会话存储

pub mod conversation;
pub mod session_store;

pub use conversation::{
    flatten_content, ConversationMemory, Message, ToolCallPlan, ToolFailure, ToolRequest, ToolResult,
};
pub use session_store::{Session, SessionCheckpoint, SessionId, SessionSnapshot, SessionStore, SnapshotError};
