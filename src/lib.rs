//! Bee 工具调用编排器
//!
//! 模块划分：
//! - **agent**: 按配置组装工具注册表、LLM 客户端与编排器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、请求 / 响应类型、Turn Controller 状态机
//! - **llm**: 模型调用抽象、消息翻译、OpenAI 兼容客户端、嵌入、脚本化 Mock
//! - **memory**: 消息模型与按会话串行化的会话存储
//! - **tools**: 工具目录、注册表、分类器、执行器与内部工具（web_search / web_scrap / rag_retrieve）
//! - **server**: HTTP 入口（feature `server`）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
#[cfg(feature = "server")]
pub mod server;
pub mod tools;

pub use crate::core::{ChatRequest, ChatResponse, Orchestrator, OrchestratorError};
