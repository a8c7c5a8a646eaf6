//! LLM 层：模型调用抽象、消息翻译、OpenAI 兼容客户端、嵌入、脚本化 Mock

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;
pub mod translate;

pub use embedding::{create_embedder, EmbeddingProvider, OpenAiEmbedder};
pub use mock::{RecordedCall, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{Completion, Credential, LlmClient, LlmError};
pub use translate::{
    from_external, outbound_records, to_external, ExternalFunctionCall, ExternalMessageRecord,
    ExternalToolCall, TranslateError,
};
