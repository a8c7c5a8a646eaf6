//! 运行时组装
//!
//! build_registry 按配置注册内部工具（缺凭据或索引的工具跳过并告警），
//! build_orchestrator 再接上 LLM 客户端与会话存储，供 HTTP 入口等调用。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::Orchestrator;
use crate::llm::{create_embedder, LlmClient, OpenAiClient};
use crate::memory::SessionStore;
use crate::tools::{
    DocumentIndex, EchoTool, RetrieverTool, TavilyClient, ToolExecutor, ToolRegistry, WebScrapTool,
    WebSearchTool,
};

/// 按配置构建内部工具注册表；注册表在启动后只读
pub fn build_registry(cfg: &AppConfig) -> ToolRegistry {
    let mut tools = ToolRegistry::new();

    if cfg.tools.echo {
        tools.register(EchoTool);
    }

    let tavily = &cfg.tools.tavily;
    match tavily.resolve_api_key() {
        Some(key) => {
            let client = TavilyClient::new(Some(&tavily.base_url), key, cfg.tools.tool_timeout_secs);
            tools.register(WebSearchTool::new(
                client.clone(),
                tavily.max_results,
                tavily.chunks_per_source,
            ));
            tools.register(WebScrapTool::new(client, tavily.max_result_chars));
        }
        None => tracing::warn!("No Tavily API key configured, web_search and web_scrap are disabled"),
    }

    let retriever = &cfg.tools.retriever;
    if let Some(path) = &retriever.index_path {
        let embedder = create_embedder(
            Some(&cfg.llm.base_url),
            &retriever.embedding_model,
            cfg.llm.api_key.as_deref(),
        );
        match (embedder, DocumentIndex::load(path)) {
            (Some(embedder), Ok(index)) => {
                tracing::info!("Loaded retriever index {} ({} documents)", path.display(), index.len());
                tools.register(RetrieverTool::new(embedder, index, retriever.top_k));
            }
            (None, _) => tracing::warn!("No OpenAI API key for embeddings, rag_retrieve is disabled"),
            (_, Err(e)) => tracing::warn!("Failed to load retriever index {}: {:#}", path.display(), e),
        }
    }

    tools
}

pub fn build_llm(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let client = OpenAiClient::new(
        Some(&cfg.llm.base_url),
        &cfg.llm.model,
        cfg.llm.api_key.as_deref(),
        cfg.llm.timeouts.request,
    )
    .with_system_prompt(cfg.llm.resolve_system_prompt());
    tracing::info!("Using OpenAI-compatible LLM ({} at {})", cfg.llm.model, cfg.llm.base_url);
    Arc::new(client)
}

/// 组装编排器；llm 由调用方传入，便于测试替换为脚本化客户端
pub fn build_orchestrator(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Orchestrator {
    let registry = build_registry(cfg);
    let mut names: Vec<String> = registry.tool_names().into_iter().collect();
    names.sort();
    tracing::info!("Internal tools: [{}]", names.join(", "));

    Orchestrator::new(
        llm,
        ToolExecutor::new(registry, cfg.tools.tool_timeout_secs),
        SessionStore::new(cfg.app.max_history),
    )
    .with_max_internal_rounds(cfg.app.max_internal_rounds)
    .with_model_timeout(std::time::Duration::from_secs(cfg.llm.timeouts.request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[test]
    fn test_tools_without_credentials_are_skipped() {
        let mut cfg = AppConfig::default();
        cfg.tools.echo = true;
        // 显式配置为空串时不回退到环境变量
        cfg.tools.tavily.api_key = Some(String::new());
        let registry = build_registry(&cfg);
        assert!(registry.contains("echo"));
        assert!(!registry.contains("web_search"));
        assert!(!registry.contains("rag_retrieve"));
    }

    #[test]
    fn test_tavily_tools_registered_with_key() {
        let mut cfg = AppConfig::default();
        cfg.tools.tavily.api_key = Some("tvly-test".into());
        let registry = build_registry(&cfg);
        assert!(registry.contains("web_search"));
        assert!(registry.contains("web_scrap"));
        assert!(!registry.contains("echo"));
    }

    #[tokio::test]
    async fn test_build_orchestrator_uses_configured_history_bound() {
        let mut cfg = AppConfig::default();
        cfg.app.max_history = 3;
        let orch = build_orchestrator(&cfg, Arc::new(ScriptedLlmClient::new()));
        assert_eq!(orch.sessions().max_history(), 3);
    }
}
