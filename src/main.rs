//! Bee 工具调用编排器
//!
//! 入口：初始化日志、加载配置、组装编排器，启动 HTTP 服务直到 Ctrl+C。
//! 用法：`bee-orchestrator [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bee_orchestrator::{
    agent::{build_llm, build_orchestrator},
    config::load_config,
    observability, server,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    tracing::info!(
        "{} starting (max_history={}, max_internal_rounds={})",
        cfg.app.name.as_deref().unwrap_or("bee-orchestrator"),
        cfg.app.max_history,
        cfg.app.max_internal_rounds
    );

    let orchestrator = Arc::new(build_orchestrator(&cfg, build_llm(&cfg)));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown requested");
        signal.cancel();
    });

    server::serve(orchestrator, &cfg.server.bind, shutdown)
        .await
        .with_context(|| format!("HTTP server on {} failed", cfg.server.bind))?;

    tracing::info!("Server stopped");
    Ok(())
}
