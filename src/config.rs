//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__LLM__MODEL=gpt-4o`）。
//! 所有键都有默认值，没有配置文件也能启动。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、会话历史上限、单次调用内部工具轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 每个会话保留的消息条数（FIFO 淘汰最旧的）
    pub max_history: usize,
    pub max_internal_rounds: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_history: 20,
            max_internal_rounds: crate::core::DEFAULT_MAX_INTERNAL_ROUNDS,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点、模型、默认 Key、system prompt 与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    /// 未设置时读环境变量 OPENAI_API_KEY；请求头里的 Key 优先
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub system_prompt_path: Option<PathBuf>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: crate::llm::openai::DEFAULT_BASE_URL.to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            system_prompt: None,
            system_prompt_path: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: crate::core::DEFAULT_MODEL_TIMEOUT_SECS,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they help answer \
the user's request, and answer directly when they do not.";

impl LlmSection {
    /// system prompt 优先级：system_prompt_path 文件 > system_prompt > 内置默认
    pub fn resolve_system_prompt(&self) -> String {
        if let Some(path) = &self.system_prompt_path {
            match std::fs::read_to_string(path) {
                Ok(prompt) if !prompt.trim().is_empty() => return prompt,
                Ok(_) => tracing::warn!("System prompt file {} is empty, ignoring", path.display()),
                Err(e) => tracing::warn!("Failed to read system prompt {}: {}", path.display(), e),
            }
        }
        self.system_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }
}

/// [tools] 段：工具超时与各内部工具的配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 注册诊断用的 echo 工具
    pub echo: bool,
    pub tavily: TavilySection,
    pub retriever: RetrieverSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            echo: false,
            tavily: TavilySection::default(),
            retriever: RetrieverSection::default(),
        }
    }
}

/// [tools.tavily] 段：web_search / web_scrap 共用
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TavilySection {
    /// 未设置时读环境变量 TAVILY_API_KEY；两者都没有则不注册这两个工具
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_results: usize,
    pub chunks_per_source: usize,
    pub max_result_chars: usize,
}

impl Default for TavilySection {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: crate::tools::tavily::DEFAULT_TAVILY_BASE_URL.to_string(),
            max_results: 5,
            chunks_per_source: 3,
            max_result_chars: 8000,
        }
    }
}

impl TavilySection {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("TAVILY_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// [tools.retriever] 段：rag_retrieve 的本地索引与嵌入模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieverSection {
    /// 预先嵌入好的文档索引（JSON）；未设置则不注册 rag_retrieve
    pub index_path: Option<PathBuf>,
    pub embedding_model: String,
    pub top_k: usize,
}

impl Default for RetrieverSection {
    fn default() -> Self {
        Self {
            index_path: None,
            embedding_model: "text-embedding-3-small".to_string(),
            top_k: 20,
        }
    }
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, skipping", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
