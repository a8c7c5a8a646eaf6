//! Tavily API 客户端（web_search / web_scrap 共用）
//!
//! POST JSON 到 {base_url}/search 或 /extract，Bearer 鉴权；非 2xx 与网络错误统一转为 ToolError::Upstream。

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::tools::ToolError;

pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";

#[derive(Clone)]
pub struct TavilyClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for TavilyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TavilyClient {
    pub fn new(base_url: Option<&str>, api_key: impl Into<String>, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_TAVILY_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        }
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ToolError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ToolError::Upstream(format!("request to {path} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ToolError::Upstream(format!(
                "{path} returned HTTP {status}: {}",
                detail.chars().take(300).collect::<String>()
            )));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ToolError::Upstream(format!("invalid JSON from {path}: {e}")))
    }
}
