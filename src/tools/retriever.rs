//! rag_retrieve 工具：向量检索本地文档索引
//!
//! 索引文件是预先嵌入好的 JSON 数组 `[{"id","text","metadata","embedding":[..]}]`，启动时载入内存；
//! 查询时先嵌入用户问题，再按余弦相似度取前 top_k 条。

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::llm::EmbeddingProvider;
use crate::tools::registry::{parse_args, schema_of};
use crate::tools::{Tool, ToolError};

/// 索引中的一篇文档
#[derive(Debug, Clone, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

/// 内存文档索引
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    documents: Vec<IndexedDocument>,
}

impl DocumentIndex {
    pub fn new(documents: Vec<IndexedDocument>) -> Self {
        Self { documents }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let documents: Vec<IndexedDocument> = serde_json::from_str(&raw)?;
        Ok(Self::new(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// 按相似度降序返回前 k 条
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(&IndexedDocument, f32)> {
        let mut scored: Vec<(&IndexedDocument, f32)> = self
            .documents
            .iter()
            .map(|doc| (doc, cosine_similarity(query, &doc.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Deserialize, JsonSchema)]
struct RetrieveArgs {
    /// The user query from which to retrieve relevant documents.
    user_query: String,
}

pub struct RetrieverTool {
    embedder: Arc<dyn EmbeddingProvider>,
    index: DocumentIndex,
    top_k: usize,
}

impl RetrieverTool {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: DocumentIndex, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }
}

#[async_trait]
impl Tool for RetrieverTool {
    fn name(&self) -> &str {
        "rag_retrieve"
    }

    fn description(&self) -> &str {
        "Retrieves and ranks documents relevant to the user query using vector search."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<RetrieveArgs>()
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let args: RetrieveArgs = parse_args(args)?;
        let embedding = self
            .embedder
            .embed(&args.user_query)
            .await
            .map_err(ToolError::Upstream)?;
        if embedding.is_empty() {
            return Err(ToolError::InvalidArguments("user_query must not be empty".into()));
        }

        let documents: Vec<Value> = self
            .index
            .search(&embedding, self.top_k)
            .into_iter()
            .map(|(doc, score)| {
                json!({
                    "id": doc.id,
                    "text": doc.text,
                    "metadata": doc.metadata,
                    "similarity": score,
                })
            })
            .collect();
        tracing::info!(count = documents.len(), "retriever finished");

        Ok(json!({
            "result_count": documents.len(),
            "documents": documents,
        }))
    }
}
