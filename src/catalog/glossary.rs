//! 风格词典查询：把流行穿搭黑话（如 "blokette"、"opium-coded"）映射到规范定义

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::{CatalogError, MilvusClient};
use crate::llm::Embedder;

/// 词典命中：定义文本与相似度
#[derive(Clone, Debug, PartialEq)]
pub struct GlossaryMatch {
    pub text: String,
    pub score: f32,
}

/// 词典查询协作方：仅当最佳匹配相似度超过阈值时返回定义，否则返回 None
#[async_trait]
pub trait GlossaryLookup: Send + Sync {
    async fn lookup(&self, term: &str) -> Result<Option<GlossaryMatch>, CatalogError>;
}

/// 在候选中取相似度最高者，且必须严格大于阈值
pub fn best_above_threshold(
    candidates: impl IntoIterator<Item = GlossaryMatch>,
    threshold: f32,
) -> Option<GlossaryMatch> {
    candidates
        .into_iter()
        .filter(|m| m.score > threshold)
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
}

/// 基于嵌入 + Milvus 的词典查询（collection 字段：text / embedding）
pub struct MilvusGlossary {
    client: MilvusClient,
    embedder: Arc<dyn Embedder>,
    collection: String,
    threshold: f32,
    top_k: usize,
}

impl MilvusGlossary {
    pub fn new(
        client: MilvusClient,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        threshold: f32,
        top_k: usize,
    ) -> Self {
        Self {
            client,
            embedder,
            collection: collection.into(),
            threshold,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl GlossaryLookup for MilvusGlossary {
    async fn lookup(&self, term: &str) -> Result<Option<GlossaryMatch>, CatalogError> {
        let vector = self
            .embedder
            .embed(&term.to_lowercase())
            .await
            .map_err(CatalogError::Embedding)?;
        let hits = self
            .client
            .search(&self.collection, "embedding", &vector, self.top_k, &["text"], None)
            .await?;
        let best = best_above_threshold(
            hits.into_iter().filter_map(|h| {
                let text = h.fields.get("text").and_then(Value::as_str)?.to_string();
                Some(GlossaryMatch { text, score: h.score })
            }),
            self.threshold,
        );
        tracing::debug!(term, matched = best.is_some(), "glossary lookup");
        Ok(best)
    }
}
