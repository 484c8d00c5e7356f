//! 商品目录检索：Product 记录与 CatalogSearch 协作方

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::milvus::IN_STOCK_FILTER;
use crate::catalog::{CatalogError, MilvusClient, SearchHit};
use crate::llm::Embedder;

/// 检索返回的商品记录（向量库 metadata 字段 + 相关度）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub sizes_in_stock: Vec<String>,
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

impl Product {
    /// 从一条命中构造；metadata 缺失或格式不符时返回 None
    fn from_hit(hit: SearchHit) -> Option<Self> {
        let meta = hit.fields.get("metadata").cloned().unwrap_or(Value::Null);
        let meta = match meta {
            // 部分 Milvus 版本将 JSON 字段以字符串返回
            Value::String(s) => serde_json::from_str(&s).ok()?,
            other => other,
        };
        let mut product: Product = serde_json::from_value(meta).ok()?;
        if product.id == 0 {
            product.id = hit.fields.get("id").and_then(Value::as_i64).unwrap_or(0);
        }
        product.score = hit.score;
        Some(product)
    }
}

/// 商品目录检索协作方：自由文本 + 条数上限 → 按相关度降序的商品
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Product>, CatalogError>;
}

/// 基于嵌入 + Milvus 的商品检索
pub struct MilvusCatalog {
    client: MilvusClient,
    embedder: Arc<dyn Embedder>,
    collection: String,
    only_in_stock: bool,
}

impl MilvusCatalog {
    /// 默认只返回有货商品
    pub fn new(client: MilvusClient, embedder: Arc<dyn Embedder>, collection: impl Into<String>) -> Self {
        Self {
            client,
            embedder,
            collection: collection.into(),
            only_in_stock: true,
        }
    }

    pub fn with_only_in_stock(mut self, only_in_stock: bool) -> Self {
        self.only_in_stock = only_in_stock;
        self
    }

    fn filter(&self) -> Option<&'static str> {
        self.only_in_stock.then_some(IN_STOCK_FILTER)
    }
}

#[async_trait]
impl CatalogSearch for MilvusCatalog {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Product>, CatalogError> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(CatalogError::Embedding)?;
        let hits = self
            .client
            .search(
                &self.collection,
                "vector",
                &vector,
                top_k,
                &["id", "metadata"],
                self.filter(),
            )
            .await?;
        let total = hits.len();
        let products: Vec<Product> = hits.into_iter().filter_map(Product::from_hit).collect();
        if products.len() < total {
            tracing::warn!(
                dropped = total - products.len(),
                collection = %self.collection,
                "catalog hits without usable metadata"
            );
        }
        Ok(products)
    }
}
