//! 外部协作方：商品目录检索、风格词典查询、查询规范化
//!
//! 三者都以 trait 暴露，编排层与工具只依赖 trait；默认实现基于嵌入 + Milvus 向量检索
//! 以及 LLM 结构化输出。

pub mod glossary;
pub mod milvus;
pub mod normalizer;
pub mod product;

use thiserror::Error;

pub use glossary::{GlossaryLookup, GlossaryMatch, MilvusGlossary};
pub use milvus::{MilvusClient, SearchHit};
pub use normalizer::{LlmQueryNormalizer, QueryNormalizer, SearchFilter};
pub use product::{CatalogSearch, MilvusCatalog, Product};

/// 检索后端错误；在工具层转换为 HandlerError
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("{0}")]
    Backend(String),
}
