//! Milvus REST 检索客户端
//!
//! 调用 v2 接口 `POST {base}/v2/vectordb/entities/search`，内积（IP）度量；向量需预先归一化。

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::CatalogError;

/// 只检索有货商品的过滤表达式
pub const IN_STOCK_FILTER: &str = r#"metadata["in_stock"] == true"#;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<Value>,
}

/// 一条检索命中：相似度 + 请求的输出字段
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub score: f32,
    pub fields: Value,
}

/// 简易 Milvus REST 客户端
#[derive(Clone)]
pub struct MilvusClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl MilvusClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// 在 collection 的 anns_field 上做 top-k 向量检索，按相似度降序返回。
    ///
    /// `filter` 为 Milvus 布尔表达式（如 `metadata["in_stock"] == true`），None 表示不过滤。
    pub async fn search(
        &self,
        collection: &str,
        anns_field: &str,
        vector: &[f32],
        limit: usize,
        output_fields: &[&str],
        filter: Option<&str>,
    ) -> Result<Vec<SearchHit>, CatalogError> {
        let body = search_body(collection, anns_field, vector, limit, output_fields, filter);
        let url = format!("{}/v2/vectordb/entities/search", self.base_url);
        let mut req = self.http.post(&url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| CatalogError::Backend(format!("milvus request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Backend(format!("milvus returned HTTP {status}")));
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| CatalogError::Backend(format!("milvus response decode failed: {e}")))?;
        parse_hits(parsed)
    }
}

fn search_body(
    collection: &str,
    anns_field: &str,
    vector: &[f32],
    limit: usize,
    output_fields: &[&str],
    filter: Option<&str>,
) -> Value {
    let mut body = json!({
        "collectionName": collection,
        "data": [vector],
        "annsField": anns_field,
        "limit": limit,
        "outputFields": output_fields,
        "searchParams": { "metricType": "IP", "params": { "ef": 64 } },
    });
    if let Some(expr) = filter {
        body["filter"] = Value::String(expr.to_string());
    }
    body
}

fn parse_hits(resp: SearchResponse) -> Result<Vec<SearchHit>, CatalogError> {
    if resp.code != 0 {
        return Err(CatalogError::Backend(format!(
            "milvus error {}: {}",
            resp.code,
            resp.message.unwrap_or_default()
        )));
    }
    let mut hits: Vec<SearchHit> = resp
        .data
        .into_iter()
        .map(|row| {
            let score = row.get("distance").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            SearchHit { score, fields: row }
        })
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(hits)
}
