//! catalog_search_tool：用检索字符串查询商品目录，返回相关度最高的商品列表

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::CatalogSearch;
use crate::tools::{parameters_schema_for, parse_args, HandlerError, Tool};

pub const CATALOG_SEARCH_TOOL: &str = "catalog_search_tool";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CatalogSearchArgs {
    /// Normalized search string, typically produced by query_to_search_str_tool
    query: String,
    /// Maximum number of products to return
    #[serde(default)]
    top_k: Option<u32>,
}

/// 商品目录检索工具：top_k 缺省取配置值，并限制在 [1, max_top_k]
pub struct CatalogSearchTool {
    catalog: Arc<dyn CatalogSearch>,
    default_top_k: usize,
    max_top_k: usize,
}

impl CatalogSearchTool {
    pub fn new(catalog: Arc<dyn CatalogSearch>, default_top_k: usize, max_top_k: usize) -> Self {
        let max_top_k = max_top_k.max(1);
        Self {
            catalog,
            default_top_k: default_top_k.clamp(1, max_top_k),
            max_top_k,
        }
    }
}

#[async_trait]
impl Tool for CatalogSearchTool {
    fn name(&self) -> &str {
        CATALOG_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the fashion catalog with a normalized search string and return the top matching products."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<CatalogSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, HandlerError> {
        let parsed: CatalogSearchArgs = parse_args(&args)?;
        let query = parsed.query.trim();
        if query.is_empty() {
            return Err(HandlerError::new("query must not be empty", &args));
        }
        let top_k = parsed
            .top_k
            .map(|k| (k as usize).clamp(1, self.max_top_k))
            .unwrap_or(self.default_top_k);
        let products = self
            .catalog
            .search(query, top_k)
            .await
            .map_err(|e| HandlerError::new(e.to_string(), &args))?;
        serde_json::to_value(products).map_err(|e| HandlerError::new(e.to_string(), &args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, Product};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubCatalog {
        requests: Mutex<Vec<(String, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl CatalogSearch for StubCatalog {
        async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Product>, CatalogError> {
            self.requests.lock().unwrap().push((query.to_string(), top_k));
            if self.fail {
                return Err(CatalogError::Backend("milvus down".to_string()));
            }
            Ok(vec![Product {
                id: 1,
                title: "Corduroy Chore Jacket".to_string(),
                product_type: "Outerwear".to_string(),
                in_stock: true,
                sizes_in_stock: vec!["M".to_string()],
                handle: "corduroy-chore-jacket".to_string(),
                score: 0.7,
                ..Product::default()
            }])
        }
    }

    #[tokio::test]
    async fn test_search_uses_default_and_clamps_top_k() {
        let catalog = Arc::new(StubCatalog::default());
        let tool = CatalogSearchTool::new(catalog.clone(), 5, 20);
        let out = tool.execute(json!({"query": "corduroy jacket"})).await.unwrap();
        assert_eq!(out[0]["title"], "Corduroy Chore Jacket");
        tool.execute(json!({"query": "jacket", "top_k": 500})).await.unwrap();
        let reqs = catalog.requests.lock().unwrap().clone();
        assert_eq!(reqs, vec![("corduroy jacket".to_string(), 5), ("jacket".to_string(), 20)]);
    }

    #[tokio::test]
    async fn test_empty_query_is_handler_error() {
        let tool = CatalogSearchTool::new(Arc::new(StubCatalog::default()), 5, 20);
        let err = tool.execute(json!({"query": "  "})).await.unwrap_err();
        assert_eq!(err.message, "query must not be empty");
    }

    #[tokio::test]
    async fn test_backend_failure_is_handler_error() {
        let catalog = Arc::new(StubCatalog {
            fail: true,
            ..StubCatalog::default()
        });
        let tool = CatalogSearchTool::new(catalog, 5, 20);
        let args = json!({"query": "boots"});
        let err = tool.execute(args.clone()).await.unwrap_err();
        assert_eq!(err.message, "milvus down");
        assert_eq!(err.args, args);
    }

    #[test]
    fn test_schema_requires_query() {
        let tool = CatalogSearchTool::new(Arc::new(StubCatalog::default()), 5, 20);
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["additionalProperties"], false);
    }
}
