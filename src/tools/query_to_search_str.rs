//! query_to_search_str_tool：原始用户问题 + 词典定义 → 结构化条件 → 检索字符串

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::QueryNormalizer;
use crate::tools::{parameters_schema_for, parse_args, HandlerError, Tool};

pub const QUERY_TO_SEARCH_STR_TOOL: &str = "query_to_search_str_tool";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct QueryToSearchStrArgs {
    /// Raw user query
    query: String,
    /// Definitions returned by glossary_lookup_tool (may be empty)
    #[serde(default)]
    vibe_info: Vec<String>,
}

pub struct QueryToSearchStrTool {
    normalizer: Arc<dyn QueryNormalizer>,
}

impl QueryToSearchStrTool {
    pub fn new(normalizer: Arc<dyn QueryNormalizer>) -> Self {
        Self { normalizer }
    }
}

#[async_trait]
impl Tool for QueryToSearchStrTool {
    fn name(&self) -> &str {
        QUERY_TO_SEARCH_STR_TOOL
    }

    fn description(&self) -> &str {
        "Turn a freeform user query (plus optional glossary definitions) into a compact catalog search string."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<QueryToSearchStrArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, HandlerError> {
        let parsed: QueryToSearchStrArgs = parse_args(&args)?;
        let query = parsed.query.trim();
        if query.is_empty() {
            return Err(HandlerError::new("query must not be empty", &args));
        }
        let filter = self
            .normalizer
            .normalize(query, &parsed.vibe_info)
            .await
            .map_err(|e| HandlerError::new(e.to_string(), &args))?;
        let search = filter.to_search_string();
        if search.trim().is_empty() {
            tracing::debug!(query, "empty normalized filter, searching with raw query");
            return Ok(Value::String(query.to_string()));
        }
        Ok(Value::String(search))
    }
}
