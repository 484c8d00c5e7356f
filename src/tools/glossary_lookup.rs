//! glossary_lookup_tool：查风格词典，返回 0 或 1 条规范定义

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::GlossaryLookup;
use crate::tools::{parameters_schema_for, parse_args, HandlerError, Tool};

pub const GLOSSARY_LOOKUP_TOOL: &str = "glossary_lookup_tool";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct GlossaryLookupArgs {
    /// The fashion term to define, e.g. 'selvedge denim' or 'blokette'
    term: String,
}

pub struct GlossaryLookupTool {
    glossary: Arc<dyn GlossaryLookup>,
}

impl GlossaryLookupTool {
    pub fn new(glossary: Arc<dyn GlossaryLookup>) -> Self {
        Self { glossary }
    }
}

#[async_trait]
impl Tool for GlossaryLookupTool {
    fn name(&self) -> &str {
        GLOSSARY_LOOKUP_TOOL
    }

    fn description(&self) -> &str {
        "Look up a fashion term or vibe and return its canonical definition (items, cuts, materials). Returns an empty list when the term is unknown."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<GlossaryLookupArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, HandlerError> {
        let parsed: GlossaryLookupArgs = parse_args(&args)?;
        let term = parsed.term.trim();
        if term.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        let found = self
            .glossary
            .lookup(term)
            .await
            .map_err(|e| HandlerError::new(e.to_string(), &args))?;
        let vibe_info: Vec<String> = found.into_iter().map(|m| m.text).collect();
        Ok(serde_json::json!(vibe_info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, GlossaryMatch};
    use serde_json::json;

    struct StubGlossary(Option<GlossaryMatch>);

    #[async_trait]
    impl GlossaryLookup for StubGlossary {
        async fn lookup(&self, _term: &str) -> Result<Option<GlossaryMatch>, CatalogError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_match_returns_single_definition() {
        let tool = GlossaryLookupTool::new(Arc::new(StubGlossary(Some(GlossaryMatch {
            text: "Vibe: blokette. Definition: sporty meets feminine".to_string(),
            score: 0.8,
        }))));
        let out = tool.execute(json!({"term": "blokette"})).await.unwrap();
        assert_eq!(out, json!(["Vibe: blokette. Definition: sporty meets feminine"]));
    }

    #[tokio::test]
    async fn test_no_match_returns_empty_list() {
        let tool = GlossaryLookupTool::new(Arc::new(StubGlossary(None)));
        assert_eq!(tool.execute(json!({"term": "cozy"})).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_missing_term_is_handler_error() {
        let tool = GlossaryLookupTool::new(Arc::new(StubGlossary(None)));
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(err.message.contains("term"));
    }
}
