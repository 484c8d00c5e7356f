pub mod catalog_search;
pub mod executor;
pub mod glossary_lookup;
pub mod query_to_search_str;
pub mod registry;
pub mod schema;

use std::sync::Arc;

pub use catalog_search::{CatalogSearchTool, CATALOG_SEARCH_TOOL};
pub use executor::{parse_arguments, ToolExecutor, ToolOutput, ToolResult};
pub use glossary_lookup::{GlossaryLookupTool, GLOSSARY_LOOKUP_TOOL};
pub use query_to_search_str::{QueryToSearchStrTool, QUERY_TO_SEARCH_STR_TOOL};
pub use registry::{HandlerError, Tool, ToolRegistry, ToolSpec};
pub use schema::{parameters_schema_for, parse_args};

use crate::catalog::{CatalogSearch, GlossaryLookup, QueryNormalizer};

/// 购物助手的固定工具集：glossary_lookup_tool、query_to_search_str_tool、catalog_search_tool
pub fn shopping_registry(
    catalog: Arc<dyn CatalogSearch>,
    glossary: Arc<dyn GlossaryLookup>,
    normalizer: Arc<dyn QueryNormalizer>,
    default_top_k: usize,
    max_top_k: usize,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(GlossaryLookupTool::new(glossary));
    registry.register(QueryToSearchStrTool::new(normalizer));
    registry.register(CatalogSearchTool::new(catalog, default_top_k, max_top_k));
    registry
}
