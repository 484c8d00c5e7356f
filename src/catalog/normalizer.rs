//! 查询规范化：把用户原话 + 词典上下文转成结构化检索条件，再拍平为一条检索字符串
//!
//! 结构化输出不可解析时退化为空条件，从不报错；只有模型调用本身失败才返回错误。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::catalog::CatalogError;
use crate::llm::{ChatRequest, LlmClient};
use crate::memory::Message;

const NORMALIZER_PROMPT: &str = r#"You are a fashion search query generator.
Convert the user query and vibe definition into a structured JSON object with the following optional fields:
- "item": specific clothing items mentioned in user query
- "price": string or range (e.g., "budget", "under 150", "$50-100")
- "materials": list of materials
- "sizes": list of sizes
- "vibe_definition": short description of the vibe
- "cuts": list of fits/cuts
- "colors": list of colors
- "details": list of style details
- "occasion": string (e.g., "night out", "office", "festival")
- "season": string (spring/summer/fall/winter)

Only include fields you can infer. If a field is not present in the user query or vibe definition, omit it completely.
If the user query mentions specific clothing items, include only those items. Otherwise, rely on the items mentioned in the vibe definition.
Output *only* valid JSON."#;

/// 结构化检索条件；所有字段可选
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilter {
    #[serde(deserialize_with = "string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<String>,
    #[serde(deserialize_with = "scalar_as_string", skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(deserialize_with = "string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<String>,
    #[serde(deserialize_with = "string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub sizes: Vec<String>,
    #[serde(deserialize_with = "scalar_as_string", skip_serializing_if = "Option::is_none")]
    pub vibe_definition: Option<String>,
    #[serde(deserialize_with = "string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub cuts: Vec<String>,
    #[serde(deserialize_with = "string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<String>,
    #[serde(deserialize_with = "string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(deserialize_with = "scalar_as_string", skip_serializing_if = "Option::is_none")]
    pub occasion: Option<String>,
    #[serde(deserialize_with = "scalar_as_string", skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_or_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(&other).into_iter().collect(),
    })
}

fn scalar_as_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Array(items) => {
            let joined = items.iter().filter_map(scalar_text).collect::<Vec<_>>().join(" ");
            Some(joined).filter(|s| !s.is_empty())
        }
        other => scalar_text(&other),
    })
}

impl SearchFilter {
    /// 宽松解析模型输出：容忍 ```json 代码块包裹；任何解析失败都得到空条件
    pub fn parse_lenient(raw: &str) -> Self {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(trimmed)
            .trim();
        match serde_json::from_str::<SearchFilter>(body) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable normalizer output, using empty filter");
                SearchFilter::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SearchFilter::default()
    }

    /// 拍平为检索字符串：item、materials、cuts、colors、details、occasion、season、price、vibe_definition。
    /// sizes 不参与检索文本。
    pub fn to_search_string(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for list in [&self.item, &self.materials, &self.cuts, &self.colors, &self.details] {
            parts.extend(list.iter().map(String::as_str));
        }
        for single in [&self.occasion, &self.season, &self.price, &self.vibe_definition] {
            if let Some(s) = single {
                parts.push(s.as_str());
            }
        }
        parts.join(" ")
    }
}

/// 查询规范化协作方
#[async_trait]
pub trait QueryNormalizer: Send + Sync {
    async fn normalize(&self, query: &str, vibe_info: &[String]) -> Result<SearchFilter, CatalogError>;
}

/// 用 LLM 的 json_object 输出做规范化
pub struct LlmQueryNormalizer {
    llm: Arc<dyn LlmClient>,
}

impl LlmQueryNormalizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QueryNormalizer for LlmQueryNormalizer {
    async fn normalize(&self, query: &str, vibe_info: &[String]) -> Result<SearchFilter, CatalogError> {
        let messages = vec![
            Message::system(NORMALIZER_PROMPT),
            Message::user(format!(
                "User query: {} Vibe definition: {}",
                query,
                vibe_info.join(" ")
            )),
        ];
        let reply = self
            .llm
            .chat(ChatRequest::text(&messages).json())
            .await
            .map_err(|e| CatalogError::Backend(format!("query normalization failed: {e}")))?;
        Ok(SearchFilter::parse_lenient(reply.content.as_deref().unwrap_or("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient, ModelReply, ResponseFormat};

    #[test]
    fn test_flatten_order() {
        let filter = SearchFilter::parse_lenient(
            r#"{"vibe_definition":"soft and warm","price":"under 150","season":"fall",
                "occasion":"weekend","details":["cable knit"],"colors":["cream","rust"],
                "cuts":["oversized"],"materials":["wool"],"item":["sweater"],"sizes":["M"]}"#,
        );
        assert_eq!(
            filter.to_search_string(),
            "sweater wool oversized cream rust cable knit weekend fall under 150 soft and warm"
        );
    }

    #[test]
    fn test_lenient_shapes() {
        let filter = SearchFilter::parse_lenient("```json\n{\"item\": \"boots\", \"price\": 120}\n```");
        assert_eq!(filter.item, vec!["boots"]);
        assert_eq!(filter.price.as_deref(), Some("120"));
    }

    #[test]
    fn test_malformed_output_is_empty_filter() {
        let filter = SearchFilter::parse_lenient("sure! here are some ideas");
        assert!(filter.is_empty());
        assert_eq!(filter.to_search_string(), "");
    }

    #[tokio::test]
    async fn test_llm_normalizer_requests_json() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Ok(ModelReply::text(
            r#"{"item":["cardigan"],"season":"fall"}"#,
        ))]));
        let normalizer = LlmQueryNormalizer::new(mock.clone());
        let filter = normalizer.normalize("cozy cardigan", &[]).await.unwrap();
        assert_eq!(filter.to_search_string(), "cardigan fall");
        let call = &mock.calls()[0];
        assert_eq!(call.response_format, ResponseFormat::JsonObject);
        assert!(call.messages[1].text().contains("User query: cozy cardigan"));
    }

    #[tokio::test]
    async fn test_llm_failure_is_backend_error() {
        let mock = Arc::new(MockLlmClient::scripted(vec![Err(LlmError::Api("boom".to_string()))]));
        let normalizer = LlmQueryNormalizer::new(mock);
        assert!(normalizer.normalize("x", &[]).await.is_err());
    }
}
