//! 工具参数 JSON Schema 生成（schemars 自动生成）与类型化参数解析
//!
//! 参数结构体加 `#[serde(deny_unknown_fields)]` 后，生成的 schema 带 `additionalProperties: false`。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tools::HandlerError;

/// 由参数类型生成可直接放进 tools[].function.parameters 的 schema（去掉 $schema / title 等元信息）
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("definitions");
        obj.entry("required").or_insert_with(|| Value::Array(Vec::new()));
    }
    value
}

/// 将已解析的 JSON 对象反序列化为类型化参数；失败时携带原始参数作为 HandlerError
pub fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T, HandlerError> {
    serde_json::from_value(args.clone())
        .map_err(|e| HandlerError::new(format!("invalid arguments: {e}"), args))
}
