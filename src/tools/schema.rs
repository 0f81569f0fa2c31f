//! 动作参数 JSON Schema 生成（schemars）
//!
//! 每个内置动作的参数结构派生 JsonSchema，生成的 schema 注入系统提示词，减少模型输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 参数结构的 schema；去掉 `$schema` 与 `title`，只保留模型需要的部分
pub fn params_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 动作调用格式：扁平 JSON 对象，"action" 为动作名，其余字段为参数
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionCallFormat {
    /// 动作名，如 read_file、run_command、finish
    pub action: String,
}

/// 动作调用格式的 schema 字符串，可拼入系统提示词
pub fn action_call_schema_json() -> String {
    serde_json::to_string_pretty(&params_schema::<ActionCallFormat>()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Demo {
        /// 文件路径
        path: String,
        limit: Option<u32>,
    }

    #[test]
    fn test_params_schema_lists_required_fields() {
        let schema = params_schema::<Demo>();
        assert!(schema.get("$schema").is_none());
        assert!(schema["properties"].get("path").is_some());
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required, &vec![Value::String("path".into())]);
    }

    #[test]
    fn test_action_call_schema() {
        assert!(action_call_schema_json().contains("\"action\""));
    }
}
