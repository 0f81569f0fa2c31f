//! 动作注册表
//!
//! 所有动作实现 ActionHandler（kind / description / parameters_schema / execute），由 ActionRegistry
//! 按 kind 注册与查找；ActionDispatcher 在调用时加超时并把一切失败折叠为文本。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::session::{CapabilityError, SessionContext};

/// 动作执行失败；分发器会把它转成 `Error: ...` 文本交回模型
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownKind(String),

    #[error("Invalid parameters for '{kind}': {reason}")]
    InvalidParams { kind: String, reason: String },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("Action '{kind}' timed out after {secs}s")]
    Timeout { kind: String, secs: u64 },
}

/// 动作 trait：kind（JSON 中的 "action" 字段）、描述、参数 schema、异步执行
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn kind(&self) -> &str;

    /// 供模型理解用途
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    /// params 为去掉 "action" 键后的其余字段
    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError>;
}

/// 把扁平参数解码为动作自己的参数结构；无参数时按空对象处理
pub fn parse_params<T: DeserializeOwned>(kind: &str, params: Value) -> Result<T, ActionError> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| ActionError::InvalidParams {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// 动作注册表：按 kind 有序存储，生成的提示词因此稳定
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: BTreeMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册动作；同名覆盖
    pub fn register(&mut self, handler: impl ActionHandler + 'static) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn ActionHandler>) {
        let kind = handler.kind().to_string();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            tracing::debug!(kind = %kind, "action handler replaced");
        }
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 可用动作的 schema 列表（拼入系统提示词）
    pub fn to_schema_json(&self) -> String {
        let actions: Vec<Value> = self
            .handlers
            .iter()
            .map(|(kind, handler)| {
                serde_json::json!({
                    "action": kind,
                    "description": handler.description(),
                    "parameters": handler.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&actions).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct Ping;

    #[async_trait]
    impl ActionHandler for Ping {
        fn kind(&self) -> &str {
            "ping"
        }

        fn description(&self) -> &str {
            "Reply with pong"
        }

        async fn execute(&self, _params: Value, _ctx: &SessionContext) -> Result<String, ActionError> {
            Ok("pong".into())
        }
    }

    #[derive(Deserialize, Debug)]
    struct PathParams {
        path: String,
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ActionRegistry::new();
        registry.register(Ping);
        assert!(registry.contains("ping"));
        assert!(registry.get("pong").is_none());
        assert_eq!(registry.kinds(), vec!["ping".to_string()]);
        assert!(registry.to_schema_json().contains("\"action\": \"ping\""));
    }

    #[test]
    fn test_parse_params() {
        let ok: PathParams = parse_params("read_file", serde_json::json!({"path": "a.txt"})).unwrap();
        assert_eq!(ok.path, "a.txt");

        let err = parse_params::<PathParams>("read_file", Value::Null).unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams { .. }));
        assert!(err.to_string().contains("missing field `path`"));
    }
}
