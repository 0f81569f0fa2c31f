//! 键值与配置动作：kv_get / kv_set / get_setting

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::session::SessionContext;
use crate::tools::schema::params_schema;
use crate::tools::{parse_params, ActionError, ActionHandler};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KeyParams {
    pub key: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KvSetParams {
    pub key: String,
    pub value: String,
}

/// 读取会话键值
pub struct KvGetAction;

#[async_trait]
impl ActionHandler for KvGetAction {
    fn kind(&self) -> &str {
        "kv_get"
    }

    fn description(&self) -> &str {
        "Read a value from the session key-value store."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<KeyParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: KeyParams = parse_params(self.kind(), params)?;
        Ok(match ctx.kv.get(&p.key).await? {
            Some(value) => value,
            None => format!("No value for '{}'", p.key),
        })
    }
}

/// 写入会话键值
pub struct KvSetAction;

#[async_trait]
impl ActionHandler for KvSetAction {
    fn kind(&self) -> &str {
        "kv_set"
    }

    fn description(&self) -> &str {
        "Store a value in the session key-value store."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<KvSetParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: KvSetParams = parse_params(self.kind(), params)?;
        ctx.kv.set(&p.key, &p.value).await?;
        Ok(format!("Stored '{}'", p.key))
    }
}

/// 读取只读配置项
pub struct GetSettingAction;

#[async_trait]
impl ActionHandler for GetSettingAction {
    fn kind(&self) -> &str {
        "get_setting"
    }

    fn description(&self) -> &str {
        "Read a configuration setting."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<KeyParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: KeyParams = parse_params(self.kind(), params)?;
        Ok(match ctx.settings.get(&p.key) {
            Some(value) => value,
            None => format!(
                "No setting '{}'. Known settings: {}",
                p.key,
                ctx.settings.keys().join(", ")
            ),
        })
    }
}
