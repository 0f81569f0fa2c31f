//! finish 动作：结束循环；结果为可选的 summary，否则为 "done"

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::session::SessionContext;
use crate::tools::schema::params_schema;
use crate::tools::{parse_params, ActionError, ActionHandler};

pub const FINISH_KIND: &str = "finish";

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct FinishParams {
    /// 给用户的最终答复
    #[serde(default)]
    pub summary: Option<String>,
}

pub struct FinishAction;

#[async_trait]
impl ActionHandler for FinishAction {
    fn kind(&self) -> &str {
        FINISH_KIND
    }

    fn description(&self) -> &str {
        "Stop working. Put the final answer for the user in 'summary'."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<FinishParams>()
    }

    async fn execute(&self, params: Value, _ctx: &SessionContext) -> Result<String, ActionError> {
        // finish 的参数出错也必须结束循环，因此不向上报 InvalidParams
        let p: FinishParams = parse_params(self.kind(), params).unwrap_or_default();
        Ok(p.summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "done".to_string()))
    }
}
