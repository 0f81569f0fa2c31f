//! run_command 动作：经 SessionContext.terminal 执行白名单命令
//!
//! 白名单、危险子串与 shell 元字符的检查都在 Terminal 能力内完成；这里只负责参数解码与输出格式。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::session::SessionContext;
use crate::tools::schema::params_schema;
use crate::tools::{parse_params, truncate_output, ActionError, ActionHandler};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunCommandParams {
    /// 完整命令行，首词必须在白名单内
    pub command: String,
}

pub struct RunCommandAction;

#[async_trait]
impl ActionHandler for RunCommandAction {
    fn kind(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a single allow-listed program in the workspace (no shell: pipes, chaining and redirection are rejected)."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<RunCommandParams>()
    }

    async fn execute(&self, params: Value, ctx: &SessionContext) -> Result<String, ActionError> {
        let p: RunCommandParams = parse_params(self.kind(), params)?;
        let output = ctx.terminal.run(&p.command).await?;
        let body = if output.success() {
            output.stdout
        } else {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            format!("(exit {}) {}", code, output.stderr)
        };
        Ok(format!("Command: {}\n\n{}", p.command, truncate_output(body.trim_end())))
    }
}
