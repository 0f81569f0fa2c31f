//! 动作分发器
//!
//! 持有 ActionRegistry 与统一超时；dispatch 总是返回文本：未知动作、参数错误、能力失败、超时
//! 都折叠为 `Error: ...`，不会向循环传播。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::session::SessionContext;
use crate::tools::{ActionError, ActionHandler, ActionRegistry};

pub struct ActionDispatcher {
    registry: ActionRegistry,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(registry: ActionRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// 执行动作并返回结果文本；失败时为 `Error: <原因>`
    pub async fn dispatch(&self, kind: &str, params: Value, ctx: &SessionContext) -> String {
        match self.try_dispatch(kind, params, ctx).await {
            Ok(text) => text,
            Err(e) => format!("Error: {}", e),
        }
    }

    /// 与 dispatch 相同，但保留错误类型
    pub async fn try_dispatch(
        &self,
        kind: &str,
        params: Value,
        ctx: &SessionContext,
    ) -> Result<String, ActionError> {
        let start = Instant::now();
        let preview = params_preview(&params);
        let result = match self.registry.get(kind) {
            Some(handler) => self.execute_with_timeout(handler, params, ctx).await,
            None => Err(ActionError::UnknownKind(kind.to_string())),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ActionError::Timeout { .. }) => "timeout",
            Err(ActionError::UnknownKind(_)) => "unknown",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "session": ctx.id.as_str(),
            "action": kind,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "action");

        result
    }

    async fn execute_with_timeout(
        &self,
        handler: Arc<dyn ActionHandler>,
        params: Value,
        ctx: &SessionContext,
    ) -> Result<String, ActionError> {
        timeout(self.timeout, handler.execute(params, ctx))
            .await
            .map_err(|_| ActionError::Timeout {
                kind: handler.kind().to_string(),
                secs: self.timeout.as_secs(),
            })?
    }
}

fn params_preview(params: &Value) -> String {
    let s = params.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
