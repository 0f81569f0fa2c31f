//! 主循环
//!
//! 载入记忆 → 最多 max_steps 步：拼对话 → 调模型 → 回复推送给 sink → 解码动作 → 分发并记录结果 →
//! 遇到 finish 或步数用尽即停止。解码失败不算错误，回复原文进入 Transcript；只有模型调用失败、
//! 记忆读写失败与取消会中止本次调用。

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError, ModelParams};
use crate::memory::{format_entry, MemoryStore};
use crate::react::action::decode_action;
use crate::react::conversation::{append_transcript, build_conversation};
use crate::session::{SessionContext, SinkEvent};
use crate::tools::ActionDispatcher;

/// 单次调用的默认步数上限
pub const DEFAULT_MAX_STEPS: usize = 5;
/// 单步模型调用默认超时（秒）
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 模型发出 finish
    Finished,
    /// 用满步数仍未 finish（正常结束）
    StepBudgetExhausted,
}

/// 一次调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// 实际执行的步数（= 模型调用次数）
    pub steps: usize,
    pub stop: StopReason,
    pub transcript: String,
}

/// 循环依赖（借用自 Agent）与运行参数
pub struct LoopSession<'a> {
    pub llm: &'a dyn LlmClient,
    pub dispatcher: &'a ActionDispatcher,
    pub memory: &'a dyn MemoryStore,
    pub params: &'a ModelParams,
    /// 已拼好的系统消息（含模式）
    pub preamble: &'a str,
    pub max_steps: usize,
    pub step_timeout: Duration,
    pub cancel_token: CancellationToken,
}

impl<'a> LoopSession<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        dispatcher: &'a ActionDispatcher,
        memory: &'a dyn MemoryStore,
        params: &'a ModelParams,
        preamble: &'a str,
    ) -> Self {
        Self {
            llm,
            dispatcher,
            memory,
            params,
            preamble,
            max_steps: DEFAULT_MAX_STEPS,
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }
}

/// 执行一次调用；致命错误会先以 `{type:"error"}` 推送给 sink 再返回
pub async fn run_agent_loop(
    session: &LoopSession<'_>,
    ctx: &SessionContext,
    prompt: &str,
    mode: &str,
) -> Result<LoopOutcome, AgentError> {
    let span = tracing::info_span!("agent_run", session = %ctx.id, mode = %mode);
    let result = run_steps(session, ctx, prompt).instrument(span).await;
    if let Err(e) = &result {
        tracing::warn!(session = %ctx.id, error = %e, "agent run aborted");
        ctx.sink.notify(SinkEvent::error(e.to_string()));
    }
    result
}

async fn run_steps(
    session: &LoopSession<'_>,
    ctx: &SessionContext,
    prompt: &str,
) -> Result<LoopOutcome, AgentError> {
    let cancel = &session.cancel_token;

    // 只在开头读一次；之后本次调用写入的条目追加到本地副本
    let mut memory = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        loaded = session.memory.load(&ctx.id) => loaded?,
    };
    tracing::debug!(entries = memory.len(), "memory loaded");

    let mut transcript = String::new();
    let mut step = 0;

    while step < session.max_steps {
        let messages = build_conversation(session.preamble, &memory, &transcript, prompt);

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            res = tokio::time::timeout(session.step_timeout, session.llm.complete(&messages, session.params)) => {
                res.map_err(|_| LlmError::Timeout(session.step_timeout.as_secs()))??
            }
        };

        ctx.sink.notify(SinkEvent::response(reply.clone()));

        match decode_action(&reply) {
            Ok(action) => {
                let kind = action.kind.as_str().to_string();
                tracing::info!(step = step + 1, action = %kind, "action decoded");
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    text = session.dispatcher.dispatch(&kind, action.params_value(), ctx) => text,
                };
                append_transcript(
                    &mut transcript,
                    &format!("Action {} result: {}", step + 1, result),
                );
                let entry = format_entry(&kind, &result);
                session.memory.save(&ctx.id, &entry).await?;
                memory.push(entry);

                if action.kind.is_finish() {
                    tracing::info!(steps = step + 1, "finished");
                    return Ok(LoopOutcome {
                        steps: step + 1,
                        stop: StopReason::Finished,
                        transcript,
                    });
                }
            }
            Err(reason) => {
                tracing::debug!(step = step + 1, reason = %reason, "no action in reply");
                append_transcript(&mut transcript, &reply);
            }
        }

        step += 1;
    }

    tracing::info!(steps = step, "step budget exhausted");
    Ok(LoopOutcome {
        steps: step,
        stop: StopReason::StepBudgetExhausted,
        transcript,
    })
}
