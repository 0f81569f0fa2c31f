//! Agent 运行时：对外的唯一入口
//!
//! Agent 持有模型客户端、动作分发器与记忆存储，可被多个会话共享；run 对单条指令跑一次有界循环。
//! 同一会话的调用按会话锁串行执行，不同会话互不影响。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, SessionLocks, SessionSupervisor};
use crate::llm::{LlmClient, ModelParams};
use crate::memory::MemoryStore;
use crate::react::{run_agent_loop, system_preamble, LoopOutcome, LoopSession};
use crate::session::{SessionContext, SinkEvent};
use crate::tools::{ActionDispatcher, ActionRegistry};

pub struct Agent {
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) dispatcher: ActionDispatcher,
    pub(crate) memory: Arc<dyn MemoryStore>,
    pub(crate) params: ModelParams,
    pub(crate) system_prompt: String,
    pub(crate) max_steps: usize,
    pub(crate) step_timeout: Duration,
    pub(crate) reject_concurrent: bool,
    pub(crate) locks: SessionLocks,
    pub(crate) supervisor: SessionSupervisor,
}

impl Agent {
    /// 对一条指令跑一次循环；mode 原样写入系统消息
    pub async fn run(
        &self,
        prompt: &str,
        ctx: &SessionContext,
        mode: &str,
    ) -> Result<LoopOutcome, AgentError> {
        self.run_with_cancel(prompt, ctx, mode, self.supervisor.child_token())
            .await
    }

    /// 与 run 相同，但由调用方提供取消令牌（如 Ctrl+C 只取消当前这一次）
    pub async fn run_with_cancel(
        &self,
        prompt: &str,
        ctx: &SessionContext,
        mode: &str,
        cancel_token: CancellationToken,
    ) -> Result<LoopOutcome, AgentError> {
        let _guard = if self.reject_concurrent {
            match self.locks.try_acquire(&ctx.id) {
                Some(guard) => guard,
                None => {
                    let err = AgentError::SessionBusy(ctx.id.to_string());
                    ctx.sink.notify(SinkEvent::error(err.to_string()));
                    return Err(err);
                }
            }
        } else {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    ctx.sink.notify(SinkEvent::error(AgentError::Cancelled.to_string()));
                    return Err(AgentError::Cancelled);
                }
                guard = self.locks.acquire(&ctx.id) => guard,
            }
        };

        let preamble = system_preamble(&self.system_prompt, mode, self.dispatcher.registry());
        let session = LoopSession::new(
            self.llm.as_ref(),
            &self.dispatcher,
            self.memory.as_ref(),
            &self.params,
            &preamble,
        )
        .with_max_steps(self.max_steps)
        .with_step_timeout(self.step_timeout)
        .with_cancel_token(cancel_token);

        run_agent_loop(&session, ctx, prompt, mode).await
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub fn registry(&self) -> &ActionRegistry {
        self.dispatcher.registry()
    }

    pub fn memory(&self) -> Arc<dyn MemoryStore> {
        self.memory.clone()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }
}
