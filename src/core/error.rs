//! Agent 错误类型
//!
//! 仅覆盖会中止一次调用的致命错误；动作解析失败与动作执行失败在循环内部恢复，不会出现在这里。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::MemoryError;

/// 一次 Agent 调用中可能出现的致命错误（模型调用失败、记忆读写失败、取消、会话占用）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型调用失败（网络、超时、限流、响应格式错误统一归为此类）
    #[error("Completion failed: {0}")]
    Completion(#[from] LlmError),

    #[error("Memory store error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Cancelled")]
    Cancelled,

    /// 同一会话已有调用在执行（仅在 reject_concurrent 开启时返回）
    #[error("Session busy: {0}")]
    SessionBusy(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 是否为模型调用失败（供入口层区分 502 与其它错误）
    pub fn is_completion_failure(&self) -> bool {
        matches!(self, AgentError::Completion(_))
    }
}
