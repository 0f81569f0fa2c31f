//! Pilot - 有界迭代式 Agent 循环
//!
//! 把一条自然语言指令变成模型提出的一串动作，在会话能力上执行，积累跨步记忆，
//! 并把每步的模型回复推送给观察者。
//!
//! 模块划分：
//! - **agent**: 对外入口 Agent::run
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、会话监管（取消 / 单会话串行）、Agent 构建
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、重试
//! - **memory**: 对话消息类型与跨步记忆存储（内存 / JSONL / SQLite）
//! - **react**: 动作解码、对话构建、有界主循环
//! - **session**: 会话上下文与能力（sink、文件系统、终端、键值、配置）
//! - **tools**: 动作注册表、分发器与内置动作

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod session;
pub mod tools;

pub use agent::Agent;
pub use core::{AgentBuilder, AgentError};
pub use react::{LoopOutcome, StopReason};
pub use session::{SessionContext, SessionId, SinkEvent};
