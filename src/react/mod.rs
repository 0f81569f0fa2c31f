//! 认知层：动作解码、对话构建、有界主循环

pub mod action;
pub mod conversation;
pub mod loop_;

pub use action::{decode_action, Action, ActionKind, ParseFailure};
pub use conversation::{build_conversation, system_preamble, DEFAULT_SYSTEM_PROMPT};
pub use loop_::{
    run_agent_loop, LoopOutcome, LoopSession, StopReason, DEFAULT_MAX_STEPS,
    DEFAULT_STEP_TIMEOUT_SECS,
};
