//! 核心编排层：错误类型、会话监管（取消与串行）、Agent 构建

pub mod builder;
pub mod error;
pub mod session_supervisor;

pub use builder::{build_memory_store, session_context_from_config, workspace_dir, AgentBuilder};
pub use error::AgentError;
pub use session_supervisor::{SessionGuard, SessionLocks, SessionSupervisor};
