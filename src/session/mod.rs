//! 会话上下文：调用方构造、循环与动作分发只读使用的能力集合
//!
//! SessionContext 显式列出动作所需的全部能力（消息通道、文件系统、终端、键值存储、配置读取），
//! 每项都是 trait 对象，便于测试替换。

pub mod fs;
pub mod kv;
pub mod settings;
pub mod sink;
pub mod terminal;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fs::{FileSystem, SandboxFs};
pub use kv::{InMemoryKv, KeyValueStore};
pub use settings::{MapSettings, Settings};
pub use sink::{ChannelSink, MessageSink, NullSink, SinkEvent, TracingSink};
pub use terminal::{CommandOutput, ShellTerminal, Terminal};

/// 能力调用失败（由动作分发转为文本结果，不会中止循环）
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Path escapes workspace: {0}")]
    PathEscape(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// 会话 ID：限定为字母数字、'-'、'_'，可直接用作文件名
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// 随机生成（uuid v4）
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// 校验外部传入的会话 ID；含非法字符或为空时返回 None
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > 128 {
            return None;
        }
        if raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    /// 非法字符替换为 '_'（测试与内部常量用）
    fn from(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if cleaned.is_empty() {
            Self::new()
        } else {
            Self(cleaned)
        }
    }
}

/// 会话上下文：能力集合，生命周期归调用方所有，可跨多次调用复用
#[derive(Clone)]
pub struct SessionContext {
    pub id: SessionId,
    pub sink: Arc<dyn MessageSink>,
    pub fs: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
    pub kv: Arc<dyn KeyValueStore>,
    pub settings: Arc<dyn Settings>,
}

impl SessionContext {
    /// 以 workspace 为沙箱根构造默认能力：SandboxFs + ShellTerminal + 内存 KV + 空配置 + NullSink
    pub fn new(
        id: SessionId,
        workspace: impl AsRef<Path>,
        allowed_commands: Vec<String>,
        command_timeout_secs: u64,
    ) -> Self {
        let workspace = workspace.as_ref();
        Self {
            id,
            sink: Arc::new(NullSink),
            fs: Arc::new(SandboxFs::new(workspace)),
            terminal: Arc::new(ShellTerminal::new(
                workspace,
                allowed_commands,
                command_timeout_secs,
            )),
            kv: Arc::new(InMemoryKv::default()),
            settings: Arc::new(MapSettings::default()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_terminal(mut self, terminal: Arc<dyn Terminal>) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_kv(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = kv;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn Settings>) -> Self {
        self.settings = settings;
        self
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
