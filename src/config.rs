//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PILOT__*` 覆盖（双下划线表示嵌套，如 `PILOT__LLM__PROVIDER=openai`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::RetryConfig;
use crate::memory::DEFAULT_MAX_ENTRIES;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub memory: MemorySection,
    pub tools: ToolsSection,
    /// 只读配置项，经 Settings 能力暴露给动作
    pub settings: HashMap<String, String>,
}

/// [app] 段：应用名、工作目录、默认会话与模式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    /// REPL 使用的会话 ID，未设置时每次启动随机生成
    pub session_id: Option<String>,
    pub default_mode: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace_root: None,
            session_id: None,
            default_mode: "default".to_string(),
        }
    }
}

/// [llm] 段：后端选择、模型参数、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时回退到 OPENAI_API_KEY / DEEPSEEK_API_KEY
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeouts: LlmTimeoutsSection,
    pub retry: RetryConfig,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.2,
            max_tokens: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [agent] 段：循环步数上限、每步超时、并发策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_steps: usize,
    /// 单步模型调用超时（秒）
    pub step_timeout_secs: u64,
    /// 同一会话已有运行中的循环时：true 立即报错，false 排队等待
    pub reject_concurrent: bool,
    /// 自定义系统提示词文件，未设置时用内置提示词
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 5,
            step_timeout_secs: 60,
            reject_concurrent: false,
            system_prompt_path: None,
        }
    }
}

/// [memory] 段：记忆存储后端与保留上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// file / memory / sqlite（sqlite 需要 async-sqlite feature）
    pub backend: String,
    /// file 后端为目录，sqlite 后端为数据库文件所在目录
    pub dir: PathBuf,
    /// 每个会话保留的最新条目数，0 表示不限
    pub max_entries: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            dir: PathBuf::from("memory"),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// [tools] 段：动作超时、Shell 白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次动作执行超时（秒）
    pub tool_timeout_secs: u64,
    pub shell: ShellSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            shell: ShellSection::default(),
        }
    }
}

/// [tools.shell] 段：允许执行的命令名（仅首词，如 ls、grep）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub allowed_commands: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_commands: [
                "ls", "find", "grep", "cat", "head", "tail", "wc", "tree", "pwd", "echo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 PILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PILOT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 重新读取同一组来源；调用方据此决定是否重建 Agent
pub fn reload_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    load_config(config_path)
}
