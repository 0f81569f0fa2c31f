//! Agent 构建器：统一的初始化逻辑
//!
//! CLI 与 Web 入口、集成测试都经由这里从 AppConfig 构造 Agent 与 SessionContext，
//! 模型客户端与记忆存储可被显式替换（测试注入 Mock）。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::Agent;
use crate::config::{AppConfig, MemorySection};
use crate::core::{AgentError, SessionLocks, SessionSupervisor};
use crate::llm::{create_llm_from_config, model_params_from_config, LlmClient};
use crate::memory::{InMemoryStore, JsonlMemoryStore, MemoryStore, RetentionPolicy};
use crate::react::DEFAULT_SYSTEM_PROMPT;
use crate::session::{MapSettings, SessionContext, SessionId};
use crate::tools::{default_registry, ActionDispatcher, ActionHandler, ActionRegistry};

pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    memory: Option<Arc<dyn MemoryStore>>,
    registry: ActionRegistry,
    system_prompt: Option<String>,
    locks: Option<SessionLocks>,
}

impl AgentBuilder {
    /// 从配置开始；内置动作全部注册
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            memory: None,
            registry: default_registry(),
            system_prompt: None,
            locks: None,
        }
    }

    /// 替换模型客户端（不再按 [llm] 配置创建）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 替换记忆存储（不再按 [memory] 配置创建）
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// 追加自定义动作；与内置动作同名时覆盖
    pub fn register_action(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.registry.register(handler);
        self
    }

    /// 与其它 Agent 共用会话锁表（重建 Agent 时同一会话仍保持串行）
    pub fn with_locks(mut self, locks: SessionLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// 系统提示词：显式设置 > [agent].system_prompt_path > config/prompts/system.md > 内置
    fn resolve_system_prompt(&self) -> String {
        if let Some(prompt) = &self.system_prompt {
            return prompt.clone();
        }
        if let Some(path) = &self.config.agent.system_prompt_path {
            match std::fs::read_to_string(path) {
                Ok(prompt) => return prompt,
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "system prompt file unreadable, using built-in prompt"
                ),
            }
        }
        ["config/prompts/system.md", "../config/prompts/system.md"]
            .into_iter()
            .find_map(|p| std::fs::read_to_string(p).ok())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    pub async fn build(self) -> Result<Agent, AgentError> {
        let system_prompt = self.resolve_system_prompt();
        let llm = match self.llm {
            Some(llm) => llm,
            None => create_llm_from_config(&self.config.llm)
                .map_err(|e| AgentError::Config(e.to_string()))?,
        };
        let memory = match self.memory {
            Some(memory) => memory,
            None => build_memory_store(&self.config.memory).await?,
        };
        let agent_cfg = &self.config.agent;
        if agent_cfg.max_steps == 0 {
            return Err(AgentError::Config("agent.max_steps must be at least 1".into()));
        }

        tracing::info!(
            actions = self.registry.len(),
            max_steps = agent_cfg.max_steps,
            memory_backend = %self.config.memory.backend,
            "agent ready"
        );

        Ok(Agent {
            llm,
            dispatcher: ActionDispatcher::new(self.registry, self.config.tools.tool_timeout_secs),
            memory,
            params: model_params_from_config(&self.config.llm),
            system_prompt,
            max_steps: agent_cfg.max_steps,
            step_timeout: Duration::from_secs(agent_cfg.step_timeout_secs.max(1)),
            reject_concurrent: agent_cfg.reject_concurrent,
            locks: self.locks.unwrap_or_default(),
            supervisor: SessionSupervisor::new(),
        })
    }
}

/// 按 [memory].backend 创建记忆存储
pub async fn build_memory_store(section: &MemorySection) -> Result<Arc<dyn MemoryStore>, AgentError> {
    let retention = RetentionPolicy::from_config(section.max_entries);
    match section.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new(retention))),
        "file" => Ok(Arc::new(JsonlMemoryStore::new(&section.dir, retention))),
        #[cfg(feature = "async-sqlite")]
        "sqlite" => {
            tokio::fs::create_dir_all(&section.dir)
                .await
                .map_err(crate::memory::MemoryError::from)?;
            let store =
                crate::memory::SqliteMemoryStore::new(section.dir.join("memory.db"), retention)
                    .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "async-sqlite"))]
        "sqlite" => Err(AgentError::Config(
            "memory.backend = \"sqlite\" requires the async-sqlite feature".into(),
        )),
        other => Err(AgentError::Config(format!("Unknown memory backend: {}", other))),
    }
}

/// 工作区目录：[app].workspace_root，未设置时为 ./workspace
pub fn workspace_dir(config: &AppConfig) -> PathBuf {
    config
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("workspace"))
}

/// 按配置构造会话上下文（工作区不存在时创建）；sink 默认为 NullSink，由调用方替换
pub fn session_context_from_config(
    config: &AppConfig,
    id: SessionId,
) -> std::io::Result<SessionContext> {
    let workspace = workspace_dir(config);
    std::fs::create_dir_all(&workspace)?;
    let ctx = SessionContext::new(
        id,
        &workspace,
        config.tools.shell.allowed_commands.clone(),
        config.tools.shell.timeout_secs,
    )
    .with_settings(Arc::new(MapSettings::new(config.settings.clone())));
    Ok(ctx)
}
