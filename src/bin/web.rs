//! Pilot HTTP 入口
//!
//! 启动: cargo run --bin pilot-web --features web
//! 监听 0.0.0.0:8080（PILOT_WEB_PORT 可覆盖）

#![cfg(feature = "web")]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use pilot::config::{load_config, reload_config, AppConfig};
use pilot::core::{session_context_from_config, AgentBuilder, SessionLocks};
use pilot::session::{ChannelSink, SessionContext, SessionId, SinkEvent};
use pilot::{Agent, AgentError, StopReason};

struct AppState {
    config_path: Option<PathBuf>,
    config: RwLock<AppConfig>,
    /// 可运行时替换（配置热更新）
    agent: RwLock<Arc<Agent>>,
    /// 所有 Agent 实例共用，热更新前后同一会话仍串行
    locks: SessionLocks,
    /// 客户端指定会话的能力集合（键值存储跨请求保留），sink 按请求替换
    contexts: Mutex<HashMap<SessionId, SessionContext>>,
}

impl AppState {
    async fn new(config_path: Option<PathBuf>, config: AppConfig) -> anyhow::Result<Self> {
        let locks = SessionLocks::new();
        let agent = build_agent(config.clone(), locks.clone()).await?;
        Ok(Self::with_agent(config_path, config, agent, locks))
    }

    fn with_agent(
        config_path: Option<PathBuf>,
        config: AppConfig,
        agent: Agent,
        locks: SessionLocks,
    ) -> Self {
        Self {
            config_path,
            config: RwLock::new(config),
            agent: RwLock::new(Arc::new(agent)),
            locks,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// 客户端指定的会话复用缓存；服务端生成的会话只用一次，不缓存
    async fn context_for(
        &self,
        id: &SessionId,
        cache: bool,
    ) -> Result<SessionContext, (StatusCode, String)> {
        let mut contexts = self.contexts.lock().await;
        if let Some(ctx) = contexts.get(id) {
            return Ok(ctx.clone());
        }
        let config = self.config.read().await;
        let ctx = session_context_from_config(&config, id.clone())
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        if cache {
            contexts.insert(id.clone(), ctx.clone());
        }
        Ok(ctx)
    }

    /// 换上新配置与新 Agent；缓存的上下文按新配置重建
    async fn replace(&self, config: AppConfig, agent: Agent) {
        *self.agent.write().await = Arc::new(agent);
        *self.config.write().await = config;
        self.contexts.lock().await.clear();
    }
}

async fn build_agent(config: AppConfig, locks: SessionLocks) -> Result<Agent, AgentError> {
    AgentBuilder::new(config).with_locks(locks).build().await
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    prompt: String,
    session_id: Option<String>,
    mode: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    session_id: SessionId,
    steps: usize,
    stop: StopReason,
    events: Vec<SinkEvent>,
}

fn error_status(e: &AgentError) -> StatusCode {
    match e {
        AgentError::Completion(_) => StatusCode::BAD_GATEWAY,
        AgentError::SessionBusy(_) => StatusCode::CONFLICT,
        AgentError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::Memory(_) | AgentError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn api_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, (StatusCode, String)> {
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "prompt is required".to_string()));
    }
    let (session_id, cache) = match req.session_id.as_deref() {
        Some(raw) => (
            SessionId::parse(raw)
                .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("invalid session_id: {}", raw)))?,
            true,
        ),
        None => (SessionId::new(), false),
    };
    let mode = match req.mode {
        Some(mode) => mode,
        None => state.config.read().await.app.default_mode.clone(),
    };

    let (sink, mut rx) = ChannelSink::channel();
    let ctx = state.context_for(&session_id, cache).await?.with_sink(Arc::new(sink));
    let agent = state.agent.read().await.clone();

    let result = agent.run(prompt, &ctx, &mode).await;
    drop(ctx);
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    match result {
        Ok(outcome) => Ok(Json(RunResponse {
            session_id,
            steps: outcome.steps,
            stop: outcome.stop,
            events,
        })),
        Err(e) => Err((error_status(&e), e.to_string())),
    }
}

async fn api_session_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let session_id = SessionId::parse(&id)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("invalid session_id: {}", id)))?;
    let memory = state.agent.read().await.memory();
    memory
        .load(&session_id)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// 重新读取配置并重建 Agent；进行中的调用继续使用旧实例
async fn api_config_reload(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, (StatusCode, String)> {
    let config = reload_config(state.config_path.clone())
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let agent = build_agent(config.clone(), state.locks.clone())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    state.replace(config, agent).await;
    tracing::info!("config reloaded");
    Ok(StatusCode::OK)
}

async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/agent/run", post(api_run))
        .route("/api/sessions/:id/memory", get(api_session_memory))
        .route("/api/config/reload", post(api_config_reload))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pilot::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path.clone()).context("Failed to load config")?;
    let state = Arc::new(
        AppState::new(config_path, cfg)
            .await
            .context("Failed to build agent")?,
    );

    let port = std::env::var("PILOT_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Pilot web: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
