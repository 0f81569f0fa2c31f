//! Agent 循环端到端测试：脚本化 Mock 模型 + 内存 / JSONL 记忆 + 自定义动作

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pilot::config::AppConfig;
use pilot::core::AgentBuilder;
use pilot::llm::{LlmClient, LlmError, MockLlmClient, ModelParams};
use pilot::memory::{InMemoryStore, JsonlMemoryStore, Message, MemoryStore, RetentionPolicy, Role};
use pilot::session::{ChannelSink, SessionContext, SessionId, SinkEvent};
use pilot::tools::{ActionError, ActionHandler};
use pilot::{Agent, AgentError, StopReason};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// 设备动作：记录调用次数
struct ToggleLight {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ActionHandler for ToggleLight {
    fn kind(&self) -> &str {
        "toggle_light"
    }

    fn description(&self) -> &str {
        "Turn the light on or off"
    }

    async fn execute(&self, params: Value, _ctx: &SessionContext) -> Result<String, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = params.get("state").and_then(|v| v.as_str()).unwrap_or("on");
        Ok(format!("light is {}", state))
    }
}

/// 每次延迟后回复 finish；记录收到的对话与同时在途的调用数峰值
#[derive(Default)]
struct SlowFinish {
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    requests: std::sync::Mutex<Vec<Vec<Message>>>,
}

impl SlowFinish {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl LlmClient for SlowFinish {
    async fn complete(&self, messages: &[Message], _params: &ModelParams) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(r#"{"action": "finish"}"#.to_string())
    }
}

struct Harness {
    _dir: TempDir,
    agent: Agent,
    memory: Arc<InMemoryStore>,
    toggles: Arc<AtomicUsize>,
    workspace: std::path::PathBuf,
}

fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.memory.backend = "memory".into();
    cfg
}

async fn harness(llm: Arc<dyn LlmClient>, cfg: AppConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(InMemoryStore::default());
    let toggles = Arc::new(AtomicUsize::new(0));
    let agent = AgentBuilder::new(cfg)
        .with_llm(llm)
        .with_memory(memory.clone())
        .register_action(ToggleLight {
            calls: toggles.clone(),
        })
        .build()
        .await
        .unwrap();
    Harness {
        workspace: dir.path().to_path_buf(),
        _dir: dir,
        agent,
        memory,
        toggles,
    }
}

fn context(h: &Harness, id: &str) -> (SessionContext, UnboundedReceiver<SinkEvent>) {
    let (sink, rx) = ChannelSink::channel();
    let ctx = SessionContext::new(SessionId::from(id), &h.workspace, vec!["echo".into()], 5)
        .with_sink(Arc::new(sink));
    (ctx, rx)
}

fn drain(rx: &mut UnboundedReceiver<SinkEvent>) -> Vec<SinkEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

fn responses(events: &[SinkEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SinkEvent::Response { .. }))
        .count()
}

/// 请求中的记忆条目（第一条 system 之后、assistant 之前）
fn memory_in_request(request: &[Message]) -> Vec<String> {
    request
        .iter()
        .skip(1)
        .take_while(|m| m.role == Role::System)
        .map(|m| m.content.clone())
        .collect()
}

#[tokio::test]
async fn test_toggle_light_then_finish() {
    let llm = Arc::new(MockLlmClient::with_replies([
        r#"{"action":"toggle_light","state":"on"}"#,
        r#"{"action":"finish"}"#,
    ]));
    let h = harness(llm.clone(), config()).await;
    let (ctx, mut rx) = context(&h, "light");

    let outcome = h.agent.run("turn on the light", &ctx, "default").await.unwrap();

    assert_eq!(llm.call_count(), 2);
    assert_eq!(h.toggles.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.steps, 2);
    assert_eq!(outcome.stop, StopReason::Finished);
    assert_eq!(
        h.memory.load(&ctx.id).await.unwrap(),
        vec!["Action: toggle_light → light is on", "Action: finish → done"]
    );
    assert_eq!(responses(&drain(&mut rx)), 2);
}

#[tokio::test]
async fn test_free_text_only_runs_full_budget() {
    let llm = Arc::new(MockLlmClient::with_replies(vec!["I am thinking about it."; 10]));
    let h = harness(llm.clone(), config()).await;
    let (ctx, mut rx) = context(&h, "prose");

    let outcome = h.agent.run("do something", &ctx, "default").await.unwrap();

    assert_eq!(llm.call_count(), 5);
    assert_eq!(outcome.stop, StopReason::StepBudgetExhausted);
    assert_eq!(h.toggles.load(Ordering::SeqCst), 0);
    assert!(h.memory.load(&ctx.id).await.unwrap().is_empty());
    let events = drain(&mut rx);
    assert_eq!(events.len(), 5);
    assert_eq!(responses(&events), 5);
}

#[tokio::test]
async fn test_finish_at_step_k_stops_after_k_calls() {
    for k in 1..=5 {
        let mut replies = vec![r#"{"action":"toggle_light"}"#.to_string(); k - 1];
        replies.push(r#"{"action":"finish"}"#.to_string());
        replies.push(r#"{"action":"toggle_light"}"#.to_string());
        let llm = Arc::new(MockLlmClient::with_replies(replies));
        let h = harness(llm.clone(), config()).await;
        let (ctx, mut rx) = context(&h, "k");

        let outcome = h.agent.run("go", &ctx, "default").await.unwrap();

        assert_eq!(llm.call_count(), k, "k = {}", k);
        assert_eq!(outcome.steps, k);
        assert_eq!(outcome.stop, StopReason::Finished);
        assert_eq!(h.toggles.load(Ordering::SeqCst), k - 1);
        assert_eq!(responses(&drain(&mut rx)), k);
    }
}

#[tokio::test]
async fn test_step_bound_never_exceeded() {
    let llm = Arc::new(MockLlmClient::with_replies(vec![
        r#"{"action":"toggle_light"}"#;
        20
    ]));
    let h = harness(llm.clone(), config()).await;
    let (ctx, mut rx) = context(&h, "bound");

    let outcome = h.agent.run("keep going", &ctx, "default").await.unwrap();

    assert_eq!(llm.call_count(), 5);
    assert_eq!(h.toggles.load(Ordering::SeqCst), 5);
    assert_eq!(outcome.stop, StopReason::StepBudgetExhausted);
    assert_eq!(h.memory.load(&ctx.id).await.unwrap().len(), 5);
    assert_eq!(responses(&drain(&mut rx)), 5);
}

#[tokio::test]
async fn test_configured_step_bound() {
    let mut cfg = config();
    cfg.agent.max_steps = 2;
    let llm = Arc::new(MockLlmClient::with_replies(vec!["thinking"; 5]));
    let h = harness(llm.clone(), cfg).await;
    let (ctx, _rx) = context(&h, "two");

    let outcome = h.agent.run("go", &ctx, "default").await.unwrap();
    assert_eq!(outcome.steps, 2);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_malformed_actions_never_raise() {
    let llm = Arc::new(MockLlmClient::with_replies([
        "{not json at all",
        r#"["action", "finish"]"#,
        r#"{"room": "kitchen"}"#,
        r#"{"action": "teleport"}"#,
        r#"{"action": "read_file"}"#,
    ]));
    let h = harness(llm.clone(), config()).await;
    let (ctx, _rx) = context(&h, "messy");

    let outcome = h.agent.run("go", &ctx, "default").await.unwrap();

    assert_eq!(outcome.stop, StopReason::StepBudgetExhausted);
    let entries = h.memory.load(&ctx.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], "Action: teleport → Error: Unknown action: teleport");
    assert!(entries[1].starts_with("Action: read_file → Error: Invalid parameters"));
    assert!(outcome.transcript.starts_with("{not json at all\n"));
    assert!(outcome.transcript.contains("Action 4 result: Error: Unknown action: teleport"));
}

#[tokio::test]
async fn test_memory_visible_in_order_within_and_across_invocations() {
    let llm = Arc::new(MockLlmClient::with_replies([
        r#"{"action":"toggle_light","state":"on"}"#,
        r#"{"action":"toggle_light","state":"off"}"#,
        r#"{"action":"finish","summary":"first"}"#,
        r#"{"action":"finish","summary":"second"}"#,
    ]));
    let h = harness(llm.clone(), config()).await;
    let (ctx, _rx) = context(&h, "visible");

    h.agent.run("first", &ctx, "default").await.unwrap();
    h.agent.run("second", &ctx, "default").await.unwrap();

    let requests = llm.requests();
    assert_eq!(requests.len(), 4);
    assert!(memory_in_request(&requests[0]).is_empty());
    assert_eq!(
        memory_in_request(&requests[2]),
        vec![
            "Action: toggle_light → light is on",
            "Action: toggle_light → light is off",
        ]
    );
    assert_eq!(
        memory_in_request(&requests[3]),
        vec![
            "Action: toggle_light → light is on",
            "Action: toggle_light → light is off",
            "Action: finish → first",
        ]
    );
    // Transcript 只在一次调用内有效
    assert_eq!(requests[3].iter().rev().nth(1).unwrap().content, "");
    assert_eq!(requests[3].last().unwrap().content, "second");
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let llm = Arc::new(MockLlmClient::with_replies([
        r#"{"action":"toggle_light"}"#,
        r#"{"action":"finish"}"#,
        r#"{"action":"finish"}"#,
    ]));
    let h = harness(llm.clone(), config()).await;
    let (a, _rx_a) = context(&h, "a");
    let (b, _rx_b) = context(&h, "b");

    h.agent.run("go", &a, "default").await.unwrap();
    h.agent.run("go", &b, "default").await.unwrap();

    assert!(memory_in_request(&llm.requests()[2]).is_empty());
    assert_eq!(h.memory.load(&a.id).await.unwrap().len(), 2);
    assert_eq!(h.memory.load(&b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_completion_failure_aborts_without_dispatch() {
    let llm = Arc::new(MockLlmClient::failing(LlmError::RateLimited {
        retry_after_ms: 10,
    }));
    let h = harness(llm.clone(), config()).await;
    let (ctx, mut rx) = context(&h, "fail");

    let err = h.agent.run("go", &ctx, "default").await.unwrap_err();

    assert!(err.is_completion_failure());
    assert_eq!(llm.call_count(), 1);
    assert_eq!(h.toggles.load(Ordering::SeqCst), 0);
    assert!(h.memory.load(&ctx.id).await.unwrap().is_empty());
    let events = drain(&mut rx);
    assert_eq!(responses(&events), 0);
    assert!(matches!(events.as_slice(), [SinkEvent::Error { .. }]));
}

#[tokio::test]
async fn test_mode_reaches_system_message() {
    let llm = Arc::new(MockLlmClient::with_replies([r#"{"action":"finish"}"#]));
    let h = harness(llm.clone(), config()).await;
    let (ctx, _rx) = context(&h, "mode");

    h.agent.run("go", &ctx, "review").await.unwrap();

    let first = &llm.requests()[0];
    assert_eq!(first[0].role, Role::System);
    assert!(first[0].content.ends_with("Mode: review"));
    assert!(first[0].content.contains("toggle_light"));
}

#[tokio::test]
async fn test_concurrent_runs_on_one_session_are_serialized() {
    let llm = Arc::new(SlowFinish::new(Duration::from_millis(100)));
    let h = harness(llm.clone(), config()).await;
    let (ctx, _rx) = context(&h, "serial");

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.agent.run("second", &ctx, "default").await
    };
    let (r1, r2) = tokio::join!(h.agent.run("first", &ctx, "default"), second);

    assert!(r1.is_ok());
    assert!(r2.is_ok());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    assert_eq!(llm.peak.load(Ordering::SeqCst), 1);
    // 第二次调用在第一次写入记忆之后才开始
    let requests = llm.requests.lock().unwrap().clone();
    assert!(memory_in_request(&requests[0]).is_empty());
    assert_eq!(memory_in_request(&requests[1]), vec!["Action: finish → done"]);
    assert_eq!(requests[1].last().unwrap().content, "second");
    assert_eq!(h.memory.load(&ctx.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_busy_session_rejected_when_configured() {
    let mut cfg = config();
    cfg.agent.reject_concurrent = true;
    let llm = Arc::new(SlowFinish::new(Duration::from_millis(200)));
    let h = harness(llm.clone(), cfg).await;
    let (ctx, _rx) = context(&h, "busy");
    let (other, _rx_other) = context(&h, "other");

    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.agent.run("second", &ctx, "default").await
    };
    let third = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.agent.run("third", &other, "default").await
    };
    let (r1, r2, r3) = tokio::join!(h.agent.run("first", &ctx, "default"), second, third);

    assert!(r1.is_ok());
    assert!(matches!(r2, Err(AgentError::SessionBusy(_))));
    assert!(r3.is_ok());
}

#[tokio::test]
async fn test_cancellation_aborts_run() {
    let llm = Arc::new(SlowFinish::new(Duration::from_secs(10)));
    let h = harness(llm.clone(), config()).await;
    let (ctx, mut rx) = context(&h, "cancel");
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        }
    };
    let (result, _) = tokio::join!(
        h.agent.run_with_cancel("go", &ctx, "default", token),
        canceller
    );

    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert!(h.memory.load(&ctx.id).await.unwrap().is_empty());
    assert!(matches!(drain(&mut rx).as_slice(), [SinkEvent::Error { .. }]));
}

#[tokio::test]
async fn test_file_memory_survives_new_agent() {
    let mem_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let session = SessionId::from("durable");

    for (reply, expected_seen) in [
        (r#"{"action":"toggle_light"}"#, 0usize),
        (r#"{"action":"finish"}"#, 1usize),
    ] {
        let llm = Arc::new(MockLlmClient::with_replies([reply, r#"{"action":"finish"}"#]));
        let store = Arc::new(JsonlMemoryStore::new(mem_dir.path(), RetentionPolicy::default()));
        let agent = AgentBuilder::new(config())
            .with_llm(llm.clone())
            .with_memory(store)
            .register_action(ToggleLight {
                calls: Arc::new(AtomicUsize::new(0)),
            })
            .build()
            .await
            .unwrap();
        let ctx = SessionContext::new(session.clone(), workspace.path(), Vec::new(), 5);
        agent.run("go", &ctx, "default").await.unwrap();
        assert_eq!(memory_in_request(&llm.requests()[0]).len(), expected_seen * 2);
    }
}

#[tokio::test]
async fn test_retention_window_limits_visible_memory() {
    let mut replies = vec![r#"{"action":"toggle_light"}"#; 5];
    replies.push(r#"{"action":"finish"}"#);
    let llm = Arc::new(MockLlmClient::with_replies(replies));
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new(RetentionPolicy::max_entries(3)));
    let agent = AgentBuilder::new(config())
        .with_llm(llm.clone())
        .with_memory(store.clone())
        .register_action(ToggleLight {
            calls: Arc::new(AtomicUsize::new(0)),
        })
        .build()
        .await
        .unwrap();
    let ctx = SessionContext::new(SessionId::from("window"), dir.path(), Vec::new(), 5);

    agent.run("first", &ctx, "default").await.unwrap();
    agent.run("second", &ctx, "default").await.unwrap();

    assert_eq!(memory_in_request(&llm.requests()[5]).len(), 3);
    assert_eq!(store.load(&ctx.id).await.unwrap().len(), 3);
}
