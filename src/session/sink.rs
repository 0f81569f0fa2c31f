//! 消息通道：向观察者（UI / 日志 / HTTP 响应）单向推送事件
//!
//! notify 不阻塞、不返回错误；观察者不可用时事件直接丢弃，循环照常进行。

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// 推送给观察者的事件（序列化为 `{"type": "response", "text": "..."}`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkEvent {
    /// 每步一条：模型原始回复（无论能否解析为动作）
    Response { text: String },
    /// 致命错误（模型调用失败、取消、记忆读写失败），与正常结束区分
    Error { text: String },
}

impl SinkEvent {
    pub fn response(text: impl Into<String>) -> Self {
        Self::Response { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Response { text } | Self::Error { text } => text,
        }
    }
}

/// 消息通道 trait：尽力投递
pub trait MessageSink: Send + Sync {
    fn notify(&self, event: SinkEvent);
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn notify(&self, _event: SinkEvent) {}
}

/// 通过 tokio 无界通道转发；接收端已关闭时静默丢弃
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<SinkEvent>) -> Self {
        Self { tx }
    }

    /// 创建通道并返回 (sink, 接收端)
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn notify(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("sink receiver dropped, event discarded");
        }
    }
}

/// 写入 tracing 日志（无 UI 时的默认观察者）
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn notify(&self, event: SinkEvent) {
        match &event {
            SinkEvent::Response { text } => tracing::info!(text = %text, "agent response"),
            SinkEvent::Error { text } => tracing::warn!(text = %text, "agent error"),
        }
    }
}
