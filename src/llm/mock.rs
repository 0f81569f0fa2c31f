//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本依次返回预设回复；脚本耗尽后回显最后一条 User 消息并以 finish 结束，
//! 便于本地跑通整个循环。每次调用收到的对话都会被记录，供测试断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, ModelParams};
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fail_with: Option<LlmError>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    /// 空脚本：直接走回显
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定结果
    pub fn scripted(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// 只返回文本回复的脚本
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::scripted(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    /// 每次调用都失败
    pub fn failing(err: LlmError) -> Self {
        Self {
            fail_with: Some(err),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 每次调用收到的完整对话
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn echo_finish(messages: &[Message]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)");
    serde_json::json!({
        "action": "finish",
        "summary": format!("Echo from Mock: {}", last_user)
    })
    .to_string()
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _params: &ModelParams) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| Ok(echo_finish(messages)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
