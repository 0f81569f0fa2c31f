//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；DeepSeek、OpenAI、自建代理均走这里。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, ModelParams};
use crate::memory::{Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    /// (prompt, completion, total)
    pub fn get(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

/// OpenAI 兼容客户端：模型名与温度随每次请求的 ModelParams 传入
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    name: String,
    request_timeout: Duration,
    usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        name: impl Into<String>,
        base_url: Option<&str>,
        api_key: &str,
        request_timeout_secs: u64,
    ) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }

        Self {
            client: Client::with_config(config),
            name: name.into(),
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            usage: TokenUsage::default(),
        }
    }

    /// 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    let build_err = |e: OpenAIError| LlmError::Api(format!("invalid request message: {}", e));
    messages
        .iter()
        .map(|m| {
            Ok(match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
            })
        })
        .collect()
}

/// 按错误文本归类 async_openai 的错误
fn classify_error(err: OpenAIError) -> LlmError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") {
        LlmError::RateLimited { retry_after_ms: 1000 }
    } else if lower.contains("deserialize") || lower.contains("json") {
        LlmError::MalformedResponse(msg)
    } else if lower.contains("http error")
        || lower.contains("connect")
        || lower.contains("dns")
        || lower.contains("stream")
    {
        LlmError::Network(msg)
    } else {
        LlmError::Api(msg)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], params: &ModelParams) -> Result<String, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(params.model.as_str())
            .messages(to_openai_messages(messages)?)
            .temperature(params.temperature);
        if let Some(max_tokens) = params.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::Api(format!("invalid request: {}", e)))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.request_timeout.as_secs()))?
            .map_err(classify_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
            tracing::debug!(
                backend = %self.name,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }

        // 没有任何 choice 属于协议层异常；choice 有但 content 为空则按空回复处理
        let choice = response
            .choices
            .first()
            .ok_or_else(|| LlmError::MalformedResponse("response has no choices".into()))?;
        Ok(choice.message.content.clone().unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
