//! 按配置创建 LLM 客户端
//!
//! provider 决定端点与 API Key 环境变量；retry.max_retries > 0 时外包一层 RetryingLlmClient。

use std::sync::Arc;

use crate::config::LlmSection;
use crate::llm::{LlmClient, MockLlmClient, ModelParams, OpenAiClient, RetryingLlmClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 未知 provider 或缺少 API Key
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Unknown LLM provider: {0}")]
    UnknownProvider(String),

    #[error("No API key for provider '{provider}' (set llm.api_key or {env_var})")]
    MissingApiKey {
        provider: String,
        env_var: &'static str,
    },
}

fn api_key_env(provider: &str) -> &'static str {
    match provider {
        "deepseek" => "DEEPSEEK_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

/// 构造客户端（不含重试包装）
pub fn create_client(section: &LlmSection) -> Result<Arc<dyn LlmClient>, ProviderError> {
    let provider = section.provider.to_lowercase();
    if provider == "mock" {
        return Ok(Arc::new(MockLlmClient::new()));
    }

    let default_base = match provider.as_str() {
        "openai" => None,
        "deepseek" => Some(DEEPSEEK_BASE_URL),
        other => return Err(ProviderError::UnknownProvider(other.to_string())),
    };
    let env_var = api_key_env(&provider);
    let api_key = section
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(env_var).ok())
        .ok_or_else(|| ProviderError::MissingApiKey {
            provider: provider.clone(),
            env_var,
        })?;
    let base_url = section.base_url.as_deref().or(default_base);

    Ok(Arc::new(OpenAiClient::new(
        provider,
        base_url,
        &api_key,
        section.timeouts.request,
    )))
}

/// 构造客户端并按 retry 配置包装
pub fn create_llm_from_config(section: &LlmSection) -> Result<Arc<dyn LlmClient>, ProviderError> {
    let client = create_client(section)?;
    tracing::info!(
        provider = %section.provider,
        model = %section.model,
        max_retries = section.retry.max_retries,
        "llm client ready"
    );
    if section.retry.max_retries > 0 {
        Ok(Arc::new(RetryingLlmClient::new(client, section.retry)))
    } else {
        Ok(client)
    }
}

/// 配置中的模型参数
pub fn model_params_from_config(section: &LlmSection) -> ModelParams {
    ModelParams::new(section.model.clone())
        .with_temperature(section.temperature)
        .with_max_tokens(section.max_tokens)
}
