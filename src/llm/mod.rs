//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、重试包装、结构化生成

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

use std::sync::Arc;

pub use deepseek::create_deepseek_client;
pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError, RetryConfig, RetryingLlmClient};

use crate::config::LlmSection;

/// 实际使用的后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenAi,
    DeepSeek,
    Mock,
}

/// 按 provider 与可用的 API key 选择后端
///
/// 请求的 provider 缺 key 时才退回另一家；两家都没有 key 时用 Mock。
pub fn select_backend(provider: &str, has_deepseek_key: bool, has_openai_key: bool) -> Backend {
    match provider.to_lowercase().as_str() {
        "mock" => Backend::Mock,
        "openai" if has_openai_key => Backend::OpenAi,
        "openai" if has_deepseek_key => {
            tracing::warn!("provider = openai but OPENAI_API_KEY is not set, falling back to DeepSeek");
            Backend::DeepSeek
        }
        // DeepSeek 兼容 OpenAI 格式，OPENAI_API_KEY 也可作为其 key
        "deepseek" if has_deepseek_key || has_openai_key => Backend::DeepSeek,
        other => {
            if other != "openai" && other != "deepseek" {
                tracing::warn!("Unknown LLM provider '{}'", other);
            }
            if has_deepseek_key {
                Backend::DeepSeek
            } else {
                tracing::warn!("No API key for provider '{}', using Mock LLM", other);
                Backend::Mock
            }
        }
    }
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock），并套上重试包装
///
/// `model_override` / `temperature` 用于任务执行器与候选生成器使用不同模型、不同温度的场景。
pub fn create_llm_from_config(
    cfg: &LlmSection,
    model_override: Option<&str>,
    temperature: f32,
) -> Arc<dyn LlmClient> {
    let backend = select_backend(
        &cfg.provider,
        std::env::var("DEEPSEEK_API_KEY").is_ok(),
        std::env::var("OPENAI_API_KEY").is_ok(),
    );

    let base: Arc<dyn LlmClient> = match backend {
        Backend::OpenAi => {
            let model = model_override
                .map(String::from)
                .or_else(|| cfg.openai.model.clone())
                .unwrap_or_else(|| cfg.model.clone());
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(
                OpenAiClient::new(cfg.base_url.as_deref(), &model, None).with_temperature(temperature),
            )
        }
        Backend::DeepSeek => {
            let model = model_override
                .map(String::from)
                .or_else(|| cfg.deepseek.model.clone())
                .unwrap_or_else(|| cfg.model.clone());
            tracing::info!("Using DeepSeek LLM ({})", model);
            Arc::new(create_deepseek_client(Some(&model), temperature))
        }
        Backend::Mock => {
            tracing::warn!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    };

    Arc::new(RetryingLlmClient::new(base, cfg.retry_config()))
}
