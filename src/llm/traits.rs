//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete（非流式）。
//! RetryingLlmClient 对瞬时错误（网络、超时、限流）做指数退避重试，Schema 等永久错误直接上抛。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error: {0}")]
    ApiError(String),

    /// 结构化生成的输出不符合约定 Schema
    #[error("Structured output violates schema: {0}")]
    Schema(String),
}

impl LlmError {
    /// 是否值得重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_) | LlmError::Timeout(_) | LlmError::RateLimited { .. }
        )
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试策略：最大次数、初始/最大退避、单次请求超时
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            request_timeout_secs: 60,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试（从 0 开始）前的等待时间；限流时取服务端建议与退避的较大值
    pub fn backoff_for(&self, attempt: u32, err: &LlmError) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_backoff_ms);
        let ms = match err {
            LlmError::RateLimited { retry_after_ms } => exp.max(*retry_after_ms),
            _ => exp,
        };
        Duration::from_millis(ms)
    }
}

/// 包装任意 LlmClient：超时 + 指数退避重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(timeout, self.inner.complete(messages)).await {
                Ok(r) => r,
                Err(_) => Err(LlmError::Timeout(self.config.request_timeout_secs)),
            };

            match result {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let wait = self.config.backoff_for(attempt, &e);
                    tracing::warn!(
                        "LLM call failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt + 1,
                        self.config.max_retries,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
