//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! DeepSeek 与 OpenAI 接口兼容，直接复用 OpenAiClient，只换 base_url 与 API key。
//! 候选生成器与任务执行器各持一个客户端：前者温度较高以保证指令多样性，后者通常为 0。
//! - Base URL: https://api.deepseek.com
//! - 默认模型: deepseek-chat

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端
///
/// - API key 取 `DEEPSEEK_API_KEY`，没有时退回 `OPENAI_API_KEY`
/// - 模型优先级：`model` 参数 > `DEEPSEEK_MODEL` 环境变量 > deepseek-chat
pub fn create_deepseek_client(model: Option<&str>, temperature: f32) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok();

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, api_key.as_deref())
        .with_temperature(temperature)
}
