//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 默认模式回显最后一条 User 消息；脚本模式按顺序弹出预设结果，脚本耗尽后回到回显。
//! 回显模式下遇到结构化请求（system prompt 带条目 Schema）时，按 Schema 造出指定个数的条目，
//! 这样 `provider = "mock"` 也能把整个优化流程跑通。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::llm::structured::parse_structured_request;
use crate::llm::{LlmClient, LlmError, Message, Role};

/// Mock 客户端：回显用户最后一条消息，或按脚本返回
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
    /// 每次调用收到的消息（测试断言 prompt 内容用）
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定内容
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(responses.into_iter().map(|s| Ok(s.into())))
    }

    /// 按顺序返回给定结果（可包含错误）
    pub fn with_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }

        let scripted = self.script.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(result) = scripted {
            return result;
        }

        if let Some(reply) = structured_echo(messages, call) {
            return Ok(reply);
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 条目 Schema 的 `$ref` 指向 definitions 中的同名定义
fn resolve_ref<'a>(root: &'a Value, schema: &'a Value) -> &'a Value {
    match schema
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.rsplit('/').next())
    {
        Some(name) => &root["definitions"][name],
        None => schema,
    }
}

/// 每个必填字段填入 `Mock <字段> <调用序号>-<条目序号>`，只适用于字符串字段
fn structured_echo(messages: &[Message], call: usize) -> Option<String> {
    let system = messages.iter().find(|m| matches!(m.role, Role::System))?;
    let (count, schema) = parse_structured_request(&system.content)?;
    let item = resolve_ref(&schema, &schema["properties"]["items"]["items"]);
    let fields: Vec<&str> = item["required"]
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();

    let items: Vec<Value> = (1..=count)
        .map(|i| {
            let entry: Map<String, Value> = fields
                .iter()
                .map(|f| (f.to_string(), Value::String(format!("Mock {} {}-{}", f, call, i))))
                .collect();
            Value::Object(entry)
        })
        .collect();
    Some(json!({ "items": items }).to_string())
}
