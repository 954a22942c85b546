//! 结构化生成：用 schemars 生成条目 JSON Schema 注入 prompt，再把回复解析为强类型条目列表
//!
//! 回复可以是 `{"items": [...]}`、裸数组，或包在 ```json 代码块里；不符合 Schema 即 LlmError::Schema。

use std::sync::OnceLock;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, Message};

/// 结构化输出外层：固定 `items` 字段（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
struct ItemList<T> {
    items: Vec<T>,
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("static regex"))
}

/// 从 LLM 回复中取出 JSON 文本：优先代码块，其次第一个 `{`/`[` 到最后一个 `}`/`]`
pub fn extract_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    if let Some(block) = fenced_block().captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(v) = serde_json::from_str::<Value>(block.as_str().trim()) {
            return Some(v);
        }
    }

    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

/// 条目 Schema（含 items 外层），用于拼入 system prompt
pub fn item_list_schema<T: JsonSchema>() -> String {
    let schema = schema_for!(ItemList<T>);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 解析结构化回复为条目列表
pub fn parse_items<T: DeserializeOwned>(response: &str) -> Result<Vec<T>, LlmError> {
    let value = extract_json(response)
        .ok_or_else(|| LlmError::Schema(format!("no JSON found in response: {}", preview(response))))?;

    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map
            .remove("items")
            .ok_or_else(|| LlmError::Schema("missing `items` field".to_string()))?,
        other => {
            return Err(LlmError::Schema(format!(
                "expected object or array, got {}",
                preview(&other.to_string())
            )))
        }
    };

    serde_json::from_value(items).map_err(|e| LlmError::Schema(e.to_string()))
}

const SCHEMA_HEADER: &str = "matching this JSON Schema (output JSON only, no commentary):\n";

/// 在调用方的 system prompt 后追加条目数与 Schema 约束
pub fn structured_system_prompt(system: &str, count: usize, schema: &str) -> String {
    format!(
        "{}\n\nRespond with a single JSON object containing exactly {} entries in `items`, {}{}",
        system, count, SCHEMA_HEADER, schema
    )
}

/// structured_system_prompt 的逆操作：取回 (条目数, Schema)；不是结构化请求时返回 None
pub fn parse_structured_request(system: &str) -> Option<(usize, Value)> {
    let (head, schema) = system.rsplit_once(SCHEMA_HEADER)?;
    let count = head
        .rsplit_once("exactly ")?
        .1
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    let schema = serde_json::from_str(schema.trim()).ok()?;
    Some((count, schema))
}

/// 一次结构化生成调用：请求 `count` 个条目
pub async fn generate_items<T>(
    llm: &dyn LlmClient,
    system: &str,
    user: &str,
    count: usize,
) -> Result<Vec<T>, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let system = structured_system_prompt(system, count, &item_list_schema::<T>());
    let response = llm
        .complete(&[Message::system(system), Message::user(user)])
        .await?;
    parse_items(&response)
}

fn preview(s: &str) -> String {
    s.chars().take(120).collect()
}
