//! 基于 LLM 的通用任务执行器
//!
//! instruction 作为 system prompt，每条 demo 展开为一组 user(input) / assistant(output) 轮次，
//! 最后是待处理的 input。回复按 JSON 解析；格式错误时回退为 `Value::Null`（评分为 0），
//! 只有 LLM 调用本身失败才向上抛错。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::dataset::DatasetRow;
use crate::llm::structured::extract_json;
use crate::llm::{LlmClient, Message};
use crate::task::{TaskError, TaskExecutor};

pub struct LlmTaskExecutor {
    llm: Arc<dyn LlmClient>,
}

impl LlmTaskExecutor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn render(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn build_messages(input: &Value, demos: &[DatasetRow], instruction: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(demos.len() * 2 + 2);
        messages.push(Message::system(format!(
            "{}\n\nReply with valid JSON only.",
            instruction.trim()
        )));
        for demo in demos {
            messages.push(Message::user(Self::render(&demo.input)));
            messages.push(Message::assistant(demo.expected_output.to_string()));
        }
        messages.push(Message::user(Self::render(input)));
        messages
    }
}

#[async_trait]
impl TaskExecutor for LlmTaskExecutor {
    async fn execute(
        &self,
        input: &Value,
        demos: &[DatasetRow],
        instruction: &str,
    ) -> Result<Value, TaskError> {
        let messages = Self::build_messages(input, demos, instruction);
        let response = self.llm.complete(&messages).await?;

        match extract_json(&response) {
            Some(v) => Ok(v),
            None => {
                tracing::warn!(
                    "Task output is not JSON, scoring as empty: {}",
                    response.chars().take(80).collect::<String>()
                );
                Ok(Value::Null)
            }
        }
    }
}
