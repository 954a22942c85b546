//! 协作方能力接口：任务执行器（instruction + demos + input → output）与评分器（output vs expected → [0,1]）
//!
//! 优化核心只依赖这两个 trait，测试替身可直接替换。

pub mod executor;
pub mod scorer;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::dataset::DatasetRow;
use crate::llm::LlmError;

pub use executor::LlmTaskExecutor;
pub use scorer::{create_scorer, ExactMatchScorer, RecordF1Scorer};

/// 任务执行失败（对优化运行是致命错误）
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Other(String),
}

/// 任务执行器
///
/// 前置：`demos` 可为空（zero-shot）。后置：相同参数应尽量得到相同输出，
/// 否则每个组合的奖励分布不再平稳，UCB1 的假设只近似成立。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        input: &Value,
        demos: &[DatasetRow],
        instruction: &str,
    ) -> Result<Value, TaskError>;
}

/// 评分器：返回 [0,1]；output 或 expected 为空时返回 0 而不是报错
pub trait Scorer: Send + Sync {
    fn score(&self, output: &Value, expected: &Value) -> f64;
}

/// 空值判定：null、空字符串、空数组、空对象
pub fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
