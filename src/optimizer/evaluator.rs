//! 评估器：固定 (instruction, demos)，对一组行执行任务并取平均分
//!
//! 行之间互不依赖，按 `concurrency` 有界并发执行；所有行完成后才计算平均值。

use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::dataset::DatasetRow;
use crate::optimizer::types::EvaluationResult;
use crate::task::{Scorer, TaskError, TaskExecutor};

pub struct Evaluator {
    executor: Arc<dyn TaskExecutor>,
    scorer: Arc<dyn Scorer>,
    concurrency: usize,
}

impl Evaluator {
    pub fn new(executor: Arc<dyn TaskExecutor>, scorer: Arc<dyn Scorer>) -> Self {
        Self {
            executor,
            scorer,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// 单行打分，结果限制在 [0,1]（NaN 记 0）
    pub async fn score_row(
        &self,
        instruction: &str,
        demos: &[DatasetRow],
        row: &DatasetRow,
    ) -> Result<f64, TaskError> {
        let output = self.executor.execute(&row.input, demos, instruction).await?;
        let score = self.scorer.score(&output, &row.expected_output);
        Ok(if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) })
    }

    /// 平均分；空行集返回 0
    pub async fn evaluate(
        &self,
        instruction: &str,
        demos: &[DatasetRow],
        rows: &[DatasetRow],
    ) -> Result<EvaluationResult, TaskError> {
        let score = if rows.is_empty() {
            0.0
        } else {
            let scores: Vec<f64> = stream::iter(rows)
                .map(|row| self.score_row(instruction, demos, row))
                .buffered(self.concurrency)
                .try_collect()
                .await?;
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        Ok(EvaluationResult {
            score,
            instruction: instruction.to_string(),
            demos: demos.to_vec(),
        })
    }
}
