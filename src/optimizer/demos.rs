//! Demo 池构建（teacher forcing）与运行前 bootstrap
//!
//! 池构建：打乱数据集，用 teacher 指令零样本执行，只收满分行；不够 `num_few_shot` 时用随机行补齐，
//! 因此输出长度恒等于 `num_few_shot`。bootstrap 则按原顺序扫描，只收集、不补齐。

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::core::OptimizeError;
use crate::dataset::DatasetRow;
use crate::optimizer::evaluator::Evaluator;
use crate::optimizer::types::DemoPool;

pub struct DemoPoolBuilder {
    evaluator: Arc<Evaluator>,
}

impl DemoPoolBuilder {
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self { evaluator }
    }

    async fn is_perfect(&self, instruction: &str, row: &DatasetRow) -> Result<bool, OptimizeError> {
        let score = self.evaluator.score_row(instruction, &[], row).await?;
        Ok(score >= 1.0)
    }

    /// 构建单个池
    pub async fn build_pool(
        &self,
        dataset: &[DatasetRow],
        teacher_instruction: &str,
        num_few_shot: usize,
        rng: &mut StdRng,
    ) -> Result<DemoPool, OptimizeError> {
        if num_few_shot == 0 {
            return Ok(Vec::new());
        }
        if dataset.is_empty() {
            return Err(OptimizeError::EmptyDataset);
        }

        let mut order: Vec<&DatasetRow> = dataset.iter().collect();
        order.shuffle(rng);

        let mut pool = Vec::with_capacity(num_few_shot);
        for row in order {
            if pool.len() >= num_few_shot {
                break;
            }
            if self.is_perfect(teacher_instruction, row).await? {
                pool.push(row.clone());
            }
        }

        let harvested = pool.len();
        while pool.len() < num_few_shot {
            if let Some(row) = dataset.choose(rng) {
                pool.push(row.clone());
            }
        }
        if harvested < num_few_shot {
            tracing::debug!(
                "Demo pool underfilled: {}/{} perfect rows, backfilled {} at random",
                harvested,
                num_few_shot,
                num_few_shot - harvested
            );
        }

        Ok(pool)
    }

    /// 构建 `num_pools` 个相互独立的池
    pub async fn build_pools(
        &self,
        dataset: &[DatasetRow],
        teacher_instruction: &str,
        num_few_shot: usize,
        num_pools: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<DemoPool>, OptimizeError> {
        let mut pools = Vec::with_capacity(num_pools);
        for i in 0..num_pools {
            let pool = self
                .build_pool(dataset, teacher_instruction, num_few_shot, rng)
                .await?;
            tracing::debug!("Built demo pool {} ({} rows)", i, pool.len());
            pools.push(pool);
        }
        Ok(pools)
    }

    /// 按原顺序零样本执行基础指令，收集满分行直到 `target`；一个都没有时返回空集
    pub async fn bootstrap(
        &self,
        dataset: &[DatasetRow],
        instruction: &str,
        target: usize,
    ) -> Result<Vec<DatasetRow>, OptimizeError> {
        let mut harvested = Vec::new();
        for row in dataset {
            if harvested.len() >= target {
                break;
            }
            if self.is_perfect(instruction, row).await? {
                harvested.push(row.clone());
            }
        }
        Ok(harvested)
    }
}
