use crate::config::OptimizerSection;
use crate::core::OptimizeError;

/// 优化器运行参数（由 [optimizer] 配置段转换而来）
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub num_trials: usize,
    pub num_few_shot: usize,
    pub num_demo_candidates: usize,
    pub mini_batch_size: usize,
    /// 0 表示不做全量评估与扩展
    pub full_eval_every: usize,
    pub num_candidates: usize,
    pub num_samples: usize,
    pub expansion_candidates: usize,
    pub bootstrap_target: usize,
    pub eval_concurrency: usize,
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerSection::default().into()
    }
}

impl From<OptimizerSection> for OptimizerConfig {
    fn from(section: OptimizerSection) -> Self {
        Self {
            num_trials: section.num_trials,
            num_few_shot: section.num_few_shot,
            num_demo_candidates: section.num_demo_candidates,
            mini_batch_size: section.mini_batch_size,
            full_eval_every: section.full_eval_every,
            num_candidates: section.num_candidates,
            num_samples: section.num_samples,
            expansion_candidates: section.expansion_candidates,
            bootstrap_target: section.bootstrap_target,
            eval_concurrency: section.eval_concurrency,
            seed: section.seed,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.num_demo_candidates == 0 {
            return Err(OptimizeError::InvalidConfig(
                "num_demo_candidates must be at least 1".into(),
            ));
        }
        if self.mini_batch_size == 0 {
            return Err(OptimizeError::InvalidConfig(
                "mini_batch_size must be at least 1".into(),
            ));
        }
        if self.eval_concurrency == 0 {
            return Err(OptimizeError::InvalidConfig(
                "eval_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
