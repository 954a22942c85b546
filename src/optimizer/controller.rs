//! 优化主控：构建初始组合、驱动 trial 循环、周期性全量评估与臂空间扩展、维护全局最优
//!
//! trial 严格串行，bandit 状态由本结构独占（&mut），选择与更新天然串行化。
//! 每个挂起点（评估、LLM 调用）都与 CancellationToken 竞争；被取消时停止并返回当前最优。

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::OptimizeError;
use crate::dataset::DatasetRow;
use crate::llm::LlmClient;
use crate::optimizer::bandit::BanditSearch;
use crate::optimizer::candidates::CandidateGenerator;
use crate::optimizer::config::OptimizerConfig;
use crate::optimizer::demos::DemoPoolBuilder;
use crate::optimizer::evaluator::Evaluator;
use crate::optimizer::types::{
    BestResult, Combo, ComboReport, DemoPool, OptimizationReport, TrialRecord,
};
use crate::task::{Scorer, TaskExecutor};

/// 与取消信号竞争；被取消时返回 None
async fn cancellable<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

/// 将新指令与每个 demo 池配对加入 bandit；已知指令（含本批重复）被跳过。返回新增指令数
pub fn register_instructions(
    bandit: &mut BanditSearch,
    known: &mut HashSet<String>,
    instructions: Vec<String>,
    num_pools: usize,
) -> usize {
    let mut added = 0;
    for instruction in instructions {
        if !known.insert(instruction.clone()) {
            tracing::debug!("Skipping known instruction: {}", instruction);
            continue;
        }
        for pool_index in 0..num_pools {
            bandit.add_combo(Combo::new(instruction.clone(), pool_index));
        }
        added += 1;
    }
    added
}

fn build_report(
    run_id: Uuid,
    started_at: DateTime<Utc>,
    best: BestResult,
    trials: Vec<TrialRecord>,
    bandit: &BanditSearch,
    demo_pools: Vec<DemoPool>,
    cancelled: bool,
) -> OptimizationReport {
    let combos = bandit
        .iter()
        .map(|(id, combo, stat)| ComboReport {
            id,
            instruction: combo.instruction.clone(),
            pool_index: combo.pool_index,
            mean_score: stat.mean(),
            trial_count: stat.trial_count,
        })
        .collect();

    OptimizationReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        best,
        trials,
        combos,
        demo_pools,
        bootstrap_demos: Vec::new(),
        cancelled,
    }
}

pub struct OptimizationController {
    config: OptimizerConfig,
    evaluator: Arc<Evaluator>,
    pool_builder: DemoPoolBuilder,
    generator: CandidateGenerator,
    rng: StdRng,
    cancel: CancellationToken,
    data_context: Option<String>,
}

impl OptimizationController {
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        scorer: Arc<dyn Scorer>,
        llm: Arc<dyn LlmClient>,
        config: OptimizerConfig,
    ) -> Self {
        let evaluator =
            Arc::new(Evaluator::new(executor, scorer).with_concurrency(config.eval_concurrency));
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            pool_builder: DemoPoolBuilder::new(evaluator.clone()),
            generator: CandidateGenerator::new(llm, config.num_samples),
            evaluator,
            rng,
            cancel: CancellationToken::new(),
            data_context: None,
            config,
        }
    }

    /// 替换随机源（测试中注入固定种子）
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 数据摘要只在第一次需要时生成并缓存，之后每次扩展都复用，省掉一次 LLM 调用
    async fn ensure_data_context(&mut self, dataset: &[DatasetRow]) -> Result<String, OptimizeError> {
        if let Some(ctx) = &self.data_context {
            return Ok(ctx.clone());
        }
        let ctx = self.generator.summarize_data(dataset, &mut self.rng).await?;
        tracing::debug!("Data context: {}", ctx);
        self.data_context = Some(ctx.clone());
        Ok(ctx)
    }

    /// 运行前诊断：收集基础指令零样本即满分的行（不进入搜索，只记录）
    pub async fn bootstrap(
        &self,
        dataset: &[DatasetRow],
        instruction: &str,
    ) -> Result<Vec<DatasetRow>, OptimizeError> {
        let target = self.config.bootstrap_target;
        let harvested = match cancellable(
            &self.cancel,
            self.pool_builder.bootstrap(dataset, instruction, target),
        )
        .await
        {
            Some(r) => r?,
            None => return Ok(Vec::new()),
        };
        tracing::info!(
            "Bootstrap: base instruction solves {}/{} requested rows zero-shot",
            harvested.len(),
            target
        );
        Ok(harvested)
    }

    /// 初始候选：`[base, 生成的 num_candidates 条...]`，去重后 base 始终在下标 0
    pub async fn propose_initial_candidates(
        &mut self,
        base_instruction: &str,
        dataset: &[DatasetRow],
    ) -> Result<Vec<String>, OptimizeError> {
        let cancel = self.cancel.clone();
        let num_candidates = self.config.num_candidates;

        let generated = match cancellable(&cancel, async {
            let ctx = self.ensure_data_context(dataset).await?;
            self.generator
                .generate(base_instruction, &ctx, &[], num_candidates, &mut self.rng)
                .await
                .map_err(OptimizeError::from)
        })
        .await
        {
            Some(r) => r?,
            None => Vec::new(),
        };

        let mut candidates = vec![base_instruction.to_string()];
        for instruction in generated {
            if !candidates.contains(&instruction) {
                candidates.push(instruction);
            }
        }
        tracing::info!("Proposed {} initial instruction candidates", candidates.len());
        Ok(candidates)
    }

    async fn expand(
        &mut self,
        best: &BestResult,
        dataset: &[DatasetRow],
    ) -> Result<Vec<String>, OptimizeError> {
        let ctx = self.ensure_data_context(dataset).await?;
        let traces = [best.as_trace()];
        let generated = self
            .generator
            .generate(
                &best.instruction,
                &ctx,
                &traces,
                self.config.expansion_candidates,
                &mut self.rng,
            )
            .await?;
        Ok(generated)
    }

    /// 执行完整优化；`initial_candidates[0]` 同时作为 demo 池构建的 teacher 指令
    pub async fn run(
        &mut self,
        initial_candidates: Vec<String>,
        dataset: &[DatasetRow],
    ) -> Result<OptimizationReport, OptimizeError> {
        self.config.validate()?;
        if dataset.is_empty() {
            return Err(OptimizeError::EmptyDataset);
        }

        let mut known = HashSet::new();
        let candidates: Vec<String> = initial_candidates
            .into_iter()
            .filter(|c| known.insert(c.clone()))
            .collect();
        if candidates.is_empty() {
            return Err(OptimizeError::NoCandidates);
        }

        let cancel = self.cancel.clone();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let teacher = candidates[0].clone();
        let mut best = BestResult {
            instruction: teacher.clone(),
            demos: Vec::new(),
            score: 0.0,
        };
        let mut bandit = BanditSearch::new();
        let mut trials = Vec::with_capacity(self.config.num_trials);

        tracing::info!(
            "Optimization {} starting: {} candidates, {} demo pools, {} trials",
            run_id,
            candidates.len(),
            self.config.num_demo_candidates,
            self.config.num_trials
        );

        let pools = match cancellable(
            &cancel,
            self.pool_builder.build_pools(
                dataset,
                &teacher,
                self.config.num_few_shot,
                self.config.num_demo_candidates,
                &mut self.rng,
            ),
        )
        .await
        {
            Some(r) => r?,
            None => {
                tracing::warn!("Optimization cancelled while building demo pools");
                return Ok(build_report(run_id, started_at, best, trials, &bandit, Vec::new(), true));
            }
        };
        best.demos = pools[0].clone();

        for instruction in &candidates {
            for pool_index in 0..pools.len() {
                bandit.add_combo(Combo::new(instruction.clone(), pool_index));
            }
        }

        let batch_size = self.config.mini_batch_size.min(dataset.len());
        let mut cancelled = false;

        for t in 0..self.config.num_trials {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let (id, selection) = bandit.select(t).ok_or(OptimizeError::NoCandidates)?;
            let combo = bandit.combo(id).clone();
            let demos = &pools[combo.pool_index];
            let batch: Vec<DatasetRow> = dataset
                .choose_multiple(&mut self.rng, batch_size)
                .cloned()
                .collect();

            let result = match cancellable(
                &cancel,
                self.evaluator.evaluate(&combo.instruction, demos, &batch),
            )
            .await
            {
                Some(r) => r?,
                None => {
                    cancelled = true;
                    break;
                }
            };

            bandit.record(id, result.score);
            if best.offer(&result) {
                tracing::info!("Trial {}: new best {:.3} (mini-batch)", t, best.score);
            }
            tracing::debug!(
                "Trial {}: combo {:?} ({:?}) scored {:.3}",
                t,
                id,
                selection,
                result.score
            );

            let mut record = TrialRecord {
                trial: t,
                combo: id,
                pool_index: combo.pool_index,
                selection,
                minibatch_score: result.score,
                full_eval_score: None,
                new_instructions: 0,
                best_score: best.score,
            };

            if self.config.full_eval_every > 0 && (t + 1) % self.config.full_eval_every == 0 {
                let full = match cancellable(
                    &cancel,
                    self.evaluator.evaluate(&combo.instruction, demos, dataset),
                )
                .await
                {
                    Some(r) => r?,
                    None => {
                        cancelled = true;
                        trials.push(record);
                        break;
                    }
                };
                record.full_eval_score = Some(full.score);
                tracing::info!("Trial {}: full evaluation {:.3}", t, full.score);
                if best.offer(&full) {
                    tracing::info!("Trial {}: new best {:.3} (full dataset)", t, best.score);
                }

                let generated = match cancellable(&cancel, self.expand(&best, dataset)).await {
                    Some(r) => r?,
                    None => {
                        cancelled = true;
                        record.best_score = best.score;
                        trials.push(record);
                        break;
                    }
                };
                let added = register_instructions(&mut bandit, &mut known, generated, pools.len());
                tracing::info!(
                    "Trial {}: {} new instructions, {} combos total",
                    t,
                    added,
                    bandit.len()
                );
                record.new_instructions = added;
                record.best_score = best.score;
            }

            trials.push(record);
        }

        if cancelled {
            tracing::warn!("Optimization cancelled after {} trials", trials.len());
        }
        tracing::info!(
            "Optimization {} finished: best score {:.3} with {} combos explored",
            run_id,
            best.score,
            bandit.len()
        );

        Ok(build_report(run_id, started_at, best, trials, &bandit, pools, cancelled))
    }
}
