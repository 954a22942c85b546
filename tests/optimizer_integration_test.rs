//! 优化主控集成测试：热启动顺序、最优单调、臂空间扩展、取消、致命错误与可复现性

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use mipro::config::LlmSection;
use mipro::llm::{create_llm_from_config, LlmError, MockLlmClient};
use mipro::optimizer::{ComboId, SelectionKind};
use mipro::task::{create_scorer, ExactMatchScorer, LlmTaskExecutor, TaskError, TaskExecutor};
use mipro::{load_dataset, DatasetRow, OptimizationController, OptimizeError, OptimizerConfig};

/// 含 "v2" 的指令全部答对；其余指令只答对偶数 id
struct InstructionSensitiveExecutor {
    calls: AtomicUsize,
}

impl InstructionSensitiveExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TaskExecutor for InstructionSensitiveExecutor {
    async fn execute(
        &self,
        input: &Value,
        _demos: &[DatasetRow],
        instruction: &str,
    ) -> Result<Value, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = input["id"].as_i64().unwrap_or(1);
        if instruction.contains("v2") || id % 2 == 0 {
            Ok(input["answer"].clone())
        } else {
            Ok(json!([]))
        }
    }
}

fn dataset(n: i64) -> Vec<DatasetRow> {
    (0..n)
        .map(|i| {
            let answer = json!([{ "id": i }]);
            DatasetRow::new(json!({ "id": i, "answer": answer }), answer)
        })
        .collect()
}

fn config(num_trials: usize, full_eval_every: usize) -> OptimizerConfig {
    OptimizerConfig {
        num_trials,
        num_few_shot: 2,
        num_demo_candidates: 2,
        mini_batch_size: 3,
        full_eval_every,
        num_candidates: 2,
        num_samples: 3,
        expansion_candidates: 3,
        bootstrap_target: 2,
        eval_concurrency: 2,
        seed: Some(42),
    }
}

fn items(instructions: &[&str]) -> String {
    let items: Vec<Value> = instructions
        .iter()
        .map(|i| json!({ "instruction": i }))
        .collect();
    json!({ "items": items }).to_string()
}

fn controller(
    llm: Arc<MockLlmClient>,
    cfg: OptimizerConfig,
) -> (OptimizationController, Arc<InstructionSensitiveExecutor>) {
    let exec = InstructionSensitiveExecutor::new();
    let ctrl = OptimizationController::new(exec.clone(), Arc::new(ExactMatchScorer), llm, cfg)
        .with_rng(StdRng::seed_from_u64(7));
    (ctrl, exec)
}

#[tokio::test]
async fn test_warm_start_visits_initial_combos_in_order() {
    let llm = Arc::new(MockLlmClient::new());
    let (mut ctrl, _) = controller(llm.clone(), config(4, 0));

    let report = ctrl
        .run(vec!["base".into(), "alt".into()], &dataset(8))
        .await
        .unwrap();

    assert_eq!(report.trials.len(), 4);
    for (t, trial) in report.trials.iter().enumerate() {
        assert_eq!(trial.combo, ComboId(t));
        assert_eq!(trial.selection, SelectionKind::WarmStart);
    }
    assert!(report.combos.iter().all(|c| c.trial_count == 1));
    // full evaluation disabled → no LLM calls at all
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_demo_pools_have_fixed_size() {
    let llm = Arc::new(MockLlmClient::new());
    let mut cfg = config(2, 0);
    cfg.num_few_shot = 5;
    cfg.num_demo_candidates = 3;
    let (mut ctrl, _) = controller(llm, cfg);

    let report = ctrl.run(vec!["base".into()], &dataset(4)).await.unwrap();
    assert_eq!(report.demo_pools.len(), 3);
    assert!(report.demo_pools.iter().all(|p| p.len() == 5));
    assert_eq!(report.best.demos.len(), 5);
}

#[tokio::test]
async fn test_expansion_adds_k_times_pools_combos_without_duplicates() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        "Emails that mention ids.".to_string(),
        items(&["v2 first", "v2 second", "v2 first"]),
    ]));
    let (mut ctrl, _) = controller(llm.clone(), config(4, 4));

    let report = ctrl
        .run(vec!["base".into(), "alt".into()], &dataset(8))
        .await
        .unwrap();

    let checkpoint = &report.trials[3];
    assert!(checkpoint.full_eval_score.is_some());
    let k = checkpoint.new_instructions;
    assert!((2..=3).contains(&k), "unexpected k = {}", k);
    assert_eq!(report.combos.len(), 4 + k * 2);

    let mut keys = HashSet::new();
    for combo in &report.combos {
        assert!(keys.insert((combo.instruction.clone(), combo.pool_index)));
    }
    let instructions: HashSet<&str> = report.combos.iter().map(|c| c.instruction.as_str()).collect();
    assert_eq!(instructions.len(), 2 + k);
    // summary + one structured generation
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_best_score_is_monotone_and_matches_max_observation() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        "Emails that mention ids.".to_string(),
        items(&["v2 round one"]),
        items(&["v2 round two"]),
        items(&["v2 round three"]),
    ]));
    let (mut ctrl, _) = controller(llm, config(12, 4));

    let report = ctrl
        .run(vec!["base".into(), "alt".into()], &dataset(8))
        .await
        .unwrap();

    assert_eq!(report.trials.len(), 12);
    for pair in report.trials.windows(2) {
        assert!(pair[1].best_score >= pair[0].best_score);
    }

    let observed_max = report
        .trials
        .iter()
        .flat_map(|t| std::iter::once(t.minibatch_score).chain(t.full_eval_score))
        .fold(0.0_f64, f64::max);
    assert_eq!(report.best.score, observed_max);
    assert!(report
        .trials
        .iter()
        .all(|t| (0.0..=1.0).contains(&t.minibatch_score)));

    // "v2" 指令对所有行都正确，扩展出的组合一旦被试到就是满分
    assert_eq!(report.best.score, 1.0);
    assert!(report
        .combos
        .iter()
        .filter(|c| c.instruction.contains("v2") && c.trial_count > 0)
        .all(|c| c.mean_score == 1.0));
    assert!(report.combos.iter().any(|c| c.instruction.contains("v2") && c.trial_count > 0));
}

#[tokio::test]
async fn test_schema_violation_during_expansion_aborts_run() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        "summary".to_string(),
        r#"{"items": [{"prompt": "wrong field"}]}"#.to_string(),
    ]));
    let (mut ctrl, _) = controller(llm, config(4, 2));

    let err = ctrl
        .run(vec!["base".into()], &dataset(6))
        .await
        .unwrap_err();
    assert!(matches!(err, OptimizeError::Llm(LlmError::Schema(_))));
}

#[tokio::test]
async fn test_cancelled_run_returns_current_best() {
    let llm = Arc::new(MockLlmClient::new());
    let token = CancellationToken::new();
    token.cancel();
    let exec = InstructionSensitiveExecutor::new();
    let mut ctrl =
        OptimizationController::new(exec.clone(), Arc::new(ExactMatchScorer), llm, config(10, 0))
            .with_cancellation(token);

    let report = ctrl.run(vec!["base".into()], &dataset(6)).await.unwrap();
    assert!(report.cancelled);
    assert!(report.trials.is_empty());
    assert_eq!(report.best.instruction, "base");
    assert_eq!(report.best.score, 0.0);
    assert_eq!(exec.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_same_seed_gives_same_trajectory() {
    let script = || {
        Arc::new(MockLlmClient::with_responses(vec![
            "summary".to_string(),
            items(&["v2 a", "v2 b"]),
            items(&["v2 c"]),
        ]))
    };

    // 两次扩展（trial 2、5）正好消耗完脚本
    let (mut a, _) = controller(script(), config(8, 3));
    let (mut b, _) = controller(script(), config(8, 3));
    let ra = a.run(vec!["base".into()], &dataset(8)).await.unwrap();
    let rb = b.run(vec!["base".into()], &dataset(8)).await.unwrap();

    let ta: Vec<_> = ra.trials.iter().map(|t| (t.combo, t.minibatch_score)).collect();
    let tb: Vec<_> = rb.trials.iter().map(|t| (t.combo, t.minibatch_score)).collect();
    assert_eq!(ta, tb);
    assert_eq!(ra.best, rb.best);
    assert_eq!(ra.combos.len(), rb.combos.len());
}

#[tokio::test]
async fn test_invalid_inputs_are_rejected() {
    let llm = Arc::new(MockLlmClient::new());
    let (mut ctrl, _) = controller(llm.clone(), config(3, 0));
    assert!(matches!(
        ctrl.run(vec!["base".into()], &[]).await,
        Err(OptimizeError::EmptyDataset)
    ));
    assert!(matches!(
        ctrl.run(Vec::new(), &dataset(3)).await,
        Err(OptimizeError::NoCandidates)
    ));

    let mut cfg = config(3, 0);
    cfg.mini_batch_size = 0;
    let (mut ctrl, _) = controller(llm, cfg);
    assert!(matches!(
        ctrl.run(vec!["base".into()], &dataset(3)).await,
        Err(OptimizeError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_propose_initial_candidates_keeps_base_first() {
    let llm = Arc::new(MockLlmClient::with_responses(vec![
        "summary".to_string(),
        items(&["variant one", "variant two"]),
    ]));
    let (mut ctrl, _) = controller(llm, config(1, 0));

    let candidates = ctrl
        .propose_initial_candidates("base instruction", &dataset(5))
        .await
        .unwrap();
    assert_eq!(candidates.len(), 3);
    assert_eq!(candidates[0], "base instruction");
    assert!(candidates[1].starts_with("variant one "));
    assert!(candidates[2].starts_with("variant two "));
}

#[tokio::test]
async fn test_bootstrap_is_diagnostic_and_ordered() {
    let llm = Arc::new(MockLlmClient::new());
    let (ctrl, exec) = controller(llm, config(1, 0));

    let harvested = ctrl.bootstrap(&dataset(8), "base").await.unwrap();
    let ids: Vec<i64> = harvested
        .iter()
        .map(|r| r.input["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![0, 2]);
    assert_eq!(exec.calls.load(Ordering::SeqCst), 3);
}

/// 总是答对；第 `cancel_at` 次调用时取消 token。`yield_after_cancel` 为真时再让出一次，
/// 使取消发生在评估中途，否则本次评估照常完成
struct CancellingExecutor {
    calls: AtomicUsize,
    cancel_at: usize,
    token: CancellationToken,
    yield_after_cancel: bool,
}

#[async_trait]
impl TaskExecutor for CancellingExecutor {
    async fn execute(
        &self,
        input: &Value,
        _demos: &[DatasetRow],
        _instruction: &str,
    ) -> Result<Value, TaskError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.cancel_at {
            self.token.cancel();
            if self.yield_after_cancel {
                tokio::task::yield_now().await;
            }
        }
        Ok(input["answer"].clone())
    }
}

/// 单指令、单个空 demo 池、串行评估：第 t 次 trial 的 mini-batch 占用第 3t+1..=3t+3 次调用
async fn run_cancelled_at(
    cancel_at: usize,
    yield_after_cancel: bool,
    full_eval_every: usize,
) -> (mipro::OptimizationReport, Arc<CancellingExecutor>, Arc<MockLlmClient>) {
    let token = CancellationToken::new();
    let exec = Arc::new(CancellingExecutor {
        calls: AtomicUsize::new(0),
        cancel_at,
        token: token.clone(),
        yield_after_cancel,
    });
    let llm = Arc::new(MockLlmClient::new());
    let mut cfg = config(10, full_eval_every);
    cfg.num_few_shot = 0;
    cfg.num_demo_candidates = 1;
    cfg.eval_concurrency = 1;

    let mut ctrl = OptimizationController::new(exec.clone(), Arc::new(ExactMatchScorer), llm.clone(), cfg)
        .with_rng(StdRng::seed_from_u64(3))
        .with_cancellation(token);
    let report = ctrl.run(vec!["base".into()], &dataset(6)).await.unwrap();
    (report, exec, llm)
}

#[tokio::test]
async fn test_cancel_during_minibatch_keeps_completed_trials() {
    let (report, exec, _) = run_cancelled_at(5, true, 0).await;

    assert!(report.cancelled);
    assert_eq!(report.trials.len(), 1);
    assert_eq!(report.trials[0].minibatch_score, 1.0);
    assert_eq!(report.best.score, 1.0);
    assert_eq!(exec.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_cancel_during_full_evaluation_records_partial_trial() {
    // trial 0: 1..=3, trial 1: 4..=6, full evaluation: 7..=12
    let (report, exec, llm) = run_cancelled_at(8, true, 2).await;

    assert!(report.cancelled);
    assert_eq!(report.trials.len(), 2);
    assert_eq!(report.trials[1].minibatch_score, 1.0);
    assert_eq!(report.trials[1].full_eval_score, None);
    assert_eq!(report.best.score, 1.0);
    assert_eq!(exec.calls.load(Ordering::SeqCst), 8);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_before_expansion_skips_llm() {
    // 取消发生在全量评估最后一行，评估完成但扩展不再发起
    let (report, _, llm) = run_cancelled_at(12, false, 2).await;

    assert!(report.cancelled);
    assert_eq!(report.trials.len(), 2);
    assert_eq!(report.trials[1].full_eval_score, Some(1.0));
    assert_eq!(report.trials[1].new_instructions, 0);
    assert_eq!(report.trials[1].best_score, 1.0);
    assert_eq!(report.combos.len(), 1);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_mock_provider_runs_full_pipeline() {
    let llm_cfg = LlmSection {
        provider: "mock".into(),
        ..LlmSection::default()
    };
    let proposer = create_llm_from_config(&llm_cfg, None, 0.7);
    let task_llm = create_llm_from_config(&llm_cfg, None, 0.0);
    let dataset = load_dataset("data/dataset.json").unwrap();

    let mut ctrl = OptimizationController::new(
        Arc::new(LlmTaskExecutor::new(task_llm)),
        create_scorer("record_f1"),
        proposer,
        config(6, 3),
    );

    let base = "Extract calendar events as JSON.";
    let bootstrap = ctrl.bootstrap(&dataset, base).await.unwrap();
    assert!(bootstrap.is_empty());

    let candidates = ctrl.propose_initial_candidates(base, &dataset).await.unwrap();
    assert_eq!(candidates.len(), 3);
    assert_eq!(candidates[0], base);
    assert!(candidates[1].starts_with("Mock instruction 2-1 "));

    let report = ctrl.run(candidates, &dataset).await.unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.trials.len(), 6);
    assert_eq!(report.trials[2].new_instructions, 3);
    assert_eq!(report.trials[5].new_instructions, 3);
    assert_eq!(report.combos.len(), (3 + 3 + 3) * 2);
    // 摘要只在第 1 次调用生成，两次扩展分别是第 3、4 次调用
    for call in [3, 4] {
        let prefix = format!("Mock instruction {}-1 ", call);
        assert!(report.combos.iter().any(|c| c.instruction.starts_with(&prefix)));
    }
}
