//! mipro - 指令 / Few-shot 示例联合优化
//!
//! 入口：初始化日志、加载配置与数据集、bootstrap 诊断、生成初始候选、运行 UCB1 组合搜索并输出报告。
//!
//! 用法：`mipro [config.toml]`，环境变量 `MIPRO__*` 可覆盖任意配置项。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use mipro::{
    config::load_config,
    core::ShutdownManager,
    llm::create_llm_from_config,
    load_dataset, observability,
    task::{create_scorer, LlmTaskExecutor},
    OptimizationController, OptimizerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let dataset = load_dataset(&cfg.task.dataset_path).context("Failed to load dataset")?;

    let proposer = create_llm_from_config(&cfg.llm, None, cfg.llm.temperature);
    let task_llm = create_llm_from_config(&cfg.llm, cfg.task.model.as_deref(), cfg.task.temperature);
    let executor = Arc::new(LlmTaskExecutor::new(task_llm.clone()));
    let scorer = create_scorer(&cfg.task.scorer);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let optimizer_config = OptimizerConfig::from(cfg.optimizer.clone());
    let mut controller = OptimizationController::new(executor, scorer, proposer.clone(), optimizer_config)
        .with_cancellation(shutdown.token());

    let base = cfg.task.instruction.clone();
    let bootstrap = controller
        .bootstrap(&dataset, &base)
        .await
        .context("Bootstrap failed")?;
    for row in &bootstrap {
        tracing::info!("Bootstrap evidence: input={} output={}", row.input, row.expected_output);
    }

    let candidates = controller
        .propose_initial_candidates(&base, &dataset)
        .await
        .context("Failed to propose instruction candidates")?;

    let mut report = controller
        .run(candidates, &dataset)
        .await
        .context("Optimization failed")?;
    report.bootstrap_demos = bootstrap;

    println!("\nBest score: {:.3}", report.best.score);
    println!("Best instruction:\n{}", report.best.instruction);
    println!("Demos ({}):", report.best.demos.len());
    for demo in &report.best.demos {
        println!("  - {} → {}", demo.input, demo.expected_output);
    }
    if report.cancelled {
        println!("(run was cancelled; result reflects trials completed so far)");
    }

    let (p, c, t) = proposer.token_usage();
    let (tp, tc, tt) = task_llm.token_usage();
    tracing::info!(
        "Token usage: proposer {}/{}/{}, task {}/{}/{}",
        p, c, t, tp, tc, tt
    );

    if let Some(path) = &cfg.task.report_path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
    }

    Ok(())
}
