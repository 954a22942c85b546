//! 指令 + demo 联合优化（MIPRO 风格）
//!
//! - **evaluator**: 固定 (instruction, demos) 在一组行上取平均分
//! - **demos**: teacher forcing 构建定长 demo 池；运行前 bootstrap
//! - **candidates**: 数据摘要 + 结构化生成新指令，追加随机 tip
//! - **bandit**: 可增长组合竞技场上的 UCB1
//! - **controller**: trial 循环、全量评估、臂空间扩展、全局最优

pub mod bandit;
pub mod candidates;
pub mod config;
pub mod controller;
pub mod demos;
pub mod evaluator;
pub mod types;

pub use bandit::{ucb_score, BanditSearch};
pub use candidates::{append_tip, CandidateGenerator, InstructionProposal, INSTRUCTION_TIPS};
pub use self::config::OptimizerConfig;
pub use controller::{register_instructions, OptimizationController};
pub use demos::DemoPoolBuilder;
pub use evaluator::Evaluator;
pub use types::{
    BestResult, Combo, ComboId, ComboReport, DemoPool, EvaluationResult, OptimizationReport,
    SelectionKind, Statistic, TrialRecord,
};
