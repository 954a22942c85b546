use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dataset::DatasetRow;

/// 固定大小的示例池；同一池位被所有使用它的指令共享
pub type DemoPool = Vec<DatasetRow>;

/// 组合在 BanditSearch 竞技场中的稳定下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComboId(pub usize);

/// (instruction, demo 池下标)：bandit 的一个臂
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combo {
    pub instruction: String,
    pub pool_index: usize,
}

impl Combo {
    pub fn new(instruction: impl Into<String>, pool_index: usize) -> Self {
        Self {
            instruction: instruction.into(),
            pool_index,
        }
    }

    pub fn key(&self) -> String {
        combo_key(&self.instruction, self.pool_index)
    }
}

pub fn combo_key(instruction: &str, pool_index: usize) -> String {
    format!("{}::{}", instruction, pool_index)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    pub total_score: f64,
    pub trial_count: u64,
}

impl Statistic {
    pub fn mean(&self) -> f64 {
        if self.trial_count == 0 {
            0.0
        } else {
            self.total_score / self.trial_count as f64
        }
    }

    pub fn record(&mut self, score: f64) {
        self.total_score += score;
        self.trial_count += 1;
    }
}

/// 一次评估的输出；也用作候选生成的高分 trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: f64,
    pub instruction: String,
    pub demos: Vec<DatasetRow>,
}

/// 全局最优；只在严格更优时替换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub instruction: String,
    pub demos: Vec<DatasetRow>,
    pub score: f64,
}

impl BestResult {
    /// 严格更优时替换，返回是否替换
    pub fn offer(&mut self, result: &EvaluationResult) -> bool {
        if result.score > self.score {
            self.instruction = result.instruction.clone();
            self.demos = result.demos.clone();
            self.score = result.score;
            true
        } else {
            false
        }
    }

    pub fn as_trace(&self) -> EvaluationResult {
        EvaluationResult {
            score: self.score,
            instruction: self.instruction.clone(),
            demos: self.demos.clone(),
        }
    }
}

/// 组合是如何被选中的
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// 热启动：trial 下标小于已知组合数时按顺序强制选择
    WarmStart,
    /// 存在从未观测的组合
    Unexplored,
    Ucb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub combo: ComboId,
    pub pool_index: usize,
    pub selection: SelectionKind,
    pub minibatch_score: f64,
    pub full_eval_score: Option<f64>,
    /// 本次扩展新增的指令数
    pub new_instructions: usize,
    /// 本 trial 结束后的全局最优分数
    pub best_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComboReport {
    pub id: ComboId,
    pub instruction: String,
    pub pool_index: usize,
    pub mean_score: f64,
    pub trial_count: u64,
}

/// 一次优化运行的完整记录（可序列化为 JSON 报告）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub best: BestResult,
    pub trials: Vec<TrialRecord>,
    pub combos: Vec<ComboReport>,
    pub demo_pools: Vec<DemoPool>,
    /// 运行前 bootstrap 收集到的满分样本（仅诊断用途，不进入搜索）
    #[serde(default)]
    pub bootstrap_demos: Vec<DatasetRow>,
    pub cancelled: bool,
}
