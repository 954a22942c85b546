//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MIPRO__*` 覆盖（双下划线表示嵌套，如 `MIPRO__OPTIMIZER__NUM_TRIALS=40`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub optimizer: OptimizerSection,
    #[serde(default)]
    pub task: TaskSection,
}

/// [llm] 段：后端选择、候选生成模型、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 候选生成与数据摘要所用模型
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 候选生成温度（需要多样性）
    #[serde(default = "default_proposer_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    #[serde(default)]
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_proposer_temperature(),
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

impl LlmSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            initial_backoff_ms: self.retry.initial_backoff_ms,
            max_backoff_ms: self.retry.max_backoff_ms,
            request_timeout_secs: self.timeouts.request,
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_proposer_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [llm.retry] 段：瞬时错误的指数退避
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

/// [optimizer] 段：搜索预算与采样规模
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerSection {
    #[serde(default = "default_num_trials")]
    pub num_trials: usize,
    /// 每个 demo 池的示例数
    #[serde(default = "default_num_few_shot")]
    pub num_few_shot: usize,
    /// demo 池个数
    #[serde(default = "default_num_demo_candidates")]
    pub num_demo_candidates: usize,
    #[serde(default = "default_mini_batch_size")]
    pub mini_batch_size: usize,
    /// 每 N 次 trial 做一次全量评估 + 候选扩展；0 表示关闭
    #[serde(default = "default_full_eval_every")]
    pub full_eval_every: usize,
    /// 初始候选指令个数（不含基础指令）
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
    /// 数据摘要抽样行数
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    /// 每次扩展生成的新指令个数
    #[serde(default = "default_expansion_candidates")]
    pub expansion_candidates: usize,
    /// 运行前 bootstrap 收集的满分样本上限
    #[serde(default = "default_bootstrap_target")]
    pub bootstrap_target: usize,
    /// 单次评估内并发执行的行数
    #[serde(default = "default_eval_concurrency")]
    pub eval_concurrency: usize,
    /// 随机种子；未设置时取系统熵
    pub seed: Option<u64>,
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self {
            num_trials: default_num_trials(),
            num_few_shot: default_num_few_shot(),
            num_demo_candidates: default_num_demo_candidates(),
            mini_batch_size: default_mini_batch_size(),
            full_eval_every: default_full_eval_every(),
            num_candidates: default_num_candidates(),
            num_samples: default_num_samples(),
            expansion_candidates: default_expansion_candidates(),
            bootstrap_target: default_bootstrap_target(),
            eval_concurrency: default_eval_concurrency(),
            seed: None,
        }
    }
}

fn default_num_trials() -> usize {
    20
}

fn default_num_few_shot() -> usize {
    3
}

fn default_num_demo_candidates() -> usize {
    3
}

fn default_mini_batch_size() -> usize {
    5
}

fn default_full_eval_every() -> usize {
    5
}

fn default_num_candidates() -> usize {
    5
}

fn default_num_samples() -> usize {
    5
}

fn default_expansion_candidates() -> usize {
    3
}

fn default_bootstrap_target() -> usize {
    4
}

fn default_eval_concurrency() -> usize {
    4
}

/// [task] 段：数据集、基础指令、任务模型与评分器
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSection {
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    /// 基础指令（候选 0，同时作为 demo 池构建的 teacher 指令）
    #[serde(default = "default_instruction")]
    pub instruction: String,
    /// 任务执行器所用模型；未设置时与 [llm].model 相同
    pub model: Option<String>,
    /// 任务执行温度
    #[serde(default)]
    pub temperature: f32,
    /// 评分器：exact / record_f1
    #[serde(default = "default_scorer")]
    pub scorer: String,
    /// 运行报告输出路径（JSON）
    pub report_path: Option<PathBuf>,
}

impl Default for TaskSection {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            instruction: default_instruction(),
            model: None,
            temperature: 0.0,
            scorer: default_scorer(),
            report_path: None,
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/dataset.json")
}

fn default_instruction() -> String {
    "Extract the requested structured records from the input. Respond with JSON only.".to_string()
}

fn default_scorer() -> String {
    "record_f1".to_string()
}

/// 从 config 目录加载配置，环境变量 MIPRO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MIPRO__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MIPRO")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
