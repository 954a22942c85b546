//! mipro - 指令与 Few-shot 示例联合优化器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、优雅关闭
//! - **dataset**: JSON 数据集加载
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、重试、结构化生成
//! - **observability**: 日志初始化
//! - **optimizer**: 评估器、demo 池、候选生成、UCB1 组合搜索、优化主控
//! - **task**: 任务执行器与评分器接口及内置实现

pub mod config;
pub mod core;
pub mod dataset;
pub mod llm;
pub mod observability;
pub mod optimizer;
pub mod task;

pub use crate::core::OptimizeError;
pub use dataset::{load_dataset, Dataset, DatasetRow};
pub use optimizer::{BestResult, OptimizationController, OptimizationReport, OptimizerConfig};
