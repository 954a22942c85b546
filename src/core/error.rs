//! 优化器错误类型
//!
//! 任一协作方（LLM、任务执行器、数据集）失败都会中止当前优化运行；取消不是错误，见 OptimizationReport::cancelled。

use thiserror::Error;

use crate::llm::LlmError;
use crate::task::TaskError;

/// 优化运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Task execution failed: {0}")]
    Task(#[from] TaskError),

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("No instruction candidates given")]
    NoCandidates,

    #[error("Invalid optimizer config: {0}")]
    InvalidConfig(String),

    #[error("Dataset error: {0}")]
    Dataset(String),
}
