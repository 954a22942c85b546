//! 数据集：`[{"input": ..., "output": ...}]` 形式的 JSON 数组，优化开始前一次性加载，运行期间只读

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::OptimizeError;

/// 单条带标注样本；input / expected_output 的结构由具体任务决定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub input: Value,
    #[serde(rename = "output")]
    pub expected_output: Value,
}

impl DatasetRow {
    pub fn new(input: Value, expected_output: Value) -> Self {
        Self {
            input,
            expected_output,
        }
    }
}

/// 有序样本序列
pub type Dataset = Vec<DatasetRow>;

/// 从 JSON 文件加载数据集；空数组视为错误
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset, OptimizeError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        OptimizeError::Dataset(format!("cannot read {}: {}", path.display(), e))
    })?;
    let rows = parse_dataset(&raw)?;
    tracing::info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn parse_dataset(raw: &str) -> Result<Dataset, OptimizeError> {
    let rows: Dataset = serde_json::from_str(raw)
        .map_err(|e| OptimizeError::Dataset(format!("invalid dataset JSON: {}", e)))?;
    if rows.is_empty() {
        return Err(OptimizeError::EmptyDataset);
    }
    Ok(rows)
}
