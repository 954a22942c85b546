//! 内置评分器
//!
//! - exact：整体相等得 1，否则 0
//! - record_f1：把输出与期望都视为记录数组，按逐条完全匹配计算 F1（多重集合语义）

use std::sync::Arc;

use serde_json::Value;

use crate::task::{is_empty_value, Scorer};

/// 整体完全匹配
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatchScorer;

impl Scorer for ExactMatchScorer {
    fn score(&self, output: &Value, expected: &Value) -> f64 {
        if is_empty_value(output) || is_empty_value(expected) {
            return 0.0;
        }
        if output == expected {
            1.0
        } else {
            0.0
        }
    }
}

/// 记录级 F1；非数组值按单元素数组处理
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordF1Scorer;

fn as_records(v: &Value) -> Vec<&Value> {
    match v {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

impl Scorer for RecordF1Scorer {
    fn score(&self, output: &Value, expected: &Value) -> f64 {
        if is_empty_value(output) || is_empty_value(expected) {
            return 0.0;
        }

        let predicted = as_records(output);
        let mut remaining = as_records(expected);
        let expected_len = remaining.len();

        let mut matched = 0usize;
        for p in &predicted {
            if let Some(pos) = remaining.iter().position(|e| e == p) {
                remaining.swap_remove(pos);
                matched += 1;
            }
        }

        if matched == 0 {
            return 0.0;
        }
        let precision = matched as f64 / predicted.len() as f64;
        let recall = matched as f64 / expected_len as f64;
        2.0 * precision * recall / (precision + recall)
    }
}

/// 按配置名创建评分器；未知名字退回 record_f1
pub fn create_scorer(name: &str) -> Arc<dyn Scorer> {
    match name.to_lowercase().as_str() {
        "exact" | "exact_match" => Arc::new(ExactMatchScorer),
        "record_f1" | "f1" => Arc::new(RecordF1Scorer),
        other => {
            tracing::warn!("Unknown scorer '{}', using record_f1", other);
            Arc::new(RecordF1Scorer)
        }
    }
}
