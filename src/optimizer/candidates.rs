//! 指令候选生成
//!
//! 1. 抽样 `num_samples` 行，一次 LLM 调用总结输入/输出模式（数据上下文）
//! 2. 可选：最多 5 条高分 trace（指令 + demos + 分数）作为额外上下文
//! 3. 一次结构化生成调用，请求 `num_candidates` 条指令变体
//! 4. 每条指令末尾追加一条随机 tip，增加措辞多样性

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::dataset::DatasetRow;
use crate::llm::structured::generate_items;
use crate::llm::{LlmClient, LlmError, Message};
use crate::optimizer::types::EvaluationResult;

/// 指令写作提示，生成后随机追加一条
pub const INSTRUCTION_TIPS: [&str; 8] = [
    "Be specific and detailed about exactly what must be extracted.",
    "Focus on step-by-step reasoning before producing the final answer.",
    "Keep the instruction short, direct and unambiguous.",
    "State the exact output format and field names expected.",
    "Call out common edge cases and explain how to handle them.",
    "Say explicitly to return an empty result when nothing in the input applies.",
    "Prefer precision: only output what is clearly supported by the input.",
    "Write as a domain expert giving guidance to a careful junior colleague.",
];

const MAX_TRACES: usize = 5;

/// 结构化生成的单个条目
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InstructionProposal {
    /// 完整的新任务指令文本
    pub instruction: String,
}

pub struct CandidateGenerator {
    llm: Arc<dyn LlmClient>,
    num_samples: usize,
}

impl CandidateGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, num_samples: usize) -> Self {
        Self { llm, num_samples }
    }

    /// 随机抽样并总结数据集
    pub async fn summarize_data(
        &self,
        dataset: &[DatasetRow],
        rng: &mut StdRng,
    ) -> Result<String, LlmError> {
        let sample: Vec<&DatasetRow> = dataset
            .choose_multiple(rng, self.num_samples.min(dataset.len()))
            .collect();

        let examples = sample
            .iter()
            .enumerate()
            .map(|(i, row)| {
                format!(
                    "Example {}:\nInput: {}\nOutput: {}",
                    i + 1,
                    row.input,
                    row.expected_output
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            r#"Below are labeled examples from a dataset.

{}

Describe, in a short paragraph, the patterns you observe: what kind of inputs appear, what the
outputs contain, how outputs relate to inputs, and any tricky cases. Do not restate the examples."#,
            examples
        );

        let summary = self.llm.complete(&[Message::user(prompt)]).await?;
        Ok(summary.trim().to_string())
    }

    /// 生成新指令（已追加 tip）；LLM 返回超过 `num_candidates` 条时截断，空指令被丢弃
    pub async fn generate(
        &self,
        base_instruction: &str,
        data_context: &str,
        traces: &[EvaluationResult],
        num_candidates: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<String>, LlmError> {
        if num_candidates == 0 {
            return Ok(Vec::new());
        }

        let system = "You are an expert prompt engineer. You write task instructions for a \
language model that performs a structured extraction task. Each proposed instruction must be \
self-contained and meaningfully different from the others.";

        let mut user = format!(
            "Base instruction:\n{}\n\nDataset summary:\n{}\n",
            base_instruction, data_context
        );
        let traces = format_traces(traces);
        if !traces.is_empty() {
            user.push_str("\nHigh-scoring attempts so far:\n");
            user.push_str(&traces);
            user.push('\n');
        }
        user.push_str(&format!(
            "\nPropose {} improved variants of the base instruction.",
            num_candidates
        ));

        let proposals: Vec<InstructionProposal> =
            generate_items(self.llm.as_ref(), system, &user, num_candidates).await?;

        Ok(proposals
            .into_iter()
            .map(|p| p.instruction.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(num_candidates)
            .map(|s| append_tip(&s, rng))
            .collect())
    }
}

/// 追加一条均匀随机的 tip
pub fn append_tip(instruction: &str, rng: &mut StdRng) -> String {
    match INSTRUCTION_TIPS.choose(rng) {
        Some(tip) => format!("{} {}", instruction.trim_end(), tip),
        None => instruction.to_string(),
    }
}

/// 按分数从高到低最多取 5 条 trace 序列化
fn format_traces(traces: &[EvaluationResult]) -> String {
    let mut sorted: Vec<&EvaluationResult> = traces.iter().collect();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    sorted
        .into_iter()
        .take(MAX_TRACES)
        .enumerate()
        .map(|(i, t)| {
            let demos = t
                .demos
                .iter()
                .map(|d| format!("  - input: {} → output: {}", d.input, d.expected_output))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Trace {} (score {:.3}):\nInstruction: {}\nDemos:\n{}",
                i + 1,
                t.score,
                t.instruction,
                demos
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use rand::SeedableRng;
    use serde_json::json;

    fn dataset() -> Vec<DatasetRow> {
        (0..10)
            .map(|i| DatasetRow::new(json!(format!("email {}", i)), json!([{"id": i}])))
            .collect()
    }

    fn trace(score: f64, name: &str) -> EvaluationResult {
        EvaluationResult {
            score,
            instruction: name.to_string(),
            demos: vec![DatasetRow::new(json!("in"), json!("out"))],
        }
    }

    #[test]
    fn test_append_tip_uses_known_tip() {
        let mut rng = StdRng::seed_from_u64(5);
        let out = append_tip("Extract events.  ", &mut rng);
        assert!(out.starts_with("Extract events. "));
        assert!(INSTRUCTION_TIPS.iter().any(|t| out.ends_with(t)));
    }

    #[test]
    fn test_append_tip_is_deterministic_for_seed() {
        let a = append_tip("x", &mut StdRng::seed_from_u64(9));
        let b = append_tip("x", &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_format_traces_caps_and_sorts() {
        let traces: Vec<EvaluationResult> = (0..8).map(|i| trace(i as f64 / 10.0, &format!("t{}", i))).collect();
        let out = format_traces(&traces);
        assert_eq!(out.matches("Trace ").count(), MAX_TRACES);
        assert!(out.starts_with("Trace 1 (score 0.700)"));
        assert!(!out.contains("Instruction: t0"));
        assert_eq!(format_traces(&[]), "");
    }

    #[tokio::test]
    async fn test_summarize_samples_rows() {
        let mock = Arc::new(MockLlmClient::with_responses(vec!["  Emails with events.  "]));
        let gen = CandidateGenerator::new(mock.clone(), 3);
        let mut rng = StdRng::seed_from_u64(1);
        let summary = gen.summarize_data(&dataset(), &mut rng).await.unwrap();
        assert_eq!(summary, "Emails with events.");

        let prompt = &mock.seen_messages()[0][0].content;
        assert_eq!(prompt.matches("Example ").count(), 3);
    }

    #[tokio::test]
    async fn test_generate_appends_tips_and_truncates() {
        let mock = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"items": [{"instruction": "A"}, {"instruction": "  "}, {"instruction": "B"}, {"instruction": "C"}]}"#,
        ]));
        let gen = CandidateGenerator::new(mock.clone(), 3);
        let mut rng = StdRng::seed_from_u64(2);
        let out = gen
            .generate("Base", "ctx", &[trace(0.9, "best")], 2, &mut rng)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].starts_with("A "));
        assert!(out[1].starts_with("B "));

        let user = &mock.seen_messages()[0][1].content;
        assert!(user.contains("Base instruction:\nBase"));
        assert!(user.contains("Instruction: best"));
    }

    #[tokio::test]
    async fn test_generate_schema_violation_is_error() {
        let mock = Arc::new(MockLlmClient::with_responses(vec![r#"{"items": [{"text": "A"}]}"#]));
        let gen = CandidateGenerator::new(mock, 3);
        let mut rng = StdRng::seed_from_u64(2);
        let err = gen.generate("Base", "ctx", &[], 2, &mut rng).await.unwrap_err();
        assert!(matches!(err, LlmError::Schema(_)));
    }

    #[tokio::test]
    async fn test_generate_zero_candidates_skips_llm() {
        let mock = Arc::new(MockLlmClient::new());
        let gen = CandidateGenerator::new(mock.clone(), 3);
        let mut rng = StdRng::seed_from_u64(2);
        assert!(gen.generate("Base", "ctx", &[], 0, &mut rng).await.unwrap().is_empty());
        assert_eq!(mock.call_count(), 0);
    }
}
