//! Expansion and digest scoring
//!
//! Evaluators come in four sets:
//!
//! | Set        | Needs                   | Evaluators                         |
//! |------------|-------------------------|------------------------------------|
//! | code       | the expansion           | `structure`                        |
//! | trajectory | the tool-call trace     | `efficiency`, `sources_retrieved`  |
//! | judged     | a [`Judge`]             | groundedness, coverage, authority, topic_quality |
//! | digest     | a [`Judge`] and a digest | connections, actionability, synthesis |
//!
//! Every evaluator returns the same [`EvalResult`] shape. The aggregate score
//! is the mean of all non-null scores.

/// Structure, efficiency and source checks; no external calls.
pub mod deterministic;
/// Model-graded scorers behind the [`Judge`] trait.
pub mod judged;
/// Repeated runs of one seed: pass@k and pass^k.
pub mod reliability;

pub use judged::{Judge, JudgeCriterion, JudgeError, JudgeVerdict, JudgedEvaluator, LlmJudge};
pub use reliability::{format_reliability, run_reliability, summarize, Reliability, ReliabilityReport};

use crate::agents::RunOutcome;
use crate::tools::dispatcher::ToolCallRecord;
use crate::types::{Digest, Expansion, InboxItem};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Result of one evaluator invocation. Reported, never stored as truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalResult {
    pub metric_name: String,
    /// In `[0, 1]`; `None` when the evaluator could not score.
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<bool>,
    /// Evaluator-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvalResult {
    pub fn new(metric_name: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            metric_name: metric_name.into(),
            score,
            pass: None,
            extra: Map::new(),
        }
    }

    /// A result that could not be scored.
    pub fn unscored(metric_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(metric_name, None).with_extra("error", error.into())
    }

    pub fn with_pass(mut self, pass: bool) -> Self {
        self.pass = Some(pass);
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn extra_field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn error(&self) -> Option<&str> {
        self.extra.get("error").and_then(Value::as_str)
    }
}

/// What an evaluator looks at.
#[derive(Debug, Clone, Copy)]
pub struct EvalInput<'a> {
    /// The seed as the judge sees it (`item_type`, `content`, `note`).
    pub inputs: &'a Value,
    /// The expansion as JSON, so missing or null fields stay observable.
    pub output: &'a Value,
    /// Tool calls of the run, when it was a live run.
    pub trace: Option<&'a [ToolCallRecord]>,
    pub turns_used: usize,
}

impl<'a> EvalInput<'a> {
    pub fn new(inputs: &'a Value, output: &'a Value) -> Self {
        Self {
            inputs,
            output,
            trace: None,
            turns_used: 0,
        }
    }

    pub fn with_trace(mut self, trace: &'a [ToolCallRecord], turns_used: usize) -> Self {
        self.trace = Some(trace);
        self.turns_used = turns_used;
        self
    }
}

/// Seed fields handed to evaluators.
pub fn seed_inputs(item: &InboxItem) -> Value {
    json!({
        "item_type": item.kind,
        "content": item.content,
        "note": item.note,
    })
}

/// Inputs for a file-based eval, where only the expansion is known.
pub fn expansion_inputs(expansion: &Expansion) -> Value {
    json!({
        "item_id": expansion.item_id,
        "source_url": expansion.source_url,
    })
}

pub fn expansion_output(expansion: &Expansion) -> Value {
    serde_json::to_value(expansion).unwrap_or(Value::Null)
}

/// Output of a live run: the findings block as the model wrote it, or the
/// fallback expansion when none was recovered.
pub fn run_output(outcome: &RunOutcome) -> Value {
    outcome
        .raw_output
        .clone()
        .unwrap_or_else(|| expansion_output(&outcome.expansion))
}

/// What the digest judges see about the expansions behind a digest.
pub fn digest_inputs(expansions: &[Expansion]) -> Value {
    let summaries: Vec<&str> = expansions.iter().map(|e| e.source_summary.as_str()).collect();
    json!({
        "expansion_summaries": summaries,
        "expansion_count": summaries.len(),
    })
}

pub fn digest_output(digest: &Digest) -> Value {
    json!({
        "entries": digest.entries,
        "cross_connections": digest.cross_connections,
        "open_threads": digest.open_threads,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorKind {
    Code,
    Trajectory,
    Judged,
}

pub enum Evaluator {
    Structure,
    Efficiency,
    SourcesRetrieved,
    Judged(JudgedEvaluator),
}

impl Evaluator {
    pub fn name(&self) -> &str {
        match self {
            Evaluator::Structure => "structure",
            Evaluator::Efficiency => "efficiency",
            Evaluator::SourcesRetrieved => "sources_retrieved",
            Evaluator::Judged(judged) => judged.criterion().metric_name(),
        }
    }

    pub fn kind(&self) -> EvaluatorKind {
        match self {
            Evaluator::Structure => EvaluatorKind::Code,
            Evaluator::Efficiency | Evaluator::SourcesRetrieved => EvaluatorKind::Trajectory,
            Evaluator::Judged(_) => EvaluatorKind::Judged,
        }
    }

    pub async fn evaluate(&self, input: &EvalInput<'_>) -> EvalResult {
        match self {
            Evaluator::Structure => deterministic::structure(input.output),
            Evaluator::Efficiency => match input.trace {
                Some(trace) => deterministic::efficiency(trace, input.turns_used),
                None => EvalResult::unscored(self.name(), "no tool trace available"),
            },
            Evaluator::SourcesRetrieved => match input.trace {
                Some(trace) => deterministic::sources_retrieved(trace),
                None => EvalResult::unscored(self.name(), "no tool trace available"),
            },
            Evaluator::Judged(judged) => judged.evaluate(input.inputs, input.output).await,
        }
    }
}

pub fn code_evaluators() -> Vec<Evaluator> {
    vec![Evaluator::Structure]
}

pub fn trajectory_evaluators() -> Vec<Evaluator> {
    vec![Evaluator::SourcesRetrieved, Evaluator::Efficiency]
}

/// One evaluator per criterion. A `None` judge yields unscored results.
pub fn judged_evaluators(judge: Option<Arc<dyn Judge>>) -> Vec<Evaluator> {
    JudgeCriterion::ALL
        .iter()
        .map(|criterion| Evaluator::Judged(JudgedEvaluator::new(*criterion, judge.clone())))
        .collect()
}

/// Connections, actionability and synthesis over a digest.
pub fn digest_evaluators(judge: Option<Arc<dyn Judge>>) -> Vec<Evaluator> {
    JudgeCriterion::DIGEST
        .iter()
        .map(|criterion| Evaluator::Judged(JudgedEvaluator::new(*criterion, judge.clone())))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Aggregate {
    pub mean_score: Option<f64>,
    pub evaluators_run: usize,
    pub judged_included: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalReport {
    pub results: Vec<EvalResult>,
    pub aggregate: Aggregate,
}

impl EvalReport {
    pub fn get(&self, metric_name: &str) -> Option<&EvalResult> {
        self.results.iter().find(|r| r.metric_name == metric_name)
    }

    pub fn mean_score(&self) -> Option<f64> {
        self.aggregate.mean_score
    }
}

/// Mean of the non-null scores, `None` if there are none.
pub fn mean_score(results: &[EvalResult]) -> Option<f64> {
    let scores: Vec<f64> = results.iter().filter_map(|r| r.score).collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

pub struct EvalHarness {
    evaluators: Vec<Evaluator>,
}

impl EvalHarness {
    pub fn new(evaluators: Vec<Evaluator>) -> Self {
        Self { evaluators }
    }

    /// Code and trajectory evaluators.
    pub fn deterministic() -> Self {
        let mut evaluators = code_evaluators();
        evaluators.extend(trajectory_evaluators());
        Self::new(evaluators)
    }

    /// Deterministic evaluators plus the judged set.
    pub fn with_judge(judge: Option<Arc<dyn Judge>>) -> Self {
        let mut harness = Self::deterministic();
        harness.evaluators.extend(judged_evaluators(judge));
        harness
    }

    /// Digest evaluators only.
    pub fn for_digest(judge: Option<Arc<dyn Judge>>) -> Self {
        Self::new(digest_evaluators(judge))
    }

    /// Score a digest against the expansions it was built from.
    pub async fn run_digest(&self, digest: &Digest, expansions: &[Expansion]) -> EvalReport {
        let inputs = digest_inputs(expansions);
        let output = digest_output(digest);
        self.run(&EvalInput::new(&inputs, &output)).await
    }

    pub fn evaluator_names(&self) -> Vec<&str> {
        self.evaluators.iter().map(Evaluator::name).collect()
    }

    /// Run every applicable evaluator. Trajectory evaluators are skipped
    /// when the input carries no trace.
    pub async fn run(&self, input: &EvalInput<'_>) -> EvalReport {
        let mut results = Vec::with_capacity(self.evaluators.len());
        let mut judged_included = false;

        for evaluator in &self.evaluators {
            match evaluator.kind() {
                EvaluatorKind::Trajectory if input.trace.is_none() => continue,
                EvaluatorKind::Judged => judged_included = true,
                _ => {}
            }
            let result = evaluator.evaluate(input).await;
            tracing::debug!(metric = %result.metric_name, score = ?result.score, "evaluator finished");
            results.push(result);
        }

        EvalReport {
            aggregate: Aggregate {
                mean_score: mean_score(&results),
                evaluators_run: results.len(),
                judged_included,
            },
            results,
        }
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map(|s| format!("{:.2}", s)).unwrap_or_else(|| "N/A".to_string())
}

pub fn format_eval_results(report: &EvalReport) -> String {
    let mut lines = Vec::new();

    for result in &report.results {
        let status = match result.pass {
            Some(true) => " [PASS]",
            Some(false) => " [FAIL]",
            None => "",
        };
        lines.push(format!(
            "  {}: {}{}",
            result.metric_name,
            format_score(result.score),
            status
        ));

        if let Some(missing) = result
            .extra_field("missing_fields")
            .and_then(Value::as_array)
            .filter(|m| !m.is_empty())
        {
            let names: Vec<&str> = missing.iter().filter_map(Value::as_str).collect();
            lines.push(format!("    missing: {}", names.join(", ")));
        }
        if let Some(error) = result.error() {
            lines.push(format!("    error: {}", error));
        }
    }

    if let Some(mean) = report.aggregate.mean_score {
        lines.push(String::new());
        lines.push(format!("  Aggregate: {:.2}", mean));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, args: Value) -> ToolCallRecord {
        ToolCallRecord {
            id: "c".into(),
            name: name.into(),
            arguments: args,
            result: String::new(),
            success: true,
            duration_ms: 0,
            error: None,
            turn: 1,
        }
    }

    fn complete_output() -> Value {
        json!({
            "source_summary": "s",
            "key_points": [],
            "related": [],
            "topics": [],
            "assessment": "a"
        })
    }

    #[tokio::test]
    async fn test_file_based_run_skips_trajectory_evaluators() {
        let output = complete_output();
        let inputs = json!({});
        let report = EvalHarness::deterministic()
            .run(&EvalInput::new(&inputs, &output))
            .await;

        assert_eq!(report.aggregate.evaluators_run, 1);
        assert_eq!(report.results[0].metric_name, "structure");
        assert_eq!(report.mean_score(), Some(1.0));
        assert!(!report.aggregate.judged_included);
    }

    #[tokio::test]
    async fn test_live_run_aggregates_all_scores() {
        let output = complete_output();
        let inputs = json!({});
        let trace = vec![
            record("fetch_page", json!({"url": "http://x.com/a"})),
            record("fetch_page", json!({"url": "http://x.com/a"})),
        ];
        let report = EvalHarness::deterministic()
            .run(&EvalInput::new(&inputs, &output).with_trace(&trace, 2))
            .await;

        assert_eq!(report.aggregate.evaluators_run, 3);
        assert_eq!(report.get("efficiency").unwrap().score, Some(0.5));
        let mean = report.mean_score().unwrap();
        assert!((mean - 2.5 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unavailable_judge_does_not_drag_aggregate() {
        let output = complete_output();
        let inputs = json!({});
        let report = EvalHarness::with_judge(None)
            .run(&EvalInput::new(&inputs, &output))
            .await;

        assert!(report.aggregate.judged_included);
        assert_eq!(report.aggregate.evaluators_run, 5);
        assert_eq!(report.mean_score(), Some(1.0));
        assert!(report.get("groundedness").unwrap().score.is_none());
    }

    #[test]
    fn test_mean_score_ignores_null() {
        let results = vec![
            EvalResult::new("a", Some(1.0)),
            EvalResult::new("b", None),
            EvalResult::new("c", Some(0.0)),
        ];
        assert_eq!(mean_score(&results), Some(0.5));
        assert_eq!(mean_score(&[EvalResult::new("x", None)]), None);
    }

    #[test]
    fn test_eval_result_serialization_flattens_extra() {
        let result = EvalResult::new("structure", Some(0.0))
            .with_pass(false)
            .with_extra("missing_fields", json!(["related"]));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["metric_name"], "structure");
        assert_eq!(value["pass"], false);
        assert_eq!(value["missing_fields"][0], "related");

        let unscored = serde_json::to_value(EvalResult::unscored("coverage", "x")).unwrap();
        assert!(unscored["score"].is_null());
        assert!(unscored.get("pass").is_none());
    }

    #[test]
    fn test_format_eval_results() {
        let report = EvalReport {
            results: vec![
                EvalResult::new("structure", Some(0.0))
                    .with_pass(false)
                    .with_extra("missing_fields", json!(["related"])),
                EvalResult::unscored("coverage", "judge unavailable"),
            ],
            aggregate: Aggregate {
                mean_score: Some(0.0),
                evaluators_run: 2,
                judged_included: true,
            },
        };
        let text = format_eval_results(&report);
        assert!(text.contains("  structure: 0.00 [FAIL]"));
        assert!(text.contains("    missing: related"));
        assert!(text.contains("  coverage: N/A"));
        assert!(text.contains("    error: judge unavailable"));
        assert!(text.ends_with("  Aggregate: 0.00"));
    }
}
