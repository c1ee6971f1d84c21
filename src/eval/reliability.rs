use super::{run_output, seed_inputs, EvalHarness, EvalInput};
use crate::agents::{Orchestrator, PromptContext};
use crate::types::InboxItem;
use serde::{Deserialize, Serialize};

/// Score spread below which repeated runs count as consistent.
pub const HIGH_RELIABILITY_SPREAD: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    High,
    Low,
}

impl std::fmt::Display for Reliability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reliability::High => write!(f, "high"),
            Reliability::Low => write!(f, "low"),
        }
    }
}

/// Outcome of k independent runs of the same seed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReliabilityReport {
    /// At least one run reached the threshold.
    pub pass_at_k: bool,
    /// Every run reached the threshold.
    pub pass_pow_k: bool,
    /// `max - min` of the scores.
    pub variance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub scores: Vec<f64>,
    pub k: usize,
    pub threshold: f64,
    pub reliability: Reliability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// pass@k / pass^k over per-run aggregate scores.
pub fn summarize(scores: Vec<f64>, k: usize, threshold: f64) -> ReliabilityReport {
    if scores.is_empty() {
        return ReliabilityReport {
            pass_at_k: false,
            pass_pow_k: false,
            variance: 0.0,
            mean: None,
            min: None,
            max: None,
            scores,
            k,
            threshold,
            reliability: Reliability::Low,
            error: Some("No valid scores computed".to_string()),
        };
    }

    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let variance = max - min;

    ReliabilityReport {
        pass_at_k: max >= threshold,
        pass_pow_k: min >= threshold,
        variance,
        mean: Some(mean),
        min: Some(min),
        max: Some(max),
        scores,
        k,
        threshold,
        reliability: if variance < HIGH_RELIABILITY_SPREAD {
            Reliability::High
        } else {
            Reliability::Low
        },
        error: None,
    }
}

/// Expand `item` k times, score each run with `harness`, and summarize.
/// Runs are sequential; a run without any score is dropped from the list.
pub async fn run_reliability(
    orchestrator: &Orchestrator,
    harness: &EvalHarness,
    item: &InboxItem,
    ctx: &PromptContext,
    k: usize,
    threshold: f64,
) -> ReliabilityReport {
    let inputs = seed_inputs(item);
    let mut scores = Vec::with_capacity(k);

    for run in 1..=k {
        let outcome = orchestrator.run(item, ctx, None).await;
        let output = run_output(&outcome);
        let input = EvalInput::new(&inputs, &output).with_trace(&outcome.tool_calls, outcome.turn_count);
        let report = harness.run(&input).await;

        tracing::info!(
            item_id = %item.id,
            run,
            k,
            state = %outcome.final_state,
            score = ?report.mean_score(),
            "reliability run scored"
        );
        if let Some(score) = report.mean_score() {
            scores.push(score);
        }
    }

    summarize(scores, k, threshold)
}

pub fn format_reliability(report: &ReliabilityReport) -> String {
    let verdict = |pass: bool| if pass { "PASS" } else { "FAIL" };
    let mut lines = vec![
        format!("  pass@{}: {}", report.k, verdict(report.pass_at_k)),
        format!("  pass^{}: {}", report.k, verdict(report.pass_pow_k)),
    ];
    if let Some(mean) = report.mean {
        lines.push(format!("  mean: {:.3}", mean));
    }
    lines.push(format!(
        "  variance: {:.3} ({} reliability)",
        report.variance, report.reliability
    ));
    let scores: Vec<String> = report.scores.iter().map(|s| format!("{:.2}", s)).collect();
    lines.push(format!("  scores: {}", scores.join(", ")));
    if let Some(error) = &report.error {
        lines.push(format!("  error: {}", error));
    }
    lines.join("\n")
}
