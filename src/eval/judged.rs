use super::EvalResult;
use crate::agents::extractor::json_blocks;
use crate::llm::LLMClient;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge unavailable: {0}")]
    Unavailable(String),
    #[error("invalid judge response: {0}")]
    Invalid(String),
}

/// A 1-5 grade with the judge's explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    pub score: u8,
    pub reasoning: String,
}

impl JudgeVerdict {
    /// Map 1..=5 onto 0..=1.
    pub fn normalized(&self) -> f64 {
        (self.score.clamp(1, 5) - 1) as f64 / 4.0
    }
}

#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, prompt: &str) -> Result<JudgeVerdict, JudgeError>;
}

#[derive(Deserialize)]
struct RawVerdict {
    score: f64,
    #[serde(default)]
    reasoning: String,
}

/// Parse `{"score": n, "reasoning": "..."}` from a judge reply, fenced or bare.
pub fn parse_verdict(text: &str) -> Result<JudgeVerdict, JudgeError> {
    let mut candidates: Vec<&str> = json_blocks(text);
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }

    let raw = candidates
        .into_iter()
        .find_map(|c| serde_json::from_str::<RawVerdict>(c.trim()).ok())
        .ok_or_else(|| JudgeError::Invalid("no score object in reply".to_string()))?;

    let rounded = raw.score.round();
    if !(1.0..=5.0).contains(&rounded) {
        return Err(JudgeError::Invalid(format!("score {} outside 1-5", raw.score)));
    }
    Ok(JudgeVerdict {
        score: rounded as u8,
        reasoning: raw.reasoning,
    })
}

/// Judge backed by any chat model.
pub struct LlmJudge {
    client: Arc<dyn LLMClient>,
}

impl LlmJudge {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, prompt: &str) -> Result<JudgeVerdict, JudgeError> {
        let full = format!(
            "{}\n\nRespond with only a JSON object: {{\"score\": <1-5>, \"reasoning\": \"<one paragraph>\"}}",
            prompt
        );
        let reply = self
            .client
            .generate(&full)
            .await
            .map_err(|e| JudgeError::Unavailable(e.to_string()))?;
        parse_verdict(&reply)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeCriterion {
    Groundedness,
    Coverage,
    Authority,
    TopicQuality,
    Connections,
    Actionability,
    Synthesis,
}

impl JudgeCriterion {
    /// Criteria graded against a single expansion.
    pub const ALL: [JudgeCriterion; 4] = [
        JudgeCriterion::Groundedness,
        JudgeCriterion::Coverage,
        JudgeCriterion::Authority,
        JudgeCriterion::TopicQuality,
    ];

    /// Criteria graded against a digest.
    pub const DIGEST: [JudgeCriterion; 3] = [
        JudgeCriterion::Connections,
        JudgeCriterion::Actionability,
        JudgeCriterion::Synthesis,
    ];

    pub fn metric_name(&self) -> &'static str {
        match self {
            JudgeCriterion::Groundedness => "groundedness",
            JudgeCriterion::Coverage => "coverage",
            JudgeCriterion::Authority => "authority",
            JudgeCriterion::TopicQuality => "topic_quality",
            JudgeCriterion::Connections => "connections",
            JudgeCriterion::Actionability => "actionability",
            JudgeCriterion::Synthesis => "synthesis",
        }
    }

    fn rubric(&self) -> &'static str {
        match self {
            JudgeCriterion::Groundedness => {
                "Evaluate if the expansion's claims are grounded in retrieved sources.

Score 1-5:
5: All claims traceable to sources, no hallucination
4: Most claims grounded, minor unsupported details
3: Mix of grounded and speculative claims
2: Significant claims lack source support
1: Appears to hallucinate or fabricate information

Explain which specific claims lack grounding."
            }
            JudgeCriterion::Coverage => {
                "Evaluate if the expansion captures the essential insights from the source.

Score 1-5:
5: Comprehensive, captures all important insights
4: Good coverage, main points covered with minor gaps
3: Partial, captures obvious points but misses nuance
2: Shallow, only surface-level extraction
1: Inadequate, misses core content

What important aspects were missed?"
            }
            JudgeCriterion::Authority => {
                "Evaluate if related items come from authoritative sources.

Score 1-5:
5: All sources are authoritative (official docs, primary authors, established publications)
4: Mostly authoritative with minor exceptions
3: Mix of authoritative and questionable sources
2: Relies heavily on low-authority sources
1: Sources are unreliable or inappropriate

Which sources lack authority and why?"
            }
            JudgeCriterion::TopicQuality => {
                "Evaluate if topics are semantic groupings (problem spaces) rather than keywords.

Good: \"building-reliable-ai-systems\" (problem space)
Bad: \"evals\", \"testing\", \"monitoring\" (keywords)

Score 1-5:
5: All topics are meaningful semantic groupings
4: Most topics are semantic, one may be keyword-ish
3: Mix of semantic and keyword-style topics
2: Most topics are keywords
1: All topics are superficial keywords or too generic"
            }
            JudgeCriterion::Connections => {
                "Evaluate if the digest's cross-connections are insightful vs obvious.

Score 1-5:
5: Connections reveal non-obvious relationships
3: Connections are logical but surface-level
1: Connections are trivial or missing"
            }
            JudgeCriterion::Actionability => {
                "Evaluate if the digest's open threads are actionable research questions.

Score 1-5:
5: Clear next steps, specific questions to investigate
3: General directions but vague
1: Too abstract to act on"
            }
            JudgeCriterion::Synthesis => {
                "Evaluate the digest's overall synthesis quality.

Is the digest:
- More than sum of parts? (synthesis vs summarization)
- Specific not generic?
- Worth the compute spent?

Score 1-5:
5: Real synthesis, specific and worth reading
3: Competent summary with little synthesis
1: Generic restatement of the inputs"
            }
        }
    }

    pub fn is_digest(&self) -> bool {
        Self::DIGEST.contains(self)
    }

    fn needs_inputs(&self) -> bool {
        matches!(
            self,
            JudgeCriterion::Coverage | JudgeCriterion::Connections | JudgeCriterion::Synthesis
        )
    }

    pub fn prompt(&self, inputs: &Value, output: &Value) -> String {
        let render = |v: &Value| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string());
        let mut prompt = self.rubric().to_string();
        if self.needs_inputs() {
            let label = if self.is_digest() {
                "Expansions digested"
            } else {
                "Inputs (original content/URL)"
            };
            prompt.push_str(&format!("\n\n{}:\n{}", label, render(inputs)));
        }
        let label = if self.is_digest() { "Digest outputs" } else { "Expansion outputs" };
        prompt.push_str(&format!("\n\n{}:\n{}", label, render(output)));
        prompt
    }
}

pub struct JudgedEvaluator {
    criterion: JudgeCriterion,
    judge: Option<Arc<dyn Judge>>,
}

impl JudgedEvaluator {
    pub fn new(criterion: JudgeCriterion, judge: Option<Arc<dyn Judge>>) -> Self {
        Self { criterion, judge }
    }

    pub fn criterion(&self) -> JudgeCriterion {
        self.criterion
    }

    pub async fn evaluate(&self, inputs: &Value, output: &Value) -> EvalResult {
        let name = self.criterion.metric_name();
        let Some(judge) = &self.judge else {
            return EvalResult::unscored(name, JudgeError::Unavailable("no judge configured".into()).to_string());
        };

        match judge.judge(&self.criterion.prompt(inputs, output)).await {
            Ok(verdict) => EvalResult::new(name, Some(verdict.normalized()))
                .with_extra("raw_score", verdict.score)
                .with_extra("reasoning", verdict.reasoning),
            Err(e) => {
                tracing::warn!(metric = name, error = %e, "judge failed");
                EvalResult::unscored(name, e.to_string())
            }
        }
    }
}
