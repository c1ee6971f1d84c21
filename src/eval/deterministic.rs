use super::EvalResult;
use crate::tools::cache::normalize_url;
use crate::tools::dispatcher::ToolCallRecord;
use serde_json::Value;
use std::collections::HashSet;

/// Fields an expansion must carry. Empty values are fine; absent or null is not.
pub const REQUIRED_FIELDS: [&str; 4] = ["source_summary", "key_points", "related", "topics"];

/// Tools that pull source material.
pub const RETRIEVAL_TOOLS: [&str; 4] = ["fetch_page", "fetch_social_post", "web_search", "code_repo_info"];

/// Runs using more turns than this are not counted as efficient.
pub const EFFICIENT_TURN_LIMIT: usize = 8;

/// Score given to a run with no tool calls.
pub const NEUTRAL_SCORE: f64 = 0.5;

pub fn structure(output: &Value) -> EvalResult {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| output.get(field).map_or(true, Value::is_null))
        .collect();

    let ok = missing.is_empty();
    EvalResult::new("structure", Some(if ok { 1.0 } else { 0.0 }))
        .with_pass(ok)
        .with_extra("missing_fields", missing)
}

/// What a call fetched, for redundancy checks. Searches have no identifier.
pub fn call_identifier(record: &ToolCallRecord) -> Option<String> {
    let arg = |key: &str| {
        record
            .arguments
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    match record.name.as_str() {
        "fetch_page" | "fetch_social_post" => arg("url").map(normalize_url),
        "code_repo_info" => {
            let owner = arg("owner")?;
            let repo = arg("repo")?;
            Some(format!("github.com/{}/{}", owner, repo).to_lowercase())
        }
        _ => None,
    }
}

/// `1 - redundant/total`, where a call is redundant if an earlier call in
/// the run used the same identifier.
pub fn efficiency(trace: &[ToolCallRecord], turns_used: usize) -> EvalResult {
    let mut seen = HashSet::new();
    let redundant = trace
        .iter()
        .filter_map(call_identifier)
        .filter(|id| !seen.insert(id.clone()))
        .count();

    let score = if trace.is_empty() {
        NEUTRAL_SCORE
    } else {
        1.0 - redundant as f64 / trace.len() as f64
    };

    EvalResult::new("efficiency", Some(score))
        .with_extra("tool_calls", trace.len())
        .with_extra("redundant", redundant)
        .with_extra("turns_used", turns_used)
        .with_extra(
            "efficient",
            redundant == 0 && turns_used <= EFFICIENT_TURN_LIMIT,
        )
}

pub fn sources_retrieved(trace: &[ToolCallRecord]) -> EvalResult {
    let retrieved = trace
        .iter()
        .any(|record| RETRIEVAL_TOOLS.contains(&record.name.as_str()));
    EvalResult::new("sources_retrieved", Some(if retrieved { 1.0 } else { 0.0 })).with_pass(retrieved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    #[test]
    fn test_structure_accepts_empty_values() {
        let output = json!({"source_summary": "", "key_points": [], "related": [], "topics": []});
        let result = structure(&output);
        assert_eq!(result.score, Some(1.0));
        assert_eq!(result.pass, Some(true));
    }

    #[test]
    fn test_structure_rejects_null_and_missing() {
        let output = json!({"source_summary": null, "key_points": [], "topics": []});
        let result = structure(&output);
        assert_eq!(result.score, Some(0.0));
        assert_eq!(result.pass, Some(false));
        assert_eq!(
            result.extra_field("missing_fields"),
            Some(&json!(["source_summary", "related"]))
        );
        assert_eq!(structure(&Value::Null).score, Some(0.0));
    }

    #[test]
    fn test_efficiency_counts_one_redundancy_per_repeat() {
        let trace = vec![
            record("fetch_page", json!({"url": "http://x.com/a"})),
            record("fetch_page", json!({"url": "http://x.com/a"})),
        ];
        let result = efficiency(&trace, 2);
        assert_eq!(result.score, Some(0.5));
        assert_eq!(result.extra_field("redundant"), Some(&json!(1)));
        assert_eq!(result.extra_field("efficient"), Some(&json!(false)));
    }

    #[test]
    fn test_efficiency_normalizes_identifiers() {
        let trace = vec![
            record("fetch_page", json!({"url": "HTTP://X.com/a#top"})),
            record("fetch_page", json!({"url": "http://x.com/a"})),
            record("code_repo_info", json!({"owner": "Tokio-RS", "repo": "Tokio"})),
            record("code_repo_info", json!({"owner": "tokio-rs", "repo": "tokio"})),
            record("web_search", json!({"query": "q"})),
            record("web_search", json!({"query": "q"})),
        ];
        let result = efficiency(&trace, 3);
        assert_eq!(result.extra_field("redundant"), Some(&json!(2)));
        assert_eq!(result.score, Some(1.0 - 2.0 / 6.0));
    }

    #[test]
    fn test_efficiency_neutral_without_calls() {
        let result = efficiency(&[], 1);
        assert_eq!(result.score, Some(NEUTRAL_SCORE));
        assert_eq!(result.extra_field("tool_calls"), Some(&json!(0)));
        assert_eq!(result.extra_field("efficient"), Some(&json!(true)));
    }

    #[test]
    fn test_sources_retrieved() {
        assert_eq!(sources_retrieved(&[]).pass, Some(false));
        let trace = vec![record("code_search", json!({})), record("web_search", json!({}))];
        assert_eq!(sources_retrieved(&trace).score, Some(1.0));
        assert_eq!(sources_retrieved(&trace[..1]).score, Some(0.0));
    }
}
