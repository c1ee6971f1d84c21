//! Integration tests for the archive lifecycle
//!
//! inbox -> expanded -> digest -> topic archive, with the cleanup that
//! follows a digest.

mod common;

use common::mocks::ScriptedLLMClient;
use delve::archive::{context_summary, ArchiveIndex, ExpandedStore, Inbox};
use delve::digest::{create_digest, render_markdown};
use delve::llm::LLMClient;
use std::collections::{HashMap, HashSet};
use std::fs;
use tempfile::TempDir;

struct Stores {
    _dir: TempDir,
    inbox: Inbox,
    expanded: ExpandedStore,
    archive: ArchiveIndex,
}

fn stores() -> Stores {
    let dir = TempDir::new().unwrap();
    Stores {
        inbox: Inbox::new(dir.path().join("inbox.jsonl")),
        expanded: ExpandedStore::new(dir.path().join("expanded")),
        archive: ArchiveIndex::new(dir.path().join("archive")),
        _dir: dir,
    }
}

#[test]
fn test_archive_and_cleanup_moves_everything() {
    let s = stores();
    for id in ["20240101_000001", "20240101_000002", "20240101_000003"] {
        s.inbox.append(&common::seed(id, &format!("https://example.com/{}", id))).unwrap();
    }
    let first = common::expansion("20240101_000001", &["Agent Design", "evals"]);
    let second = common::expansion("20240101_000002", &[]);
    s.expanded.save(&first).unwrap();
    s.expanded.save(&second).unwrap();

    let report = s
        .archive
        .archive_and_cleanup(&[first, second], &s.expanded, &s.inbox)
        .unwrap();

    assert_eq!(report.archived, 2);
    assert_eq!(report.paths.len(), 3);
    assert_eq!(report.expanded_removed, 2);
    assert_eq!(report.inbox_removed, 2);

    assert_eq!(
        s.archive.list_topics().unwrap(),
        vec!["agent-design", "evals", "uncategorized"]
    );
    let remaining: Vec<String> = s.inbox.load().unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(remaining, vec!["20240101_000003"]);
    assert!(s.expanded.load_all().unwrap().is_empty());

    // The archived copy carries the topics it was filed under.
    let filed = s.archive.load_topic("uncategorized").unwrap();
    assert_eq!(filed[0].topics, vec!["uncategorized"]);
}

#[test]
fn test_cleanup_is_idempotent() {
    let s = stores();
    let exp = common::expansion("20240101_000001", &["evals"]);
    s.inbox.append(&common::seed("20240101_000001", "idea")).unwrap();
    s.expanded.save(&exp).unwrap();

    s.archive
        .archive_and_cleanup(std::slice::from_ref(&exp), &s.expanded, &s.inbox)
        .unwrap();
    let again = s
        .archive
        .archive_and_cleanup(std::slice::from_ref(&exp), &s.expanded, &s.inbox)
        .unwrap();

    assert_eq!(again.expanded_removed, 0);
    assert_eq!(again.inbox_removed, 0);
    assert_eq!(s.archive.load_topic("evals").unwrap().len(), 1);
}

#[test]
fn test_related_research_spans_topics_without_duplicates() {
    let s = stores();
    s.archive
        .archive(&common::expansion("20240101_000001", &["agent-design", "evals"]))
        .unwrap();
    s.archive
        .archive(&common::expansion("20240102_000001", &["evals"]))
        .unwrap();
    s.archive
        .archive(&common::expansion("20240103_000001", &["unrelated"]))
        .unwrap();

    let topics = vec!["agent-design".to_string(), "evals".to_string()];
    let exclude: HashSet<String> = ["20240102_000001".to_string()].into_iter().collect();
    let related = s.archive.find_related(&topics, &exclude).unwrap();

    let ids: Vec<&str> = related.iter().map(|e| e.item_id.as_str()).collect();
    assert_eq!(ids, vec!["20240101_000001"]);

    let summary = context_summary(&related, 5);
    assert!(summary.starts_with("## Related prior research"));
    assert!(summary.contains("### https://example.com/20240101_000001"));
    assert!(summary.contains("**Key points:** first; second"));
}

#[test]
fn test_unknown_topic_is_empty() {
    let s = stores();
    assert!(s.archive.load_topic("nothing-here").unwrap().is_empty());
    assert!(s.archive.list_topics().unwrap().is_empty());
}

#[tokio::test]
async fn test_digest_then_archive() {
    let s = stores();
    let item = common::seed("20240101_000001", "https://example.com/20240101_000001");
    s.inbox.append(&item).unwrap();
    let exp = common::expansion("20240101_000001", &["evals"]);
    s.expanded.save(&exp).unwrap();

    let reply = r#"```json
{"entries": [{"item_id": "20240101_000001", "title": "Eval Basics", "one_liner": "How to score agents", "key_finding": "Use pass^k", "worth_following": ["https://related.example.com"]}],
 "cross_connections": [], "open_threads": ["How big should k be?"]}
```"#;
    let client = ScriptedLLMClient::generating(reply);
    let items: HashMap<_, _> = [(item.id.clone(), item)].into_iter().collect();

    let expansions = s.expanded.load_all().unwrap();
    let digest = create_digest(&expansions, &items, Some(client.as_ref() as &dyn LLMClient)).await;
    let markdown = render_markdown(&digest, &items);

    assert!(markdown.contains("### Eval Basics"));
    assert!(markdown.contains("*Source: https://example.com/20240101_000001*"));
    assert!(markdown.contains("**Worth following:**\n- https://related.example.com"));
    assert!(markdown.contains("## Open Threads"));

    s.archive
        .archive_and_cleanup(&expansions, &s.expanded, &s.inbox)
        .unwrap();
    assert!(s.inbox.load().unwrap().is_empty());
    let archived = s.archive.topic_dir("evals").join("20240101_000001.json");
    assert!(fs::metadata(archived).is_ok());
}
