//! Command handlers for the `delve` binary
//!
//! Each handler owns its stores for the duration of the command. Only the
//! commands that talk to a model build a provider client.

use super::output::Output;
use super::Commands;
use crate::agents::Orchestrator;
use crate::archive::inbox::save_local_content;
use crate::archive::{ArchiveIndex, ExpandedStore, Inbox};
use crate::digest::{create_digest, render_markdown};
use crate::eval::{
    expansion_inputs, expansion_output, format_eval_results, format_reliability, run_reliability,
    EvalHarness, EvalInput, Judge, LlmJudge,
};
use crate::llm::LLMClient;
use crate::research::ResearchRunner;
use crate::tools::{ContentCache, ToolContext, ToolDispatcher, ToolRegistry};
use crate::trajectory::{list_trajectories, load_trajectory, EventKind};
use crate::types::{Expansion, InboxItem, ItemKind};
use crate::utils::DelveConfig;
use anyhow::{anyhow, bail, Context};
use chrono::Local;
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::sync::Arc;

const LISTING_CHARS: usize = 60;
const TOPIC_PREVIEW_ITEMS: usize = 3;

/// Run one parsed subcommand.
pub async fn execute(command: Commands, config: &DelveConfig, output: &Output) -> anyhow::Result<()> {
    match command {
        Commands::Add {
            content,
            note,
            file,
            question,
        } => add(config, output, content, note, file, question),
        Commands::Run => run(config, output).await,
        Commands::Digest {
            all,
            no_archive,
            judged,
        } => digest(config, output, all, no_archive, judged).await,
        Commands::Show => show(config, output),
        Commands::Topics => topics(config, output),
        Commands::Eval { id, judged } => eval(config, output, id, judged).await,
        Commands::Reliability {
            id,
            k,
            threshold,
            judged,
        } => reliability(config, output, id, k, threshold, judged).await,
        Commands::Trajectories { run_id } => trajectories(config, output, run_id),
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

async fn agent_client(config: &DelveConfig) -> anyhow::Result<Arc<dyn LLMClient>> {
    let provider = config
        .to_provider()
        .context("model provider is not configured")?;
    let client = provider.create_client().await?;
    tracing::debug!(provider = provider.name(), model = provider.model(), "client ready");
    Ok(client)
}

async fn build_orchestrator(config: &DelveConfig) -> anyhow::Result<Orchestrator> {
    let client = agent_client(config).await?;
    let cache = config
        .tools
        .cache_enabled
        .then(|| Arc::new(ContentCache::new(&config.paths.cache)));
    let ctx = ToolContext::new(config.tool_settings(), cache)?;
    let registry = Arc::new(ToolRegistry::research_tools(ctx));
    Ok(Orchestrator::new(
        client,
        ToolDispatcher::new(registry),
        config.orchestrator_config(),
    ))
}

async fn build_harness(config: &DelveConfig, judged: bool) -> anyhow::Result<EvalHarness> {
    if !judged {
        return Ok(EvalHarness::deterministic());
    }
    Ok(EvalHarness::with_judge(Some(build_judge(config).await?)))
}

async fn build_judge(config: &DelveConfig) -> anyhow::Result<Arc<dyn Judge>> {
    let provider = config
        .judge_provider()
        .context("judged evaluators need a model provider")?;
    let judge: Arc<dyn Judge> = Arc::new(LlmJudge::new(provider.create_client().await?));
    Ok(judge)
}

fn read_source_file(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file))
}

fn add(
    config: &DelveConfig,
    output: &Output,
    content: String,
    note: Option<String>,
    file: Option<String>,
    question: bool,
) -> anyhow::Result<()> {
    let content = content.trim().to_string();
    if content.is_empty() {
        bail!("content must not be empty");
    }

    let inbox = Inbox::new(&config.paths.inbox);
    let id = inbox.next_id(&ExpandedStore::new(&config.paths.expanded))?;
    let local = match file.as_deref() {
        Some(file) => {
            let text = read_source_file(file)?;
            Some(save_local_content(&config.paths.cache, &id, &text)?)
        }
        None => None,
    };

    let mut item = InboxItem::from_content(id, content)
        .with_note(note)
        .with_local_content(local);
    if question && item.kind != ItemKind::Url {
        item = item.with_kind(ItemKind::Question);
    }

    inbox.append(&item)?;
    tracing::info!(item_id = %item.id, kind = %item.kind, "seed added");

    output.success(&format!("Added to inbox: {}", item.id));
    output.kv("kind", &item.kind.to_string());
    output.kv("content", &shorten(&item.content, LISTING_CHARS));
    if let Some(note) = &item.note {
        output.kv("note", note);
    }
    if let Some(path) = &item.local_content_ref {
        output.kv("local content", &path.display().to_string());
    }
    Ok(())
}

async fn run(config: &DelveConfig, output: &Output) -> anyhow::Result<()> {
    let inbox = Inbox::new(&config.paths.inbox);
    if inbox.load()?.is_empty() {
        output.warning("Inbox is empty.");
        output.hint("Add a seed first:");
        output.command("delve add https://example.com/post -n \"why it matters\"");
        return Ok(());
    }

    let runner = ResearchRunner::new(build_orchestrator(config).await?, config.runner_paths());
    let pending = runner.pending()?;
    if pending.is_empty() {
        output.info("All items already processed.");
        return Ok(());
    }

    output.header(&format!("Expanding {} seed(s)", pending.len()));
    let summary = runner.run_pending().await?;

    let total = summary.items.len();
    for (i, report) in summary.items.iter().enumerate() {
        output.step(
            i + 1,
            total,
            &format!(
                "{} {} ({} turns, {} tool calls)",
                report.item_id, report.final_state, report.turns, report.tool_calls
            ),
        );
        if !report.topics.is_empty() {
            output.kv("topics", &report.topics.join(", "));
        }
        if report.incomplete {
            output.warning("expansion incomplete");
        }
        if let Some(error) = &report.error {
            output.warning(error);
        }
    }

    output.newline();
    output.success(&format!(
        "Expanded {} seed(s), {} failed",
        total - summary.failed(),
        summary.failed()
    ));
    if let Some(path) = &summary.trajectory_path {
        output.created("trajectory", &path.display().to_string());
    }
    output.hint("Next: build the digest");
    output.command("delve digest");
    Ok(())
}

async fn digest(
    config: &DelveConfig,
    output: &Output,
    all: bool,
    no_archive: bool,
    judged: bool,
) -> anyhow::Result<()> {
    let inbox = Inbox::new(&config.paths.inbox);
    let expanded = ExpandedStore::new(&config.paths.expanded);

    let items: HashMap<String, InboxItem> = inbox
        .load()?
        .into_iter()
        .map(|item| (item.id.clone(), item))
        .collect();
    let mut expansions = expanded.load_all()?;

    if !all {
        let prefix = Local::now().format("%Y%m%d").to_string();
        expansions.retain(|exp| exp.item_id.starts_with(&prefix));
        if expansions.is_empty() {
            output.warning("No expansions from today.");
            output.hint("Use --all to include every pending expansion");
            return Ok(());
        }
    }
    if expansions.is_empty() {
        output.warning("No expansions to digest.");
        return Ok(());
    }

    let client = match agent_client(config).await {
        Ok(client) => Some(client),
        Err(e) => {
            output.warning(&format!("{:#}; writing a plain digest", e));
            None
        }
    };

    let digest = create_digest(&expansions, &items, client.as_deref()).await;
    let markdown = render_markdown(&digest, &items);

    std::fs::create_dir_all(&config.paths.digests)
        .with_context(|| format!("failed to create {}", config.paths.digests.display()))?;
    let path = config.paths.digests.join(format!("{}.md", digest.date));
    std::fs::write(&path, &markdown).with_context(|| format!("failed to write {}", path.display()))?;

    output.block(&markdown);
    output.created("digest", &path.display().to_string());

    if judged {
        let report = EvalHarness::for_digest(Some(build_judge(config).await?))
            .run_digest(&digest, &expansions)
            .await;
        output.subheader("Digest eval");
        output.block(&format_eval_results(&report));
    }

    if no_archive {
        return Ok(());
    }

    let archive = ArchiveIndex::new(&config.paths.archive);
    let report = archive.archive_and_cleanup(&expansions, &expanded, &inbox)?;
    let topics: BTreeSet<String> = expansions.iter().flat_map(Expansion::archive_topics).collect();

    output.success(&format!(
        "Archived {} expansion(s), removed {} inbox record(s)",
        report.archived, report.inbox_removed
    ));
    output.kv("topics", &topics.into_iter().collect::<Vec<_>>().join(", "));
    Ok(())
}

fn show(config: &DelveConfig, output: &Output) -> anyhow::Result<()> {
    let items = Inbox::new(&config.paths.inbox).load()?;
    if items.is_empty() {
        output.info("Inbox is empty.");
        return Ok(());
    }

    let expanded = ExpandedStore::new(&config.paths.expanded);
    output.header(&format!("Inbox ({} items)", items.len()));
    for item in &items {
        let status = if expanded.exists(&item.id) {
            "expanded"
        } else {
            "pending"
        };
        output.list_item(&format!(
            "[{}] {} ({}, {})",
            item.id,
            shorten(&item.content, LISTING_CHARS),
            item.kind,
            status
        ));
        if let Some(note) = &item.note {
            output.kv("note", note);
        }
    }
    Ok(())
}

fn topics(config: &DelveConfig, output: &Output) -> anyhow::Result<()> {
    let archive = ArchiveIndex::new(&config.paths.archive);
    let topics = archive.list_topics()?;
    if topics.is_empty() {
        output.info("No topics in archive yet.");
        return Ok(());
    }

    output.header(&format!("Archive topics ({})", topics.len()));
    for topic in &topics {
        let entries = archive.load_topic(topic)?;
        output.subheader(&format!("{} ({} items)", topic, entries.len()));
        for exp in entries.iter().take(TOPIC_PREVIEW_ITEMS) {
            output.list_item(exp.source_url.as_deref().unwrap_or(&exp.item_id));
        }
        if entries.len() > TOPIC_PREVIEW_ITEMS {
            output.list_item(&format!("... and {} more", entries.len() - TOPIC_PREVIEW_ITEMS));
        }
    }
    Ok(())
}

async fn eval(config: &DelveConfig, output: &Output, id: Option<String>, judged: bool) -> anyhow::Result<()> {
    let store = ExpandedStore::new(&config.paths.expanded);
    let mut expansions = store.load_all()?;
    if let Some(id) = &id {
        expansions.retain(|exp| &exp.item_id == id);
        if expansions.is_empty() {
            bail!("Expansion {} not found", id);
        }
    }
    if expansions.is_empty() {
        output.info("No expansions to evaluate.");
        return Ok(());
    }

    let harness = build_harness(config, judged).await?;
    output.header(&format!("Evaluating {} expansion(s)", expansions.len()));
    for exp in &expansions {
        let inputs = expansion_inputs(exp);
        let produced = store
            .load_raw(&exp.item_id)?
            .unwrap_or_else(|| expansion_output(exp));
        let report = harness.run(&EvalInput::new(&inputs, &produced)).await;
        output.subheader(&exp.item_id);
        output.block(&format_eval_results(&report));
    }

    if !judged {
        output.hint("Add --judged to include the model-graded evaluators (costs API calls)");
    }
    Ok(())
}

async fn reliability(
    config: &DelveConfig,
    output: &Output,
    id: String,
    k: Option<usize>,
    threshold: Option<f64>,
    judged: bool,
) -> anyhow::Result<()> {
    let k = k.unwrap_or(config.eval.k);
    let threshold = threshold.unwrap_or(config.eval.threshold);
    if k == 0 {
        bail!("k must be at least 1");
    }
    if !(0.0..=1.0).contains(&threshold) {
        bail!("threshold must be within [0, 1], got {}", threshold);
    }

    let item = Inbox::new(&config.paths.inbox)
        .load()?
        .into_iter()
        .find(|item| item.id == id)
        .ok_or_else(|| anyhow!("Seed {} not found in inbox", id))?;

    let runner = ResearchRunner::new(build_orchestrator(config).await?, config.runner_paths());
    let ctx = runner.prompt_context(&item)?;
    let harness = build_harness(config, judged).await?;

    output.header(&format!(
        "Reliability of {} ({} runs, threshold {:.2})",
        item.id, k, threshold
    ));
    let report = run_reliability(runner.orchestrator(), &harness, &item, &ctx, k, threshold).await;
    output.block(&format_reliability(&report));
    Ok(())
}

fn describe_event(kind: &EventKind) -> String {
    match kind {
        EventKind::ItemStart { item_id, content, .. } => {
            format!("{} start: {}", item_id, shorten(content, LISTING_CHARS))
        }
        EventKind::ToolCall {
            item_id,
            tool_name,
            turn,
            ..
        } => format!("{} turn {}: call {}", item_id, turn, tool_name),
        EventKind::ToolResult {
            item_id,
            tool_name,
            result_preview,
            turn,
        } => format!(
            "{} turn {}: {} -> {}",
            item_id,
            turn,
            tool_name,
            shorten(result_preview, LISTING_CHARS)
        ),
        EventKind::Thinking { item_id, thinking, turn } => {
            format!("{} turn {}: {}", item_id, turn, shorten(thinking, LISTING_CHARS))
        }
        EventKind::ItemComplete {
            item_id,
            topics,
            related_count,
            turns_used,
            ..
        } => format!(
            "{} complete after {} turns ({} related; topics: {})",
            item_id,
            turns_used,
            related_count,
            topics.join(", ")
        ),
        EventKind::Error { item_id, error } => format!("{} error: {}", item_id, error),
    }
}

fn trajectories(config: &DelveConfig, output: &Output, run_id: Option<String>) -> anyhow::Result<()> {
    let dir = config.paths.trajectories.as_path();

    let Some(run_id) = run_id else {
        let ids = list_trajectories(dir)?;
        if ids.is_empty() {
            output.info("No trajectories recorded yet.");
            return Ok(());
        }
        output.header(&format!("Trajectories ({})", ids.len()));
        for id in &ids {
            output.list_item(id);
        }
        output.hint("Show one run:");
        output.command("delve trajectories --run-id <RUN_ID>");
        return Ok(());
    };

    let log = load_trajectory(dir, &run_id)?;
    output.header(&format!("Trajectory {}", log.run_id));
    output.kv("started", &log.start_time.to_rfc3339());
    output.kv("finished", &log.end_time.to_rfc3339());
    output.kv("items", &log.summary.items_processed.to_string());
    output.kv("tool calls", &log.summary.tool_calls.to_string());
    output.kv("errors", &log.summary.errors.to_string());

    output.subheader("Events");
    for event in &log.events {
        output.list_item(&describe_event(&event.kind));
    }
    Ok(())
}
