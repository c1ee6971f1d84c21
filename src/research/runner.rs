use crate::agents::{AgentState, Orchestrator, PromptContext};
use crate::archive::{context_summary, ArchiveIndex, ExpandedStore, Inbox};
use crate::trajectory::TrajectoryRecorder;
use crate::types::{InboxItem, Result};
use std::collections::HashSet;
use std::path::PathBuf;

/// Prior expansions folded into each prompt.
pub const PRIOR_CONTEXT_ITEMS: usize = 5;

#[derive(Debug, Clone)]
pub struct RunnerPaths {
    pub inbox: PathBuf,
    pub expanded: PathBuf,
    pub archive: PathBuf,
    pub trajectories: PathBuf,
    pub world_view: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub item_id: String,
    pub final_state: AgentState,
    pub turns: usize,
    pub tool_calls: usize,
    pub incomplete: bool,
    pub topics: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub run_id: String,
    /// Seeds that already had an expansion.
    pub skipped: usize,
    pub items: Vec<ItemReport>,
    pub trajectory_path: Option<PathBuf>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.items.iter().filter(|i| i.error.is_some()).count()
    }
}

pub struct ResearchRunner {
    orchestrator: Orchestrator,
    inbox: Inbox,
    expanded: ExpandedStore,
    archive: ArchiveIndex,
    paths: RunnerPaths,
}

impl ResearchRunner {
    pub fn new(orchestrator: Orchestrator, paths: RunnerPaths) -> Self {
        Self {
            orchestrator,
            inbox: Inbox::new(&paths.inbox),
            expanded: ExpandedStore::new(&paths.expanded),
            archive: ArchiveIndex::new(&paths.archive),
            paths,
        }
    }

    /// Seeds with no expansion yet, in inbox order.
    pub fn pending(&self) -> Result<Vec<InboxItem>> {
        Ok(self
            .inbox
            .load()?
            .into_iter()
            .filter(|item| !self.expanded.exists(&item.id))
            .collect())
    }

    /// Expand every pending seed, strictly one at a time. A failing seed is
    /// recorded and the batch moves on.
    pub async fn run_pending(&self) -> Result<BatchSummary> {
        let all = self.inbox.load()?;
        let total = all.len();
        let pending: Vec<InboxItem> = all
            .into_iter()
            .filter(|item| !self.expanded.exists(&item.id))
            .collect();
        let recorder = TrajectoryRecorder::new(None);
        let mut summary = BatchSummary {
            run_id: recorder.run_id().to_string(),
            skipped: total - pending.len(),
            ..Default::default()
        };

        if pending.is_empty() {
            tracing::info!("no pending seeds");
            return Ok(summary);
        }

        let known_topics = self.archive.list_topics()?;
        let world_view = self.load_world_view();
        tracing::info!(
            run_id = %summary.run_id,
            pending = pending.len(),
            topics = known_topics.len(),
            "starting batch"
        );

        let mut scheduled = HashSet::new();
        for item in &pending {
            if !scheduled.insert(item.id.as_str()) || self.expanded.exists(&item.id) {
                tracing::warn!(item_id = %item.id, "seed id already expanded, skipping");
                summary.skipped += 1;
                continue;
            }
            recorder.item_start(&item.id, &item.content, item.note.as_deref());
            let report = match self
                .process_item(item, &known_topics, world_view.as_deref(), &recorder)
                .await
            {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(item_id = %item.id, error = %e, "seed failed");
                    recorder.error(&item.id, &e.to_string());
                    ItemReport {
                        item_id: item.id.clone(),
                        final_state: AgentState::Aborted,
                        turns: 0,
                        tool_calls: 0,
                        incomplete: true,
                        topics: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            summary.items.push(report);
        }

        match recorder.save(&self.paths.trajectories) {
            Ok(path) => summary.trajectory_path = Some(path),
            Err(e) => tracing::warn!(error = %e, "failed to save trajectory"),
        }
        Ok(summary)
    }

    async fn process_item(
        &self,
        item: &InboxItem,
        known_topics: &[String],
        world_view: Option<&str>,
        recorder: &TrajectoryRecorder,
    ) -> Result<ItemReport> {
        let ctx = self.context_with(item, known_topics, world_view)?;
        let outcome = self.orchestrator.run(item, &ctx, Some(recorder)).await;
        if let Some(error) = &outcome.error {
            recorder.error(&item.id, error);
        }

        self.expanded.save(&outcome.expansion)?;
        recorder.item_complete(
            &item.id,
            &outcome.expansion.source_summary,
            &outcome.expansion.topics,
            outcome.expansion.related.len(),
            outcome.turn_count,
        );

        Ok(ItemReport {
            item_id: item.id.clone(),
            final_state: outcome.final_state,
            turns: outcome.turn_count,
            tool_calls: outcome.tool_calls.len(),
            incomplete: outcome.expansion.is_incomplete(),
            topics: outcome.expansion.topics,
            error: outcome.error,
        })
    }

    /// Prompt context for a single seed, built the same way a batch builds it.
    pub fn prompt_context(&self, item: &InboxItem) -> Result<PromptContext> {
        let known_topics = self.archive.list_topics()?;
        let world_view = self.load_world_view();
        self.context_with(item, &known_topics, world_view.as_deref())
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn context_with(
        &self,
        item: &InboxItem,
        known_topics: &[String],
        world_view: Option<&str>,
    ) -> Result<PromptContext> {
        let exclude: HashSet<String> = [item.id.clone()].into_iter().collect();
        let related = self.archive.find_related(known_topics, &exclude)?;
        let prior = context_summary(&related, PRIOR_CONTEXT_ITEMS);

        Ok(PromptContext {
            known_topics: known_topics.to_vec(),
            prior_context: (!prior.is_empty()).then_some(prior),
            local_content: read_local_content(item),
            world_view: world_view.map(str::to_string),
        })
    }

    fn load_world_view(&self) -> Option<String> {
        let path = self.paths.world_view.as_ref()?;
        match std::fs::read_to_string(path) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no world view loaded");
                None
            }
        }
    }
}

/// Contents of the seed's stored source text, if it has any and it is readable.
pub fn read_local_content(item: &InboxItem) -> Option<String> {
    let path = item.local_content_ref.as_ref()?;
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(item_id = %item.id, path = %path.display(), error = %e, "local content unreadable");
            None
        }
    }
}
