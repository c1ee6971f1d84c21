use super::ExpandedStore;
use crate::types::{is_valid_item_id, AppError, InboxItem, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only queue of seeds, one JSON record per line.
pub struct Inbox {
    path: PathBuf,
}

impl Inbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, item: &InboxItem) -> Result<()> {
        if !is_valid_item_id(&item.id) {
            return Err(AppError::InvalidInput(format!("invalid seed id '{}'", item.id)));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(item)?)?;
        tracing::debug!(item_id = %item.id, kind = %item.kind, "seed queued");
        Ok(())
    }

    /// All readable seeds in file order. Blank and malformed lines, and ids
    /// that are not `[0-9A-Za-z_-]`, are skipped.
    pub fn load(&self) -> Result<Vec<InboxItem>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut items = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InboxItem>(line) {
                Ok(item) if is_valid_item_id(&item.id) => items.push(item),
                Ok(item) => {
                    tracing::warn!(line = lineno + 1, id = %item.id, "skipping inbox line with unsafe id")
                }
                Err(e) => tracing::warn!(line = lineno + 1, error = %e, "skipping malformed inbox line"),
            }
        }
        Ok(items)
    }

    /// A fresh seed id used by no inbox record and no pending expansion.
    pub fn next_id(&self, expanded: &ExpandedStore) -> Result<String> {
        let used: HashSet<String> = self.load()?.into_iter().map(|item| item.id).collect();
        Ok(InboxItem::unique_id(&InboxItem::new_id(), |id| {
            used.contains(id) || expanded.exists(id)
        }))
    }

    /// Drop records whose id is in `ids`; other lines are kept verbatim.
    /// Returns how many records were removed.
    pub fn remove_ids(&self, ids: &HashSet<String>) -> Result<usize> {
        if ids.is_empty() || !self.path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut kept = String::with_capacity(raw.len());
        let mut removed = 0;

        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let matches = serde_json::from_str::<InboxItem>(line)
                .map(|item| ids.contains(&item.id))
                .unwrap_or(false);
            if matches {
                removed += 1;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        super::write_atomic(&self.path, &kept)?;
        Ok(removed)
    }
}

/// Store user-supplied source text for a seed under `dir`, returning its path.
pub fn save_local_content(dir: &Path, item_id: &str, content: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.txt", item_id));
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = Inbox::new(dir.path().join("inbox.jsonl"));
        assert!(inbox.load().unwrap().is_empty());

        inbox.append(&InboxItem::from_content("1", "https://example.com")).unwrap();
        inbox
            .append(&InboxItem::from_content("2", "an idea").with_note(Some("n".into())))
            .unwrap();
        let items = inbox.load().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].note.as_deref(), Some("n"));

        let ids: HashSet<String> = ["1".to_string()].into_iter().collect();
        assert_eq!(inbox.remove_ids(&ids).unwrap(), 1);
        let items = inbox.load().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "2");
    }

    #[test]
    fn test_malformed_lines_survive_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        let inbox = Inbox::new(&path);
        inbox.append(&InboxItem::from_content("1", "idea")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "\nnot json"))
            .unwrap();

        assert_eq!(inbox.load().unwrap().len(), 1);
        let ids: HashSet<String> = ["1".to_string()].into_iter().collect();
        inbox.remove_ids(&ids).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json\n");
    }

    #[test]
    fn test_unsafe_ids_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        let inbox = Inbox::new(&path);
        inbox.append(&InboxItem::from_content("1", "idea")).unwrap();

        let mut escaping = InboxItem::from_content("1", "idea");
        escaping.id = "../x".to_string();
        assert!(matches!(inbox.append(&escaping), Err(AppError::InvalidInput(_))));
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{}", serde_json::to_string(&escaping).unwrap()))
            .unwrap();

        let ids: Vec<String> = inbox.load().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn test_next_id_avoids_inbox_and_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = Inbox::new(dir.path().join("inbox.jsonl"));
        let expanded = ExpandedStore::new(dir.path().join("expanded"));

        let first = inbox.next_id(&expanded).unwrap();
        inbox.append(&InboxItem::from_content(first.clone(), "a")).unwrap();
        let second = inbox.next_id(&expanded).unwrap();
        assert_ne!(first, second);
        inbox.append(&InboxItem::from_content(second.clone(), "b")).unwrap();

        // An expansion whose seed is gone still reserves its id.
        let ids: HashSet<String> = [first.clone(), second.clone()].into_iter().collect();
        inbox.remove_ids(&ids).unwrap();
        expanded
            .save(&crate::types::Expansion::incomplete(&InboxItem::from_content(first.clone(), "a")))
            .unwrap();
        let third = inbox.next_id(&expanded).unwrap();
        assert_ne!(third, first);
    }

    #[test]
    fn test_save_local_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_local_content(dir.path(), "20240101_000000", "article").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "article");
    }
}
