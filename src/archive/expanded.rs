use crate::types::{is_valid_item_id, AppError, Expansion, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Expansions produced but not yet archived, one `{item_id}.json` each.
pub struct ExpandedStore {
    dir: PathBuf,
}

impl ExpandedStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, item_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", item_id))
    }

    pub fn save(&self, expansion: &Expansion) -> Result<PathBuf> {
        if !is_valid_item_id(&expansion.item_id) {
            return Err(AppError::InvalidInput(format!(
                "invalid seed id '{}'",
                expansion.item_id
            )));
        }
        let path = self.path_for(&expansion.item_id);
        super::write_atomic(&path, &serde_json::to_string_pretty(expansion)?)?;
        Ok(path)
    }

    pub fn exists(&self, item_id: &str) -> bool {
        self.path_for(item_id).is_file()
    }

    pub fn load(&self, item_id: &str) -> Result<Option<Expansion>> {
        let path = self.path_for(item_id);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// The stored file as untyped JSON, with absent keys left absent.
    pub fn load_raw(&self, item_id: &str) -> Result<Option<Value>> {
        let path = self.path_for(item_id);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Every pending expansion, ordered by item id. Unreadable files are skipped.
    pub fn load_all(&self) -> Result<Vec<Expansion>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut expansions = Vec::with_capacity(paths.len());
        for path in paths {
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Expansion>(&raw).map_err(|e| e.to_string()))
            {
                Ok(exp) => expansions.push(exp),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable expansion"),
            }
        }
        Ok(expansions)
    }

    pub fn processed_ids(&self) -> Result<HashSet<String>> {
        Ok(self.load_all()?.into_iter().map(|e| e.item_id).collect())
    }

    /// Returns whether a file was removed.
    pub fn remove(&self, item_id: &str) -> Result<bool> {
        let path = self.path_for(item_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InboxItem;

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExpandedStore::new(dir.path().join("expanded"));
        assert!(store.load_all().unwrap().is_empty());

        let exp = Expansion::incomplete(&InboxItem::from_content("20240101_000000", "idea"));
        store.save(&exp).unwrap();
        assert!(store.exists("20240101_000000"));
        assert_eq!(store.load("20240101_000000").unwrap(), Some(exp));
        assert!(store.processed_ids().unwrap().contains("20240101_000000"));

        assert!(store.remove("20240101_000000").unwrap());
        assert!(!store.remove("20240101_000000").unwrap());
        assert!(store.load("20240101_000000").unwrap().is_none());
    }

    #[test]
    fn test_load_raw_keeps_missing_keys_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExpandedStore::new(dir.path());
        std::fs::write(
            dir.path().join("20240101_000000.json"),
            r#"{"item_id": "20240101_000000", "source_summary": "s", "key_points": [],
                "assessment": "a", "expanded_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let typed = store.load("20240101_000000").unwrap().unwrap();
        assert!(typed.related.is_empty());
        let raw = store.load_raw("20240101_000000").unwrap().unwrap();
        assert!(raw.get("related").is_none());
        assert!(store.load_raw("missing").unwrap().is_none());
    }

    #[test]
    fn test_save_rejects_unsafe_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExpandedStore::new(dir.path().join("expanded"));
        let mut exp = Expansion::incomplete(&InboxItem::from_content("x", "idea"));
        exp.item_id = "../escape".to_string();

        assert!(matches!(store.save(&exp), Err(AppError::InvalidInput(_))));
        assert!(!dir.path().join("escape.json").exists());
    }
}
