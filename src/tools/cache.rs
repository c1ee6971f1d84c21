//! On-disk content cache for fetched resources
//!
//! # Cache Key Strategy
//!
//! Keys are the first 16 hex characters of SHA-256 over `"<kind>|<normalized url>"`:
//! - the kind keeps page and social-post payloads apart for the same URL
//! - normalization drops the fragment and lowercases scheme and host
//! - keys are stable across runs, so a later run reuses earlier fetches

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::Result;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Webpage,
    SocialPost,
}

impl CacheKind {
    fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Webpage => "webpage",
            CacheKind::SocialPost => "social_post",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub kind: CacheKind,
    pub url: String,
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
}

/// Normalize a URL for cache lookups and redundancy checks.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            // Url already lowercases scheme and host
            url.to_string()
        }
        Err(_) => trimmed.split('#').next().unwrap_or(trimmed).to_string(),
    }
}

pub fn compute_key(kind: CacheKind, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_url(url).as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

pub struct ContentCache {
    dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, kind: CacheKind, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", compute_key(kind, url)))
    }

    /// Cached payload for this URL and kind, if present and readable.
    pub fn get(&self, kind: CacheKind, url: &str) -> Option<Value> {
        let path = self.path_for(kind, url);
        let entry = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
            .filter(|entry| entry.kind == kind);

        match entry {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(url = %url, kind = kind.as_str(), "cache hit");
                Some(entry.payload)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, kind: CacheKind, url: &str, payload: Value) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            kind,
            url: url.to_string(),
            payload,
            cached_at: Utc::now(),
        };
        std::fs::write(self.path_for(kind, url), serde_json::to_string_pretty(&entry)?)?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
