//! Git checkout cache
//!
//! Layout, fanned out by URL hash:
//! `<root>/<sha256(url)[0:2]>/<sha256(url)>/<ref-key>/checkout/`
//! with `.ruleweave_cache_meta.json` next to the checkout.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use ruleweave_canon::hash_bytes;
use serde::{Deserialize, Serialize};

use super::error::SourceError;

/// Default ref when a git source names none
pub const DEFAULT_REF: &str = "HEAD";

/// Upper bound for configured intervals (about a century)
const MAX_AGE_HOURS: u64 = 24 * 365 * 100;

/// What a ref string points at; decides how often it is rechecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Branch,
    Tag,
    Commit,
}

impl RefKind {
    /// Classify a ref string.
    ///
    /// Full 40 or 64 character hex ids are commits; `refs/tags/...` and
    /// version-like names (`v1.2`, `1.0.0`) are tags; anything else is
    /// treated as a moving branch.
    pub fn classify(reference: &str) -> Self {
        let reference = reference.trim();
        if matches!(reference.len(), 40 | 64) && reference.chars().all(|c| c.is_ascii_hexdigit()) {
            return RefKind::Commit;
        }
        if reference.starts_with("refs/tags/") {
            return RefKind::Tag;
        }
        let version = reference.strip_prefix('v').unwrap_or(reference);
        let looks_like_version = version.contains('.')
            && version.chars().next().is_some_and(|c| c.is_ascii_digit())
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'));
        if looks_like_version {
            RefKind::Tag
        } else {
            RefKind::Branch
        }
    }
}

/// How long a cached checkout is trusted before it is fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub branch_max_age: Duration,
    pub tag_max_age: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_hours(24, 24 * 7)
    }
}

impl StalenessPolicy {
    pub fn from_hours(branch_hours: u64, tag_hours: u64) -> Self {
        let hours = |h: u64| Duration::hours(h.min(MAX_AGE_HOURS) as i64);
        Self {
            branch_max_age: hours(branch_hours),
            tag_max_age: hours(tag_hours),
        }
    }

    /// Maximum age for a ref kind; commits never go stale.
    pub fn max_age(&self, kind: RefKind) -> Option<Duration> {
        match kind {
            RefKind::Branch => Some(self.branch_max_age),
            RefKind::Tag => Some(self.tag_max_age),
            RefKind::Commit => None,
        }
    }

    pub fn is_stale(&self, kind: RefKind, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.max_age(kind) {
            Some(max_age) => now - fetched_at >= max_age,
            None => false,
        }
    }
}

/// Metadata stored beside each cached checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub url: String,
    pub reference: String,
    pub commit_sha: String,
    pub fetched_at: DateTime<Utc>,
}

impl CacheMeta {
    pub const METADATA_FILENAME: &'static str = ".ruleweave_cache_meta.json";

    pub fn new(url: &str, reference: &str, commit_sha: &str) -> Self {
        Self {
            url: url.to_string(),
            reference: reference.to_string(),
            commit_sha: commit_sha.to_string(),
            fetched_at: Utc::now(),
        }
    }
}

/// A cached checkout found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCheckout {
    pub checkout_dir: PathBuf,
    pub meta: CacheMeta,
}

/// Handle to the on-disk git cache.
#[derive(Debug, Clone)]
pub struct GitCache {
    root: PathBuf,
    policy: StalenessPolicy,
}

impl GitCache {
    pub fn new(root: impl Into<PathBuf>, policy: StalenessPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    /// `RULEWEAVE_CACHE_DIR`, then `$XDG_CACHE_HOME/ruleweave/git`, then
    /// `~/.cache/ruleweave/git`.
    pub fn default_root() -> Option<PathBuf> {
        let non_empty = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty());
        if let Some(dir) = non_empty("RULEWEAVE_CACHE_DIR") {
            return Some(PathBuf::from(dir));
        }
        if let Some(dir) = non_empty("XDG_CACHE_HOME") {
            return Some(PathBuf::from(dir).join("ruleweave").join("git"));
        }
        non_empty("HOME").map(|home| PathBuf::from(home).join(".cache").join("ruleweave").join("git"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// Directory for one url + ref pair.
    pub fn entry_dir(&self, url: &str, reference: &str) -> PathBuf {
        let url_hash = hash_bytes(url.as_bytes());
        self.root
            .join(&url_hash[..2])
            .join(&url_hash)
            .join(ref_key(reference))
    }

    pub fn checkout_dir(&self, url: &str, reference: &str) -> PathBuf {
        self.entry_dir(url, reference).join("checkout")
    }

    fn meta_path(&self, url: &str, reference: &str) -> PathBuf {
        self.entry_dir(url, reference).join(CacheMeta::METADATA_FILENAME)
    }

    /// Find a usable cached checkout. Unreadable metadata counts as a miss.
    pub fn lookup(&self, url: &str, reference: &str) -> Option<CachedCheckout> {
        let checkout_dir = self.checkout_dir(url, reference);
        if !checkout_dir.is_dir() {
            return None;
        }
        let meta_path = self.meta_path(url, reference);
        let content = fs::read_to_string(&meta_path).ok()?;
        match serde_json::from_str::<CacheMeta>(&content) {
            Ok(meta) => Some(CachedCheckout { checkout_dir, meta }),
            Err(e) => {
                log::warn!("ignoring unreadable cache metadata {}: {}", meta_path.display(), e);
                None
            }
        }
    }

    /// Whether a cached entry should be fetched again.
    pub fn needs_refresh(&self, meta: &CacheMeta, now: DateTime<Utc>) -> bool {
        self.policy
            .is_stale(RefKind::classify(&meta.reference), meta.fetched_at, now)
    }

    /// Write metadata atomically (write to temp, then rename).
    pub fn write_meta(&self, meta: &CacheMeta) -> Result<(), SourceError> {
        let entry_dir = self.entry_dir(&meta.url, &meta.reference);
        fs::create_dir_all(&entry_dir).map_err(|e| SourceError::io(&entry_dir, e))?;

        let final_path = entry_dir.join(CacheMeta::METADATA_FILENAME);
        let temp_path = entry_dir.join(format!(".{}.tmp", CacheMeta::METADATA_FILENAME));
        let content = serde_json::to_string_pretty(meta).map_err(|e| {
            SourceError::io(
                &final_path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            )
        })?;

        fs::write(&temp_path, content).map_err(|e| SourceError::io(&temp_path, e))?;
        fs::rename(&temp_path, &final_path).map_err(|e| SourceError::io(&final_path, e))?;
        Ok(())
    }
}

/// Filesystem-safe key for a ref. A short hash keeps distinct refs apart
/// after sanitizing (`a/b` vs `a_b`).
fn ref_key(reference: &str) -> String {
    let sanitized: String = reference
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    let digest = hash_bytes(reference.as_bytes());
    format!("{}-{}", sanitized.trim_start_matches('.'), &digest[..8])
}
