//! Git fetching
//!
//! The resolver only talks to git through `GitBackend`; `CliGit` shells
//! out to the `git` binary. Fetches are shallow (`--depth 1`) into the
//! cache's checkout directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;

use super::cache::{CacheMeta, CachedCheckout, GitCache};
use super::error::{GitError, SourceError};

/// Stage reached while fetching a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Initializing,
    Fetching,
    CheckingOut,
    Done,
}

/// Progress report passed to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchProgress {
    pub url: String,
    pub reference: String,
    pub phase: FetchPhase,
}

/// What to fetch and where to put it.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub reference: &'a str,
    pub checkout_dir: &'a Path,
}

/// Fetches a single ref into a working tree and reports the commit id.
pub trait GitBackend {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        progress: &dyn Fn(&FetchProgress),
    ) -> Result<String, GitError>;
}

/// Backend using the `git` command line client.
#[derive(Debug, Clone)]
pub struct CliGit {
    program: PathBuf,
}

impl Default for CliGit {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl CliGit {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new(&self.program)
            .arg("-C")
            .arg(dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(GitError::Spawn)?;
        if !output.status.success() {
            return Err(GitError::Command {
                command: args.first().copied().unwrap_or_default().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl GitBackend for CliGit {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        progress: &dyn Fn(&FetchProgress),
    ) -> Result<String, GitError> {
        let report = |phase| {
            progress(&FetchProgress {
                url: request.url.to_string(),
                reference: request.reference.to_string(),
                phase,
            })
        };

        let dir = request.checkout_dir;
        if !dir.join(".git").exists() {
            report(FetchPhase::Initializing);
            fs::create_dir_all(dir).map_err(|e| GitError::Other(format!("{}: {}", dir.display(), e)))?;
            self.run(dir, &["init", "--quiet"])?;
        }

        report(FetchPhase::Fetching);
        self.run(
            dir,
            &["fetch", "--quiet", "--depth", "1", request.url, request.reference],
        )?;

        report(FetchPhase::CheckingOut);
        self.run(dir, &["checkout", "--quiet", "--force", "--detach", "FETCH_HEAD"])?;
        let sha = self.run(dir, &["rev-parse", "HEAD"])?;

        report(FetchPhase::Done);
        Ok(sha)
    }
}

/// Flags that control network access for one resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchPolicy {
    pub offline: bool,
    pub force_refresh: bool,
}

/// Produce a checkout for `url` at `reference`, from cache or network.
pub(crate) fn ensure_checkout(
    cache: &GitCache,
    backend: &dyn GitBackend,
    progress: &dyn Fn(&FetchProgress),
    url: &str,
    reference: &str,
    policy: FetchPolicy,
) -> Result<CachedCheckout, SourceError> {
    let cached = cache.lookup(url, reference);

    if policy.offline {
        return match cached {
            Some(entry) => {
                log::debug!("offline: using cached {}@{} ({})", url, reference, entry.meta.commit_sha);
                Ok(entry)
            }
            None => Err(SourceError::OfflineCacheMiss {
                url: url.to_string(),
                reference: reference.to_string(),
            }),
        };
    }

    if let Some(entry) = &cached {
        if !policy.force_refresh && !cache.needs_refresh(&entry.meta, Utc::now()) {
            log::debug!("cache hit for {}@{} ({})", url, reference, entry.meta.commit_sha);
            return Ok(entry.clone());
        }
    }

    let checkout_dir = cache.checkout_dir(url, reference);
    log::info!("fetching {}@{}", url, reference);
    let request = FetchRequest {
        url,
        reference,
        checkout_dir: &checkout_dir,
    };

    match backend.fetch(&request, progress) {
        Ok(commit_sha) => {
            let meta = CacheMeta::new(url, reference, &commit_sha);
            cache.write_meta(&meta)?;
            Ok(CachedCheckout { checkout_dir, meta })
        }
        Err(err) => match cached {
            Some(entry) if !policy.force_refresh => {
                log::warn!(
                    "refresh of {}@{} failed ({}); using cached commit {} fetched {}",
                    url,
                    reference,
                    err,
                    entry.meta.commit_sha,
                    entry.meta.fetched_at.to_rfc3339()
                );
                Ok(entry)
            }
            _ => Err(SourceError::Network {
                url: url.to_string(),
                reference: reference.to_string(),
                message: err.to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::cache::StalenessPolicy;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct CountingGit {
        calls: Cell<usize>,
        fail: bool,
    }

    impl GitBackend for CountingGit {
        fn fetch(
            &self,
            request: &FetchRequest<'_>,
            progress: &dyn Fn(&FetchProgress),
        ) -> Result<String, GitError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(GitError::Other("network unreachable".to_string()));
            }
            progress(&FetchProgress {
                url: request.url.to_string(),
                reference: request.reference.to_string(),
                phase: FetchPhase::Done,
            });
            fs::create_dir_all(request.checkout_dir).unwrap();
            fs::write(request.checkout_dir.join("rules.md"), "## Testing\nRun tests.\n").unwrap();
            Ok("1111111111111111111111111111111111111111".to_string())
        }
    }

    const URL: &str = "https://example.com/rules.git";

    fn no_progress(_: &FetchProgress) {}

    #[test]
    fn test_fetch_then_cache_hit() {
        let temp = TempDir::new().unwrap();
        let cache = GitCache::new(temp.path(), StalenessPolicy::default());
        let git = CountingGit {
            calls: Cell::new(0),
            fail: false,
        };

        let first = ensure_checkout(&cache, &git, &no_progress, URL, "main", FetchPolicy::default()).unwrap();
        let second = ensure_checkout(&cache, &git, &no_progress, URL, "main", FetchPolicy::default()).unwrap();

        assert_eq!(git.calls.get(), 1);
        assert_eq!(first.meta.commit_sha, second.meta.commit_sha);
        assert!(second.checkout_dir.join("rules.md").exists());
    }

    #[test]
    fn test_force_refresh_bypasses_policy() {
        let temp = TempDir::new().unwrap();
        let cache = GitCache::new(temp.path(), StalenessPolicy::default());
        let git = CountingGit {
            calls: Cell::new(0),
            fail: false,
        };
        let force = FetchPolicy {
            offline: false,
            force_refresh: true,
        };

        ensure_checkout(&cache, &git, &no_progress, URL, "main", FetchPolicy::default()).unwrap();
        ensure_checkout(&cache, &git, &no_progress, URL, "main", force).unwrap();
        assert_eq!(git.calls.get(), 2);
    }

    #[test]
    fn test_offline_miss() {
        let temp = TempDir::new().unwrap();
        let cache = GitCache::new(temp.path(), StalenessPolicy::default());
        let git = CountingGit {
            calls: Cell::new(0),
            fail: false,
        };
        let offline = FetchPolicy {
            offline: true,
            force_refresh: false,
        };

        let err = ensure_checkout(&cache, &git, &no_progress, URL, "main", offline).unwrap_err();
        assert!(matches!(err, SourceError::OfflineCacheMiss { .. }));
        assert_eq!(git.calls.get(), 0);
    }

    #[test]
    fn test_failed_refresh_falls_back_to_cache() {
        let temp = TempDir::new().unwrap();
        let cache = GitCache::new(temp.path(), StalenessPolicy::from_hours(1, 1));
        let ok = CountingGit {
            calls: Cell::new(0),
            fail: false,
        };
        ensure_checkout(&cache, &ok, &no_progress, URL, "main", FetchPolicy::default()).unwrap();

        // Age the entry past the branch interval
        let mut meta = cache.lookup(URL, "main").unwrap().meta;
        meta.fetched_at = Utc::now() - chrono::Duration::hours(2);
        cache.write_meta(&meta).unwrap();

        let failing = CountingGit {
            calls: Cell::new(0),
            fail: true,
        };
        let entry = ensure_checkout(&cache, &failing, &no_progress, URL, "main", FetchPolicy::default()).unwrap();
        assert_eq!(failing.calls.get(), 1);
        assert_eq!(entry.meta.commit_sha, meta.commit_sha);

        let force = FetchPolicy {
            offline: false,
            force_refresh: true,
        };
        let err = ensure_checkout(&cache, &failing, &no_progress, URL, "main", force).unwrap_err();
        assert!(matches!(err, SourceError::Network { .. }));
    }
}
