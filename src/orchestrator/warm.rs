//! Thumbnail warm-up
//!
//! Walks the served tree smallest file first and sends every eligible file
//! through the ordinary thumbnail path, so artifacts land in the cache and
//! its manifest exactly as if a client had asked for them.

use super::{Orchestrator, Origin, Resolved};
use crate::cache::Layout;
use crate::derivation::Intent;
use crate::error::{OrchestratorError, WebMediaError, WebMediaResult};
use crate::media::{self, MediaClass};
use crate::policy::Policy;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What a warm-up pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Files the policy wants thumbnails for
    pub eligible: usize,
    /// Thumbnails produced or already cached
    pub derived: usize,
    /// Derivation failed; clients get the original until it is retried
    pub fallback: usize,
    /// No thumbnail applies, e.g. audio without cover art
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    rel: String,
    size: u64,
}

impl Orchestrator {
    /// Pre-derive thumbnails with at most `concurrency` requests in flight
    pub async fn warm(&self, concurrency: usize) -> WebMediaResult<WarmReport> {
        if !self.can_transcode() {
            warn!("ffmpeg is unavailable, skipping thumbnail warm-up");
            return Ok(WarmReport::default());
        }

        let root = self.root.clone();
        let derived_root = self.derived_root.clone();
        let policy = self.policy;
        let candidates = tokio::task::spawn_blocking(move || collect(&root, &derived_root, &policy))
            .await
            .map_err(|e| WebMediaError::User(format!("Warm-up walk aborted: {e}")))?;

        info!("Warming thumbnails for {} file(s)", candidates.len());
        let mut report = WarmReport {
            eligible: candidates.len(),
            ..WarmReport::default()
        };

        let mut outcomes = stream::iter(candidates)
            .map(|candidate| async move {
                let outcome = self.resolve(&candidate.rel, Intent::Thumbnail).await;
                (candidate.rel, outcome)
            })
            .buffered(concurrency.max(1));

        while let Some((rel, outcome)) = outcomes.next().await {
            match outcome {
                Ok(Resolved::File(file)) if file.origin == Origin::Derived => {
                    debug!("Warmed {}", rel);
                    report.derived += 1;
                }
                Ok(Resolved::File(file)) if file.origin == Origin::Fallback => report.fallback += 1,
                Ok(_) | Err(OrchestratorError::NoDerivation { .. }) => report.skipped += 1,
                Err(e) => {
                    warn!("Warm-up of {} failed: {}", rel, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Warm-up finished: {} derived, {} fallback, {} skipped, {} failed",
            report.derived, report.fallback, report.skipped, report.failed
        );
        Ok(report)
    }
}

/// Eligible files under `root`, smallest first
fn collect(root: &Path, derived_root: &Path, policy: &Policy) -> Vec<Candidate> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.path() != derived_root);

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry during warm-up: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file()
            || Layout::is_derived_name(&entry.file_name().to_string_lossy())
        {
            continue;
        }
        let class = media::classify_by_extension(entry.path()).unwrap_or(MediaClass::Other);
        if !policy.warms(class) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        candidates.push(Candidate {
            rel: rel.to_string_lossy().replace('\\', "/"),
            size,
        });
    }

    candidates.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.rel.cmp(&b.rel)));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DeriveConfig;
    use crate::config::StartupMode;
    use tempfile::TempDir;

    fn policy(mode: u8) -> Policy {
        Policy::new(StartupMode::from_number(mode).unwrap(), &DeriveConfig::default())
    }

    #[test]
    fn collects_smallest_first_and_skips_artifacts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("2024")).unwrap();
        std::fs::create_dir_all(root.join(".derived/mirror")).unwrap();
        std::fs::write(root.join("big.jpg"), vec![0u8; 300]).unwrap();
        std::fs::write(root.join("2024/small.png"), vec![0u8; 10]).unwrap();
        std::fs::write(root.join("song.mp3"), vec![0u8; 20]).unwrap();
        std::fs::write(root.join("clip.mkv"), vec![0u8; 5]).unwrap();
        std::fs::write(root.join("big.jpg.wm-thumb256.jpg"), vec![0u8; 1]).unwrap();
        std::fs::write(root.join(".derived/mirror/stray.jpg"), vec![0u8; 1]).unwrap();

        let rels = |mode| {
            collect(root, &root.join(".derived"), &policy(mode))
                .into_iter()
                .map(|c| c.rel)
                .collect::<Vec<_>>()
        };
        assert_eq!(rels(1), vec!["2024/small.png", "big.jpg"]);
        assert_eq!(rels(2), vec!["2024/small.png", "song.mp3", "big.jpg"]);
    }
}
