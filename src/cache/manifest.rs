//! On-disk manifest of published artifacts
//!
//! One JSON record per slot under `<derived root>/manifest/`, written with
//! temp + rename. The manifest lets a restarted server adopt artifacts
//! instead of deriving them again, and drives the `cache` CLI commands.

use super::key::CacheKey;
use super::layout::PART_SUFFIX;
use crate::error::CacheError;
use crate::media::SourceStamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// A published artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub key: CacheKey,
    pub output: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Result of pruning the manifest
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    /// Records whose source is gone
    pub vanished: usize,
    /// Records whose source changed since derivation
    pub stale: usize,
    /// Records whose artifact file is gone
    pub missing: usize,
    /// Bytes of artifact files deleted
    pub bytes_freed: u64,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.vanished + self.stale + self.missing
    }
}

#[derive(Debug, Clone)]
pub struct Manifest {
    dir: PathBuf,
}

impl Manifest {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{digest}.json"))
    }

    /// Load the record for a key's slot, if any
    pub async fn load(&self, key: &CacheKey) -> Option<ManifestRecord> {
        let path = self.record_path(&key.slot_digest());
        let content = fs::read(&path).await.ok()?;
        match serde_json::from_slice(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring unreadable manifest record {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist a record, replacing the slot's previous one
    pub async fn store(&self, record: &ManifestRecord) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(format!("creating {}", self.dir.display()), e))?;

        let path = self.record_path(&record.key.slot_digest());
        let part = path.with_extension(format!("json{PART_SUFFIX}"));
        let json = serde_json::to_vec_pretty(record).map_err(|e| CacheError::Io {
            context: "encoding manifest record".to_string(),
            reason: e.to_string(),
        })?;

        fs::write(&part, json)
            .await
            .map_err(|e| CacheError::io(format!("writing {}", part.display()), e))?;
        fs::rename(&part, &path)
            .await
            .map_err(|e| CacheError::io(format!("publishing {}", path.display()), e))?;
        Ok(())
    }

    /// Drop the record for a key's slot
    pub async fn remove(&self, key: &CacheKey) {
        let path = self.record_path(&key.slot_digest());
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove manifest record {}: {}", path.display(), e);
            }
        }
    }

    /// All readable records
    pub async fn list(&self) -> Result<Vec<ManifestRecord>, CacheError> {
        let mut records = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(CacheError::io(format!("reading {}", self.dir.display()), e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(format!("reading {}", self.dir.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).await {
                Ok(content) => match serde_json::from_slice::<ManifestRecord>(&content) {
                    Ok(record) => records.push(record),
                    Err(e) => debug!("Skipping {}: {}", path.display(), e),
                },
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| a.key.rel.cmp(&b.key.rel).then(a.output.cmp(&b.output)));
        Ok(records)
    }

    /// Delete records (and their artifacts) that no longer match their source
    pub async fn prune(&self) -> Result<PruneReport, CacheError> {
        let mut report = PruneReport::default();

        for record in self.list().await? {
            let output_size = fs::metadata(&record.output).await.ok().map(|m| m.len());
            let verdict = match SourceStamp::of(&record.key.source).await {
                Err(_) => Some(&mut report.vanished),
                Ok(stamp) if stamp != record.key.stamp => Some(&mut report.stale),
                Ok(_) if output_size.is_none() => Some(&mut report.missing),
                Ok(_) => None,
            };

            if let Some(counter) = verdict {
                *counter += 1;
                if let Some(size) = output_size {
                    remove_artifact(&record.output).await;
                    report.bytes_freed += size;
                }
                self.remove(&record.key).await;
            }
        }

        Ok(report)
    }

    /// Delete every record and artifact; returns (records, bytes freed)
    pub async fn clear(&self) -> Result<(usize, u64), CacheError> {
        let records = self.list().await?;
        let mut freed = 0;
        for record in &records {
            if let Ok(meta) = fs::metadata(&record.output).await {
                freed += meta.len();
                remove_artifact(&record.output).await;
            }
            self.remove(&record.key).await;
        }
        Ok((records.len(), freed))
    }
}

/// Remove an artifact file, logging anything but "already gone"
pub(crate) async fn remove_artifact(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove artifact {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::DerivationKind;
    use tempfile::TempDir;

    async fn record_for(dir: &TempDir, name: &str) -> ManifestRecord {
        let source = dir.path().join(name);
        std::fs::write(&source, b"source bytes").unwrap();
        let output = dir.path().join(format!("{name}.wm-thumb256.jpg"));
        std::fs::write(&output, b"jpeg").unwrap();

        ManifestRecord {
            key: CacheKey {
                stamp: SourceStamp::of(&source).await.unwrap(),
                source,
                rel: name.to_string(),
                kind: DerivationKind::ThumbnailJpeg(256),
            },
            output,
            size: 4,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn store_load_and_list() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::new(dir.path().join("manifest"));
        let record = record_for(&dir, "a.jpg").await;

        manifest.store(&record).await.unwrap();
        assert_eq!(manifest.load(&record.key).await, Some(record.clone()));
        assert_eq!(manifest.list().await.unwrap(), vec![record.clone()]);

        manifest.remove(&record.key).await;
        assert_eq!(manifest.load(&record.key).await, None);
    }

    #[tokio::test]
    async fn list_of_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::new(dir.path().join("nope"));
        assert!(manifest.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prune_drops_vanished_and_stale() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::new(dir.path().join("manifest"));

        let keep = record_for(&dir, "keep.jpg").await;
        let gone = record_for(&dir, "gone.jpg").await;
        let changed = record_for(&dir, "changed.jpg").await;
        for r in [&keep, &gone, &changed] {
            manifest.store(r).await.unwrap();
        }

        std::fs::remove_file(&gone.key.source).unwrap();
        std::fs::write(&changed.key.source, b"different length now").unwrap();

        let report = manifest.prune().await.unwrap();
        assert_eq!(report.vanished, 1);
        assert_eq!(report.stale, 1);
        assert_eq!(report.total(), 2);
        assert_eq!(report.bytes_freed, 8);

        assert!(keep.output.exists());
        assert!(!gone.output.exists());
        assert!(!changed.output.exists());
        assert_eq!(manifest.list().await.unwrap(), vec![keep]);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::new(dir.path().join("manifest"));
        let record = record_for(&dir, "a.jpg").await;
        manifest.store(&record).await.unwrap();

        let (count, freed) = manifest.clear().await.unwrap();
        assert_eq!((count, freed), (1, 4));
        assert!(!record.output.exists());
        assert!(record.key.source.exists());
    }
}
