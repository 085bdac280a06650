//! Single-flight artifact cache

use super::key::{CacheKey, CacheState, Slot};
use super::layout::Layout;
use super::manifest::{remove_artifact, Manifest, ManifestRecord, PruneReport};
use crate::error::{CacheError, DerivationError};
use crate::media::SourceStamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A published derived file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: CacheKey,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

type Outcome = Result<Artifact, CacheError>;
type Completion = Arc<watch::Sender<Option<Outcome>>>;

struct Entry {
    key: CacheKey,
    state: CacheState,
    created_at: DateTime<Utc>,
    /// Identifies the derivation that owns this entry
    generation: Uuid,
    /// Published artifact, for Ready entries
    artifact: Option<Artifact>,
    /// Output path of the last published artifact, if any
    output: Option<PathBuf>,
    done: Completion,
}

/// Counts of entries by state
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub pending: usize,
    pub ready: usize,
    pub failed: usize,
}

/// What a sweep removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Failed entries dropped from the index
    pub failed: usize,
    /// Ready entries whose source or output disappeared
    pub orphaned: usize,
    pub manifest: PruneReport,
}

enum Step {
    /// Ready entry for this key; its file still has to be checked
    Ready(Artifact, Uuid),
    /// Someone is deriving this slot
    Wait {
        rx: watch::Receiver<Option<Outcome>>,
        same_key: bool,
    },
    /// Nothing indexed yet; look in the manifest
    Adopt,
    /// We won the slot and must derive
    Produce {
        generation: Uuid,
        done: Completion,
        previous: Option<PathBuf>,
    },
}

struct Inner {
    layout: Layout,
    manifest: Manifest,
    index: Mutex<HashMap<Slot, Entry>>,
}

/// Maps cache keys to derived files, deriving each at most once at a time
#[derive(Clone)]
pub struct ArtifactCache {
    inner: Arc<Inner>,
}

impl ArtifactCache {
    pub fn new(layout: Layout) -> Self {
        let manifest = Manifest::new(layout.manifest_dir());
        Self {
            inner: Arc::new(Inner {
                layout,
                manifest,
                index: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    /// Return the artifact for `key`, running `producer` if there is none
    ///
    /// The producer receives a temporary path next to the final output and
    /// must write the complete artifact there. It runs on its own task, so a
    /// caller that goes away does not cancel it. Concurrent callers for the
    /// same key share one run and its outcome.
    pub async fn get_or_create<P, Fut>(&self, key: CacheKey, producer: P) -> Result<Artifact, CacheError>
    where
        P: FnOnce(PathBuf) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), DerivationError>> + Send + 'static,
    {
        if fs::metadata(&key.source).await.is_err() {
            self.forget_source(&key.source).await;
            return Err(CacheError::SourceVanished(key.source.clone()));
        }

        let mut adoption_checked = false;
        let mut previous_hint = None;

        loop {
            match self.inner.step(&key, adoption_checked, previous_hint.clone()) {
                Step::Ready(artifact, generation) => {
                    if artifact_on_disk(&artifact).await {
                        debug!("Cache hit for {}", key);
                        return Ok(artifact);
                    }
                    debug!("Artifact for {} disappeared, deriving again", key);
                    self.inner.discard(&key.slot(), generation);
                    adoption_checked = true;
                }
                Step::Wait { rx, same_key } => {
                    debug!("Waiting for in-flight derivation of {}", key);
                    let outcome = wait(rx).await;
                    if same_key {
                        return outcome;
                    }
                }
                Step::Adopt => {
                    adoption_checked = true;
                    if let Some(record) = self.inner.manifest.load(&key).await {
                        if record.key == key && record_on_disk(&record).await {
                            debug!("Adopting {} from manifest", record.output.display());
                            self.inner.adopt(record);
                        } else {
                            previous_hint = Some(record.output);
                        }
                    }
                }
                Step::Produce {
                    generation,
                    done,
                    previous,
                } => {
                    let rx = done.subscribe();
                    self.spawn_production(key, generation, done, previous, producer);
                    return wait(rx).await;
                }
            }
        }
    }

    fn spawn_production<P, Fut>(
        &self,
        key: CacheKey,
        generation: Uuid,
        done: Completion,
        previous: Option<PathBuf>,
        producer: P,
    ) where
        P: FnOnce(PathBuf) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), DerivationError>> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let slot = key.slot();
            let label = key.to_string();
            let task = tokio::spawn(produce(
                inner.clone(),
                key,
                generation,
                previous,
                producer,
            ));
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(CacheError::Io {
                    context: format!("deriving {label}"),
                    reason: e.to_string(),
                }),
            };
            match &outcome {
                Ok(artifact) => info!("Derived {} -> {}", label, artifact.path.display()),
                Err(e) => warn!("Derivation of {} failed: {}", label, e),
            }
            inner.complete(&slot, generation, &done, outcome);
        });
    }

    /// Drop index entries, artifacts and records of a vanished source
    async fn forget_source(&self, source: &Path) {
        let removed: Vec<Entry> = {
            let mut index = self.inner.lock();
            let slots: Vec<Slot> = index
                .iter()
                .filter(|(slot, entry)| slot.0 == source && entry.state != CacheState::Pending)
                .map(|(slot, _)| slot.clone())
                .collect();
            slots.iter().filter_map(|slot| index.remove(slot)).collect()
        };

        for entry in removed {
            debug!("Pruning {} (source vanished)", entry.key);
            if let Some(output) = &entry.output {
                remove_artifact(output).await;
            }
            self.inner.manifest.remove(&entry.key).await;
        }
    }

    /// Drop failed and orphaned entries, then prune the manifest
    pub async fn sweep(&self) -> Result<SweepReport, CacheError> {
        let mut report = SweepReport::default();

        let candidates: Vec<(Slot, Uuid, CacheState, CacheKey, Option<PathBuf>)> = {
            let index = self.inner.lock();
            index
                .iter()
                .filter(|(_, e)| e.state != CacheState::Pending)
                .map(|(slot, e)| (slot.clone(), e.generation, e.state, e.key.clone(), e.output.clone()))
                .collect()
        };

        for (slot, generation, state, key, output) in candidates {
            if state.is_evictable() {
                if self.inner.discard(&slot, generation) {
                    report.failed += 1;
                }
                continue;
            }

            let source_present = fs::metadata(&key.source).await.is_ok();
            let output_present = match &output {
                Some(path) => fs::metadata(path).await.is_ok(),
                None => false,
            };
            if source_present && output_present {
                continue;
            }
            if self.inner.discard(&slot, generation) {
                report.orphaned += 1;
                if let Some(path) = &output {
                    remove_artifact(path).await;
                }
                self.inner.manifest.remove(&key).await;
            }
        }

        report.manifest = self.inner.manifest.prune().await?;
        if report.failed + report.orphaned + report.manifest.total() > 0 {
            info!(
                "Cache sweep: {} failed, {} orphaned, {} manifest records pruned",
                report.failed,
                report.orphaned,
                report.manifest.total()
            );
        }
        Ok(report)
    }

    /// Entry counts by state
    pub fn stats(&self) -> CacheStats {
        let index = self.inner.lock();
        let mut stats = CacheStats::default();
        for entry in index.values() {
            match entry.state {
                CacheState::Pending => stats.pending += 1,
                CacheState::Ready => stats.ready += 1,
                CacheState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// State of the entry currently indexed for a key's slot
    pub fn state_of(&self, key: &CacheKey) -> Option<(CacheState, DateTime<Utc>)> {
        self.inner
            .lock()
            .get(&key.slot())
            .map(|e| (e.state, e.created_at))
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Slot, Entry>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide what the caller does next, installing a Pending marker if it
    /// becomes the producer
    fn step(&self, key: &CacheKey, adoption_checked: bool, previous_hint: Option<PathBuf>) -> Step {
        let mut index = self.lock();
        let slot = key.slot();

        let previous = match index.get(&slot) {
            Some(entry) => match entry.state {
                CacheState::Pending => {
                    return Step::Wait {
                        rx: entry.done.subscribe(),
                        same_key: entry.key == *key,
                    };
                }
                CacheState::Ready if entry.key == *key => {
                    if let Some(artifact) = &entry.artifact {
                        return Step::Ready(artifact.clone(), entry.generation);
                    }
                    entry.output.clone()
                }
                // stale or failed: derive again into the same slot
                CacheState::Ready | CacheState::Failed => entry.output.clone(),
            },
            None if !adoption_checked => return Step::Adopt,
            None => previous_hint,
        };

        let generation = Uuid::new_v4();
        let (tx, _) = watch::channel(None);
        let done = Arc::new(tx);
        index.insert(
            slot,
            Entry {
                key: key.clone(),
                state: CacheState::Pending,
                created_at: Utc::now(),
                generation,
                artifact: None,
                output: previous.clone(),
                done: done.clone(),
            },
        );

        Step::Produce {
            generation,
            done,
            previous,
        }
    }

    /// Register an artifact found in the manifest, unless the slot got taken
    fn adopt(&self, record: ManifestRecord) {
        let mut index = self.lock();
        let slot = record.key.slot();
        if index.contains_key(&slot) {
            return;
        }
        let (tx, _) = watch::channel(None);
        let artifact = Artifact {
            key: record.key.clone(),
            path: record.output.clone(),
            size: record.size,
            created_at: record.created_at,
        };
        index.insert(
            slot,
            Entry {
                key: record.key,
                state: CacheState::Ready,
                created_at: record.created_at,
                generation: Uuid::new_v4(),
                output: Some(record.output),
                artifact: Some(artifact),
                done: Arc::new(tx),
            },
        );
    }

    /// Remove the slot's entry if it still belongs to `generation`
    fn discard(&self, slot: &Slot, generation: Uuid) -> bool {
        let mut index = self.lock();
        if index.get(slot).is_some_and(|e| e.generation == generation) {
            index.remove(slot);
            true
        } else {
            false
        }
    }

    /// Record a derivation outcome and wake its waiters
    fn complete(&self, slot: &Slot, generation: Uuid, done: &Completion, outcome: Outcome) {
        {
            let mut index = self.lock();
            if let Some(entry) = index.get_mut(slot).filter(|e| e.generation == generation) {
                match &outcome {
                    Ok(artifact) => {
                        entry.state = CacheState::Ready;
                        entry.created_at = artifact.created_at;
                        entry.output = Some(artifact.path.clone());
                        entry.artifact = Some(artifact.clone());
                    }
                    Err(_) => {
                        entry.state = CacheState::Failed;
                        entry.artifact = None;
                    }
                }
            }
        }
        done.send_replace(Some(outcome));
    }

    /// Pick the artifact path, avoiding files the pipeline does not own
    async fn choose_output(&self, key: &CacheKey, previous: Option<&Path>) -> PathBuf {
        let preferred = self.layout.output_path(key);
        let namespaced = self.layout.namespaced_path(key);

        if let Some(previous) = previous {
            if previous == preferred || previous == namespaced {
                return previous.to_path_buf();
            }
        }
        if fs::symlink_metadata(&preferred).await.is_ok() {
            debug!(
                "{} exists and is not ours, using {}",
                preferred.display(),
                namespaced.display()
            );
            return namespaced;
        }
        preferred
    }
}

async fn produce<P, Fut>(
    inner: Arc<Inner>,
    key: CacheKey,
    generation: Uuid,
    previous: Option<PathBuf>,
    producer: P,
) -> Outcome
where
    P: FnOnce(PathBuf) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), DerivationError>> + Send + 'static,
{
    let output = inner.choose_output(&key, previous.as_deref()).await;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::io(format!("creating {}", parent.display()), e))?;
    }

    let part = Layout::part_path(&output, &generation);
    if let Err(e) = producer(part.clone()).await {
        remove_artifact(&part).await;
        return Err(CacheError::ProducerFailed(e));
    }

    let size = match fs::metadata(&part).await {
        Ok(meta) if meta.len() > 0 => meta.len(),
        _ => {
            remove_artifact(&part).await;
            return Err(CacheError::ProducerFailed(DerivationError::Write(format!(
                "nothing written for {key}"
            ))));
        }
    };

    if let Err(e) = fs::rename(&part, &output).await {
        remove_artifact(&part).await;
        return Err(CacheError::io(format!("publishing {}", output.display()), e));
    }

    let artifact = Artifact {
        key,
        path: output,
        size,
        created_at: Utc::now(),
    };

    let record = ManifestRecord {
        key: artifact.key.clone(),
        output: artifact.path.clone(),
        size,
        created_at: artifact.created_at,
    };
    if let Err(e) = inner.manifest.store(&record).await {
        warn!("Artifact {} will not survive a restart: {}", artifact.path.display(), e);
    }

    Ok(artifact)
}

async fn wait(mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
    let outcome = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
    match outcome {
        Ok(Some(outcome)) => outcome,
        _ => Err(CacheError::Io {
            context: "waiting for derivation".to_string(),
            reason: "producer went away".to_string(),
        }),
    }
}

async fn artifact_on_disk(artifact: &Artifact) -> bool {
    fs::metadata(&artifact.path).await.is_ok()
}

async fn record_on_disk(record: &ManifestRecord) -> bool {
    let current = SourceStamp::of(&record.key.source).await.ok();
    let output = fs::metadata(&record.output).await.ok();
    current == Some(record.key.stamp) && output.is_some_and(|m| m.len() == record.size)
}
