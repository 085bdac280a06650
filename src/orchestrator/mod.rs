//! Request orchestration
//!
//! Turns `(path, intent)` into something servable: the source file, a
//! derived artifact, extracted tags or a directory listing. Derivation
//! failures fall back to the original so a missing tool never turns a
//! readable file into an error.

mod paths;
mod warm;

pub use paths::{confine, sanitize};
pub use warm::WarmReport;

use crate::cache::{Artifact, ArtifactCache, CacheKey, Layout};
use crate::config::{Config, ConfigManager};
use crate::derivation::{DerivationKind, Intent};
use crate::error::{
    CacheError, DerivationError, GatewayError, OrchestratorError, ProbeError, WebMediaError,
    WebMediaResult,
};
use crate::gateway::{Job, Toolchain, Transcoder};
use crate::media::{self, MediaClass, SourceFile, SourceStamp};
use crate::policy::{DerivationPlan, MediaTraits, Policy};
use crate::probe::{MediaInfo, Prober, TagSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Probe results kept in memory before the memo is reset
const PROBE_MEMO_LIMIT: usize = 4096;

/// Where a served file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The source, because the plan said so
    Source,
    /// A derived artifact
    Derived,
    /// The source, because derivation failed
    Fallback,
}

/// A file ready to be streamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedFile {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub len: u64,
    pub origin: Origin,
    /// Derivation behind the file, if any was attempted
    pub kind: Option<DerivationKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<MediaClass>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// Contents of a served directory, directories first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub path: String,
    pub entries: Vec<ListingEntry>,
}

/// Answer to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(ServedFile),
    Tags(TagSet),
    Directory(Listing),
}

type ProbeOutcome = Result<MediaInfo, ProbeError>;

pub struct Orchestrator {
    root: PathBuf,
    policy: Policy,
    cache: ArtifactCache,
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    /// Canonical derived-output root, when it exists at startup
    derived_root: PathBuf,
    probe_memo: Mutex<HashMap<PathBuf, (SourceStamp, ProbeOutcome)>>,
}

impl Orchestrator {
    /// Build an orchestrator serving `root`, which must be a directory
    pub fn new(
        root: &Path,
        policy: Policy,
        cache: ArtifactCache,
        prober: Arc<dyn Prober>,
        transcoder: Arc<dyn Transcoder>,
    ) -> WebMediaResult<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| WebMediaError::io(format!("resolving {}", root.display()), e))?;
        if !root.is_dir() {
            return Err(WebMediaError::RootNotDirectory(root));
        }
        let derived_root = cache.layout().derived_root();
        let derived_root = derived_root
            .canonicalize()
            .unwrap_or_else(|_| derived_root.to_path_buf());

        Ok(Self {
            root,
            policy,
            cache,
            prober,
            transcoder,
            derived_root,
            probe_memo: Mutex::new(HashMap::new()),
        })
    }

    /// Wire an orchestrator from configuration and a resolved toolchain
    pub fn from_config(config: &Config, root: &Path, toolchain: &Toolchain) -> WebMediaResult<Self> {
        let layout = Layout::new(config.mode.destination, ConfigManager::derived_root(config));
        let policy = Policy::new(config.mode, &config.derive);
        Self::new(
            root,
            policy,
            ArtifactCache::new(layout),
            toolchain.prober.clone(),
            toolchain.transcoder.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Whether derivations that need ffmpeg can run at all
    pub fn can_transcode(&self) -> bool {
        self.transcoder.is_available()
    }

    /// Resolve a request path and intent
    pub async fn resolve(&self, request: &str, intent: Intent) -> Result<Resolved, OrchestratorError> {
        let rel = sanitize(request)?;
        let path = confine(&self.root, &rel).await?;

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| OrchestratorError::Io(format!("{rel}: {e}")))?;
        if meta.is_dir() {
            return self.list(&path, rel).await.map(Resolved::Directory);
        }

        let source = SourceFile::snapshot(path, rel.clone())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OrchestratorError::NotFound(rel.clone()),
                _ => OrchestratorError::Io(format!("{rel}: {e}")),
            })?;

        // artifacts are never sources of further derivations
        if self.is_generated(&source.path) {
            debug!("Serving generated file {} as-is", rel);
            return Ok(match intent {
                Intent::TagRead => Resolved::Tags(TagSet::default()),
                _ => Resolved::File(served_source(&source, None)),
            });
        }

        let traits = self.traits(&source, intent).await;

        let kind = match self.policy.plan(&traits, intent) {
            DerivationPlan::Passthrough if intent == Intent::TagRead => {
                return Ok(Resolved::Tags(TagSet::default()));
            }
            DerivationPlan::Passthrough => return Ok(Resolved::File(served_source(&source, None))),
            DerivationPlan::Unavailable(reason) => {
                return Err(OrchestratorError::NoDerivation { path: rel, reason });
            }
            DerivationPlan::Derive(kind) => kind,
        };

        match self.derive(&source, kind, traits).await {
            Ok(artifact) if kind == DerivationKind::TagExtract => {
                Ok(Resolved::Tags(read_tags(&artifact.path).await))
            }
            Ok(artifact) => Ok(Resolved::File(ServedFile {
                path: artifact.path,
                content_type: kind.content_type(),
                len: artifact.size,
                origin: Origin::Derived,
                kind: Some(kind),
            })),
            Err(OrchestratorError::DerivationFailed(CacheError::SourceVanished(_))) => {
                Err(OrchestratorError::NotFound(rel))
            }
            Err(e) if kind == DerivationKind::TagExtract => {
                warn!("Tag extraction for {} failed, answering without tags: {}", rel, e);
                Ok(Resolved::Tags(TagSet::default()))
            }
            Err(e) => {
                warn!("Serving original for {} [{}]: {}", rel, kind, e);
                let mut file = served_source(&source, Some(kind));
                file.origin = Origin::Fallback;
                Ok(Resolved::File(file))
            }
        }
    }

    /// Whether `path` was written by the pipeline rather than the user
    fn is_generated(&self, path: &Path) -> bool {
        let derived_name = path
            .file_name()
            .is_some_and(|name| Layout::is_derived_name(&name.to_string_lossy()));
        let inside_derived_root =
            self.derived_root.starts_with(&self.root) && path.starts_with(&self.derived_root);
        derived_name || inside_derived_root
    }

    /// Gather only the traits the policy needs for this class and intent
    async fn traits(&self, source: &SourceFile, intent: Intent) -> MediaTraits {
        let mut traits = MediaTraits::new(source.class, source.extension());

        if self.policy.needs_orientation(source.class, intent) {
            let path = source.path.clone();
            traits.orientation = tokio::task::spawn_blocking(move || media::read_orientation(&path))
                .await
                .ok()
                .flatten();
        }

        if self.policy.needs_probe(source.class, intent) {
            match self.probe(source).await {
                Ok(info) => traits.info = Some(info),
                Err(e) => debug!("No media traits for {}: {}", source.rel, e),
            }
        }

        traits
    }

    /// Probe a source, memoized per stamp
    async fn probe(&self, source: &SourceFile) -> ProbeOutcome {
        {
            let memo = self.probe_memo.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((stamp, outcome)) = memo.get(&source.path) {
                if *stamp == source.stamp {
                    return outcome.clone();
                }
            }
        }

        let outcome = self.prober.probe(source).await;
        if !matches!(outcome, Err(ProbeError::Timeout(_))) {
            let mut memo = self.probe_memo.lock().unwrap_or_else(PoisonError::into_inner);
            if memo.len() >= PROBE_MEMO_LIMIT {
                memo.clear();
            }
            memo.insert(source.path.clone(), (source.stamp, outcome.clone()));
        }
        outcome
    }

    /// Fetch or produce the artifact for `kind`
    async fn derive(
        &self,
        source: &SourceFile,
        kind: DerivationKind,
        traits: MediaTraits,
    ) -> Result<Artifact, OrchestratorError> {
        if kind.uses_gateway() && !self.transcoder.is_available() {
            return Err(CacheError::ProducerFailed(DerivationError::Gateway(
                GatewayError::ToolUnavailable { tool: "ffmpeg" },
            ))
            .into());
        }

        let key = CacheKey::new(source, kind);
        let prober = self.prober.clone();
        let transcoder = self.transcoder.clone();
        let source = source.clone();

        let producer = move |output: PathBuf| {
            derive_into(prober, transcoder, source, kind, traits, output)
        };

        Ok(self.cache.get_or_create(key, producer).await?)
    }

    async fn list(&self, dir: &Path, rel: String) -> Result<Listing, OrchestratorError> {
        let io = |e: std::io::Error| OrchestratorError::Io(format!("{}: {}", dir.display(), e));
        let derived_root = self.cache.layout().derived_root();

        let mut entries = Vec::new();
        let mut read = tokio::fs::read_dir(dir).await.map_err(io)?;
        while let Some(entry) = read.next_entry().await.map_err(io)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if Layout::is_derived_name(&name) || entry.path() == derived_root {
                continue;
            }
            // dangling symlinks are skipped
            let Ok(meta) = tokio::fs::metadata(entry.path()).await else {
                continue;
            };
            let dir = meta.is_dir();
            entries.push(ListingEntry {
                class: if dir {
                    None
                } else {
                    Some(media::classify_by_extension(&entry.path()).unwrap_or(MediaClass::Other))
                },
                size: if dir { 0 } else { meta.len() },
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
                dir,
                name,
            });
        }

        entries.sort_by(|a, b| b.dir.cmp(&a.dir).then_with(|| a.name.cmp(&b.name)));
        Ok(Listing { path: rel, entries })
    }
}

/// Producer body: write the artifact for `kind` to `output`
async fn derive_into(
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    source: SourceFile,
    kind: DerivationKind,
    traits: MediaTraits,
    output: PathBuf,
) -> Result<(), DerivationError> {
    if kind == DerivationKind::TagExtract {
        let info = match traits.info {
            Some(info) => info,
            None => prober.probe(&source).await?,
        };
        let json =
            serde_json::to_vec_pretty(&info.tags).map_err(|e| DerivationError::Write(e.to_string()))?;
        return tokio::fs::write(&output, json)
            .await
            .map_err(|e| DerivationError::Write(format!("{}: {}", output.display(), e)));
    }

    let info = match (kind, traits.info) {
        (_, Some(info)) => Some(info),
        (DerivationKind::TranscodeMp4(_), None) => prober.probe(&source).await.ok(),
        _ => None,
    };
    let job = Job {
        source,
        output,
        info,
        orientation: traits.orientation,
    };
    transcoder.run(kind, &job).await?;
    Ok(())
}

fn served_source(source: &SourceFile, kind: Option<DerivationKind>) -> ServedFile {
    ServedFile {
        path: source.path.clone(),
        content_type: source.content_type(),
        len: source.stamp.size,
        origin: Origin::Source,
        kind,
    }
}

async fn read_tags(path: &Path) -> TagSet {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Unreadable tag artifact {}: {}", path.display(), e);
            TagSet::default()
        }),
        Err(e) => {
            warn!("Tag artifact {} vanished: {}", path.display(), e);
            TagSet::default()
        }
    }
}
