//! Cache keys and entry states

use crate::derivation::DerivationKind;
use crate::media::{SourceFile, SourceStamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Identity of a derived artifact
///
/// Equal keys produce byte-identical output. `rel` is carried for naming
/// only; it is a function of `source` for a fixed served root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Absolute source path
    pub source: PathBuf,
    /// Source path relative to the served root
    pub rel: String,
    /// Source size and mtime the artifact was derived from
    pub stamp: SourceStamp,
    pub kind: DerivationKind,
}

/// Index slot: one artifact per (source, kind), whatever the stamp
pub(crate) type Slot = (PathBuf, DerivationKind);

impl CacheKey {
    pub fn new(source: &SourceFile, kind: DerivationKind) -> Self {
        Self {
            source: source.path.clone(),
            rel: source.rel.clone(),
            stamp: source.stamp,
            kind,
        }
    }

    pub(crate) fn slot(&self) -> Slot {
        (self.source.clone(), self.kind)
    }

    /// Stable hex digest of the slot, used for manifest file names
    pub fn slot_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.kind.tag().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// First 8 hex digits of SHA-256 over the relative path
    pub fn rel_namespace(&self) -> String {
        let digest = Sha256::digest(self.rel.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.rel, self.kind)
    }
}

/// State of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// A derivation is in flight
    Pending,
    /// Output is published and valid for the entry's key
    Ready,
    /// The last derivation failed; the next request retries
    Failed,
}

impl CacheState {
    /// Whether a sweep may drop this entry
    pub fn is_evictable(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
