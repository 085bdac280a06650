//! Source file snapshots and media classification
//!
//! Classification is the fast path in front of every external tool call:
//! extension first, magic bytes when the extension is unknown.

mod classify;
pub mod exif;

pub use classify::{classify, classify_by_extension, classify_by_magic, content_type_for};
pub use self::exif::{read_orientation, Orientation};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Broad media class of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Image,
    Audio,
    Video,
    Other,
}

impl MediaClass {
    /// Whether ffprobe has anything to say about this class
    pub fn is_media(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Size and modification time of a source at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceStamp {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl SourceStamp {
    /// Stamp from filesystem metadata
    pub fn from_metadata(meta: &std::fs::Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size: meta.len(),
            modified: DateTime::<Utc>::from(meta.modified()?),
        })
    }

    /// Read the current stamp of a file
    pub async fn of(path: &Path) -> std::io::Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        Self::from_metadata(&meta)
    }
}

/// Immutable snapshot of a file in the served tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Slash-separated path relative to the served root
    pub rel: String,
    /// Size and mtime when the snapshot was taken
    pub stamp: SourceStamp,
    /// Detected media class
    pub class: MediaClass,
}

impl SourceFile {
    /// Take a snapshot of `path`, which must be a regular file
    pub async fn snapshot(path: PathBuf, rel: String) -> std::io::Result<Self> {
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let stamp = SourceStamp::from_metadata(&meta)?;
        let class = classify(&path).await;
        Ok(Self {
            path,
            rel,
            stamp,
            class,
        })
    }

    /// Lower-cased extension, if any
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }

    /// Natural content type of the source
    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.path)
    }
}

/// Lower-cased extension of a path
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
