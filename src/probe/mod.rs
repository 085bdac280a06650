//! Inspecting media files
//!
//! The [`Prober`] trait is the seam between the pipeline and ffprobe so that
//! cache and orchestrator behavior can be exercised without the tool.

mod ffprobe;

pub use ffprobe::{parse_ffprobe_json, FfprobeProber};

use crate::error::ProbeError;
use crate::media::SourceFile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Media inspector
#[async_trait]
pub trait Prober: Send + Sync {
    /// Inspect a source file
    ///
    /// Non-media files fail with `ProbeError::Unsupported` without running
    /// any tool.
    async fn probe(&self, source: &SourceFile) -> Result<MediaInfo, ProbeError>;
}

/// What ffprobe reports about a file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container format names, e.g. `mov,mp4,m4a,3gp,3g2,mj2`
    pub container: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// First real video stream (attached pictures excluded)
    pub video: Option<VideoStream>,
    /// First audio stream
    pub audio: Option<AudioStream>,
    /// An attached picture stream is present
    pub has_cover_art: bool,
    pub tags: TagSet,
}

impl MediaInfo {
    /// Whether any container name matches
    pub fn container_is(&self, names: &[&str]) -> bool {
        self.container
            .as_deref()
            .map(|c| c.split(',').any(|part| names.contains(&part.trim())))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoStream {
    pub codec: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Frames per second
    pub fps: Option<f64>,
    /// Display rotation in degrees, as signalled by the container
    pub rotation: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// Audio tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl TagSet {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_matching_splits_names() {
        let info = MediaInfo {
            container: Some("mov,mp4,m4a,3gp,3g2,mj2".into()),
            ..MediaInfo::default()
        };
        assert!(info.container_is(&["mp4"]));
        assert!(!info.container_is(&["matroska"]));
        assert!(!MediaInfo::default().container_is(&["mp4"]));
    }

    #[test]
    fn empty_tags_serialize_to_empty_object() {
        let tags = TagSet::default();
        assert!(tags.is_empty());
        assert_eq!(serde_json::to_string(&tags).unwrap(), "{}");
    }
}
