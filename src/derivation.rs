//! What a client asks for and what the pipeline can derive

use crate::media::Orientation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the client wants to do with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Small preview image
    Thumbnail,
    /// The file as the client should display it
    #[default]
    #[serde(rename = "full")]
    FullView,
    /// Audio tags as JSON
    #[serde(rename = "tags")]
    TagRead,
    /// The original bytes, untouched
    #[serde(rename = "raw")]
    Passthrough,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::FullView => "full",
            Self::TagRead => "tags",
            Self::Passthrough => "raw",
        }
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thumbnail" | "thumb" => Ok(Self::Thumbnail),
            "full" | "view" => Ok(Self::FullView),
            "tags" | "meta" => Ok(Self::TagRead),
            "raw" | "original" => Ok(Self::Passthrough),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video transcode profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoProfile {
    /// H.264 baseline 3.0 + AAC in MP4, playable by old mobile browsers
    Baseline,
}

/// Audio transcode profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioProfile {
    /// AAC-LC in an MP4 (m4a) container
    Aac,
}

/// A derivation the pipeline knows how to produce
///
/// The variant and its parameters are part of the cache key: two kinds
/// that compare equal produce byte-identical output for the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationKind {
    Passthrough,
    /// Re-encode a full JPEG with the pixels made upright
    Rotate(Orientation),
    /// JPEG preview bounded by the given edge
    ThumbnailJpeg(u32),
    /// JPEG re-encode bounded by the given edge
    FullJpeg(u32),
    TranscodeMp4(VideoProfile),
    TranscodeAudio(AudioProfile),
    TagExtract,
}

impl DerivationKind {
    /// Tag used in derived file names (`photo.jpg.wm-<tag>.jpg`)
    pub fn tag(&self) -> String {
        match self {
            Self::Passthrough => "raw".to_string(),
            Self::Rotate(o) => o.tag().to_string(),
            Self::ThumbnailJpeg(edge) => format!("thumb{edge}"),
            Self::FullJpeg(edge) => format!("full{edge}"),
            Self::TranscodeMp4(VideoProfile::Baseline) => "baseline".to_string(),
            Self::TranscodeAudio(AudioProfile::Aac) => "aac".to_string(),
            Self::TagExtract => "tags".to_string(),
        }
    }

    /// Extension of the derived file
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Passthrough => "bin",
            Self::Rotate(_) | Self::ThumbnailJpeg(_) | Self::FullJpeg(_) => "jpg",
            Self::TranscodeMp4(_) => "mp4",
            Self::TranscodeAudio(_) => "m4a",
            Self::TagExtract => "json",
        }
    }

    /// Content type the derived file is served with
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Passthrough => "application/octet-stream",
            Self::Rotate(_) | Self::ThumbnailJpeg(_) | Self::FullJpeg(_) => "image/jpeg",
            Self::TranscodeMp4(_) => "video/mp4",
            Self::TranscodeAudio(_) => "audio/mp4",
            Self::TagExtract => "application/json",
        }
    }

    /// Whether the producer must run the external tool
    pub fn uses_gateway(&self) -> bool {
        !matches!(self, Self::Passthrough | Self::TagExtract)
    }
}

impl fmt::Display for DerivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}
