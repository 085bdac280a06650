//! Transcoder gateway
//!
//! Every external ffmpeg invocation goes through a [`Transcoder`]. The
//! production implementation is [`FfmpegTranscoder`]; tests substitute fakes.

pub mod args;
mod factory;
mod ffmpeg;

pub use factory::Toolchain;
pub use ffmpeg::FfmpegTranscoder;

use crate::derivation::DerivationKind;
use crate::error::GatewayError;
use crate::media::{Orientation, SourceFile};
use crate::probe::MediaInfo;
use async_trait::async_trait;
use std::path::PathBuf;

/// One unit of work for the gateway
#[derive(Debug, Clone)]
pub struct Job {
    pub source: SourceFile,
    /// Where the tool writes; the cache renames it into place afterwards
    pub output: PathBuf,
    /// Probe result, when the kind needed one
    pub info: Option<MediaInfo>,
    /// EXIF orientation of a still image
    pub orientation: Option<Orientation>,
}

/// Runs derivations with an external tool
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Produce `job.output` for `kind`
    async fn run(&self, kind: DerivationKind, job: &Job) -> Result<(), GatewayError>;

    /// Whether the tool was resolved at all
    fn is_available(&self) -> bool;
}
