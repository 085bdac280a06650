//! ffmpeg-backed transcoder

use super::args::build_args;
use super::{Job, Transcoder};
use crate::config::schema::TimeoutConfig;
use crate::derivation::DerivationKind;
use crate::error::GatewayError;
use crate::tools::process::{run_tool, RunError};
use crate::tools::ToolPaths;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Runs ffmpeg with a bounded number of concurrent processes
pub struct FfmpegTranscoder {
    tools: Arc<ToolPaths>,
    timeouts: TimeoutConfig,
    tool_log: bool,
    permits: Arc<Semaphore>,
}

impl FfmpegTranscoder {
    pub fn new(tools: Arc<ToolPaths>, timeouts: TimeoutConfig, tool_log: bool, workers: usize) -> Self {
        Self {
            tools,
            timeouts,
            tool_log,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Time limit for a derivation kind
    pub fn timeout_for(&self, kind: DerivationKind) -> Duration {
        match kind {
            DerivationKind::ThumbnailJpeg(_) => self.timeouts.thumbnail(),
            DerivationKind::FullJpeg(_) | DerivationKind::Rotate(_) => self.timeouts.image(),
            DerivationKind::TranscodeMp4(_) | DerivationKind::TranscodeAudio(_) => {
                self.timeouts.transcode()
            }
            DerivationKind::Passthrough | DerivationKind::TagExtract => self.timeouts.probe(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, kind: DerivationKind, job: &Job) -> Result<(), GatewayError> {
        let ffmpeg = self
            .tools
            .ffmpeg()
            .ok_or(GatewayError::ToolUnavailable { tool: "ffmpeg" })?;
        let args = build_args(kind, job, self.tool_log)?;
        let limit = self.timeout_for(kind);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GatewayError::Spawn {
                tool: "ffmpeg",
                reason: e.to_string(),
            })?;

        debug!("ffmpeg {} for {}", kind, job.source.rel);
        let output = run_tool(ffmpeg, &args, limit, self.tool_log)
            .await
            .map_err(|e| match e {
                RunError::TimedOut => GatewayError::Timeout {
                    tool: "ffmpeg",
                    after: limit,
                },
                RunError::Spawn(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    GatewayError::ToolUnavailable { tool: "ffmpeg" }
                }
                RunError::Spawn(e) => GatewayError::Spawn {
                    tool: "ffmpeg",
                    reason: e.to_string(),
                },
            })?;

        if !output.success {
            warn!(
                "ffmpeg {} failed for {} (code {:?}):\n{}",
                kind, job.source.rel, output.code, output.tail
            );
            return Err(GatewayError::ToolFailed {
                code: output.code,
                tail: output.tail,
            });
        }

        match tokio::fs::metadata(&job.output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(GatewayError::EmptyOutput),
        }
    }

    fn is_available(&self) -> bool {
        self.tools.ffmpeg.is_some()
    }
}
