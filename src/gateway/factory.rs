//! Toolchain factory
//!
//! Resolves the tools once and wires the production prober and transcoder.

use super::{FfmpegTranscoder, Transcoder};
use crate::config::{Config, ConfigManager};
use crate::probe::{FfprobeProber, Prober};
use crate::tools::ToolPaths;
use std::sync::Arc;
use tracing::warn;

/// Resolved tools plus the implementations built on them
#[derive(Clone)]
pub struct Toolchain {
    pub tools: Arc<ToolPaths>,
    pub prober: Arc<dyn Prober>,
    pub transcoder: Arc<dyn Transcoder>,
}

impl Toolchain {
    /// Resolve tools for a configuration
    pub fn from_config(config: &Config) -> Self {
        let bundled = config
            .paths
            .bundled_tools
            .clone()
            .or_else(ConfigManager::default_bundled_tools);
        Self::with_tools(config, ToolPaths::resolve(bundled.as_deref()))
    }

    /// Build the toolchain around already-resolved tools
    pub fn with_tools(config: &Config, tools: ToolPaths) -> Self {
        if tools.is_degraded() {
            warn!("Neither ffmpeg nor ffprobe found; serving originals only");
        } else if tools.ffmpeg.is_none() {
            warn!("ffmpeg not found; derivations will fall back to originals");
        } else if tools.ffprobe.is_none() {
            warn!("ffprobe not found; media traits and tags are unavailable");
        }

        let tools = Arc::new(tools);
        let tool_log = config.mode.tool_log;
        let prober = FfprobeProber::new(tools.clone(), config.timeouts.probe(), tool_log);
        let transcoder = FfmpegTranscoder::new(
            tools.clone(),
            config.timeouts.clone(),
            tool_log,
            config.derive.worker_count(),
        );

        Self {
            tools,
            prober: Arc::new(prober),
            transcoder: Arc::new(transcoder),
        }
    }
}
