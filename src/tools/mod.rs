//! Location of the external media tools
//!
//! ffmpeg and ffprobe are looked up once at startup: a bundled build
//! directory wins over `PATH`. The resolved paths are immutable and shared by
//! the prober and the transcoder.

pub mod process;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a tool was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOrigin {
    Bundled,
    Path,
}

impl fmt::Display for ToolOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => write!(f, "bundled"),
            Self::Path => write!(f, "PATH"),
        }
    }
}

/// A resolved executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTool {
    pub path: PathBuf,
    pub origin: ToolOrigin,
}

/// Resolved ffmpeg/ffprobe executables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolPaths {
    pub ffmpeg: Option<ResolvedTool>,
    pub ffprobe: Option<ResolvedTool>,
}

impl ToolPaths {
    /// Resolve both tools, preferring `bundled_dir`
    pub fn resolve(bundled_dir: Option<&Path>) -> Self {
        Self {
            ffmpeg: resolve_tool("ffmpeg", bundled_dir),
            ffprobe: resolve_tool("ffprobe", bundled_dir),
        }
    }

    /// Explicit paths, for tests and overrides
    pub fn explicit(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        let wrap = |path: PathBuf| ResolvedTool {
            path,
            origin: ToolOrigin::Bundled,
        };
        Self {
            ffmpeg: ffmpeg.map(wrap),
            ffprobe: ffprobe.map(wrap),
        }
    }

    pub fn ffmpeg(&self) -> Option<&Path> {
        self.ffmpeg.as_ref().map(|t| t.path.as_path())
    }

    pub fn ffprobe(&self) -> Option<&Path> {
        self.ffprobe.as_ref().map(|t| t.path.as_path())
    }

    /// No tool at all: only passthrough serving is possible
    pub fn is_degraded(&self) -> bool {
        self.ffmpeg.is_none() && self.ffprobe.is_none()
    }
}

fn resolve_tool(name: &str, bundled_dir: Option<&Path>) -> Option<ResolvedTool> {
    if let Some(dir) = bundled_dir {
        let candidate = dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));
        if candidate.is_file() {
            debug!("Using bundled {} at {}", name, candidate.display());
            return Some(ResolvedTool {
                path: candidate,
                origin: ToolOrigin::Bundled,
            });
        }
    }

    match which::which(name) {
        Ok(path) => {
            debug!("Using {} from PATH at {}", name, path.display());
            Some(ResolvedTool {
                path,
                origin: ToolOrigin::Path,
            })
        }
        Err(_) => {
            debug!("{} not found", name);
            None
        }
    }
}
