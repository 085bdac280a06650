//! Configuration schema for webmedia
//!
//! Configuration is stored at `~/.config/webmedia/config.toml`

use crate::config::mode::StartupMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Startup mode (destination, tool log, tag extraction)
    pub mode: StartupMode,

    /// Filesystem locations
    pub paths: PathsConfig,

    /// Per-job time limits for the external tools
    pub timeouts: TimeoutConfig,

    /// Derivation parameters
    pub derive: DeriveConfig,

    /// Artifact cache housekeeping
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind: String,

    /// Port to listen on
    pub port: u16,

    /// Directory tree to serve (defaults to the current directory)
    pub root: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            root: None,
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root for derived output and the artifact manifest
    pub derived_root: Option<PathBuf>,

    /// Directory holding a bundled ffmpeg/ffprobe build
    pub bundled_tools: Option<PathBuf>,
}

/// External tool time limits, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// ffprobe metadata calls
    pub probe_secs: u64,

    /// Thumbnail extraction
    pub thumbnail_secs: u64,

    /// Full-size image re-encode and rotation
    pub image_secs: u64,

    /// Audio/video transcodes
    pub transcode_secs: u64,
}

impl TimeoutConfig {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn thumbnail(&self) -> Duration {
        Duration::from_secs(self.thumbnail_secs)
    }

    pub fn image(&self) -> Duration {
        Duration::from_secs(self.image_secs)
    }

    pub fn transcode(&self) -> Duration {
        Duration::from_secs(self.transcode_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            probe_secs: 5,
            thumbnail_secs: 30,
            image_secs: 60,
            transcode_secs: 1800,
        }
    }
}

/// Derivation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveConfig {
    /// Longest edge of thumbnails, in pixels
    pub thumbnail_edge: u32,

    /// Longest edge of re-encoded full images, in pixels
    pub full_image_edge: u32,

    /// Concurrent tool processes (0 = number of CPUs)
    pub workers: usize,
}

impl DeriveConfig {
    /// Effective worker pool size
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

impl Default for DeriveConfig {
    fn default() -> Self {
        Self {
            thumbnail_edge: 256,
            full_image_edge: 2048,
            workers: 0,
        }
    }
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds between sweeps of failed and orphaned entries (0 = disabled)
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 600,
        }
    }
}
