//! Server configuration
//!
//! One TOML file holds the served root, the startup mode, tool locations and
//! timeouts. A missing file means defaults; command-line flags are applied
//! on top by the commands that take them.

pub mod mode;
pub mod schema;

pub use mode::{Destination, StartupMode};
pub use schema::Config;

use crate::error::{WebMediaError, WebMediaResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Locates, reads and writes the config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for `~/.config/webmedia/config.toml` (or the platform equivalent)
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Manager for an explicit file, as given by `--config` or `WEBMEDIA_CONFIG`
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webmedia")
            .join("config.toml")
    }

    /// Where the temporary destination mirrors the served tree when
    /// `paths.derived_root` is unset
    pub fn default_derived_root() -> PathBuf {
        dirs::cache_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webmedia")
            .join("derived")
    }

    pub fn derived_root(config: &Config) -> PathBuf {
        config
            .paths
            .derived_root
            .clone()
            .unwrap_or_else(Self::default_derived_root)
    }

    /// `_data/ffmpeg/bin` beside the executable, searched before PATH
    pub fn default_bundled_tools() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        Some(exe.parent()?.join("_data").join("ffmpeg").join("bin"))
    }

    /// Read the config file; a missing file yields the defaults
    pub async fn load(&self) -> WebMediaResult<Config> {
        let path = &self.config_path;
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {}, serving with defaults", path.display());
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(WebMediaError::io(
                    format!("reading config from {}", path.display()),
                    e,
                ))
            }
        };

        toml::from_str(&content).map_err(|e| WebMediaError::ConfigInvalid {
            path: path.clone(),
            reason: e.to_string(),
        })
    }

    /// Write `config` as pretty TOML, creating parent directories
    pub async fn save(&self, config: &Config) -> WebMediaResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| WebMediaError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            WebMediaError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Wrote config to {}", self.config_path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
