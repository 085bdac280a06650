//! Startup mode: where derived output goes and which optional features run
//!
//! The eight launch modes are three independent settings:
//!
//! | Mode | Destination | Tool log | Tag extraction |
//! |------|-------------|----------|----------------|
//! | 1 / original-1 | original | off | off |
//! | 2 / original-2 | original | off | on |
//! | 3 / original-3 | original | on | off |
//! | 4 / original-4 | original | on | on |
//! | 5 / temporary-1 | temporary | off | off |
//! | 6 / temporary-2 | temporary | off | on |
//! | 7 / temporary-3 | temporary | on | off |
//! | 8 / temporary-4 | temporary | on | on |

use crate::error::{WebMediaError, WebMediaResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where derived artifacts are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Next to the source file, inside the served tree
    #[default]
    Original,
    /// Under the derived-output root, mirroring the served tree
    Temporary,
}

impl Destination {
    /// Whether derived files may be written inside the served tree
    pub fn writes_into_source_tree(&self) -> bool {
        matches!(self, Self::Original)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => write!(f, "original"),
            Self::Temporary => write!(f, "temporary"),
        }
    }
}

/// Decomposed startup mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupMode {
    /// Output destination
    pub destination: Destination,

    /// Echo ffmpeg/ffprobe diagnostics into the log
    pub tool_log: bool,

    /// Read audio tags and cover metadata
    pub tag_extraction: bool,
}

impl StartupMode {
    /// Build a mode from its numeric form (1-8)
    pub fn from_number(number: u8) -> Option<Self> {
        let destination = match number {
            1..=4 => Destination::Original,
            5..=8 => Destination::Temporary,
            _ => return None,
        };
        Self::from_level(destination, (number - 1) % 4 + 1)
    }

    /// Build a mode from a destination and its level (1-4)
    pub fn from_level(destination: Destination, level: u8) -> Option<Self> {
        let (tool_log, tag_extraction) = match level {
            1 => (false, false),
            2 => (false, true),
            3 => (true, false),
            4 => (true, true),
            _ => return None,
        };
        Some(Self {
            destination,
            tool_log,
            tag_extraction,
        })
    }

    /// Level within the destination (1-4)
    pub fn level(&self) -> u8 {
        match (self.tool_log, self.tag_extraction) {
            (false, false) => 1,
            (false, true) => 2,
            (true, false) => 3,
            (true, true) => 4,
        }
    }

    /// Numeric form (1-8)
    pub fn number(&self) -> u8 {
        match self.destination {
            Destination::Original => self.level(),
            Destination::Temporary => self.level() + 4,
        }
    }

    /// Parse any accepted spelling of a mode
    pub fn parse(input: &str) -> WebMediaResult<Self> {
        let key = input.trim().to_ascii_lowercase();

        if let Ok(number) = key.parse::<u8>() {
            return Self::from_number(number).ok_or(WebMediaError::UnknownMode(key));
        }

        if let Some((dest, level)) = key.split_once('-') {
            let destination = match dest {
                "original" => Some(Destination::Original),
                "temporary" => Some(Destination::Temporary),
                _ => None,
            };
            let level = level.parse::<u8>().ok();
            if let (Some(destination), Some(level)) = (destination, level) {
                return Self::from_level(destination, level).ok_or(WebMediaError::UnknownMode(key));
            }
        }

        Self::from_legacy_key(&key).ok_or(WebMediaError::UnknownMode(key))
    }

    /// Legacy underscore keys (`copytotemp_ffmpeglog_meta` and friends)
    fn from_legacy_key(key: &str) -> Option<Self> {
        let (destination, rest) = if let Some(rest) = key.strip_prefix("nocopytotemp") {
            (Destination::Original, rest)
        } else if let Some(rest) = key.strip_prefix("copytotemp") {
            (Destination::Temporary, rest)
        } else if key == "ffmpeglog" {
            (Destination::Original, "_ffmpeglog")
        } else {
            return None;
        };

        let level = match rest {
            "" => 1,
            "_meta" => 2,
            "_ffmpeglog" | "_ffmpeg" => 3,
            "_ffmpeglog_meta" => 4,
            _ => return None,
        };
        Self::from_level(destination, level)
    }

    /// One-line description for startup banners
    pub fn describe(&self) -> String {
        let serving = match self.destination {
            Destination::Original => "derived files are written next to the originals",
            Destination::Temporary => "derived files are written to the temporary mirror",
        };
        format!(
            "mode {} ({}; tool log {}; tag extraction {})",
            self.number(),
            serving,
            on_off(self.tool_log),
            on_off(self.tag_extraction)
        )
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

impl FromStr for StartupMode {
    type Err = WebMediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StartupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.destination, self.level())
    }
}
