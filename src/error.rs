//! Error types for webmedia
//!
//! Application-level operations return `WebMediaResult<T>`. The derivation
//! pipeline has its own containment chain so that a single outcome can be
//! cloned out to every request waiting on the same artifact:
//!
//! `ProbeError` / `GatewayError` ⊂ `DerivationError` ⊂ `CacheError` ⊂ `OrchestratorError`

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for webmedia operations
pub type WebMediaResult<T> = Result<T, WebMediaError>;

/// Errors surfaced by the CLI, configuration and server startup
#[derive(Error, Debug)]
pub enum WebMediaError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown startup mode: {0}")]
    UnknownMode(String),

    #[error("Served root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    // Server errors
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // Pipeline errors surfaced to the CLI
    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Derived artifact cache error: {0}")]
    Cache(#[from] CacheError),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    User(String),
}

impl WebMediaError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownMode(_) => {
                Some("Use 1-8, original-1..original-4, temporary-1..temporary-4 or a legacy key like copytotemp_meta")
            }
            Self::Probe(ProbeError::ToolUnavailable) => {
                Some("Install ffmpeg or set paths.bundled_tools in the config")
            }
            Self::Bind { .. } => Some("Pick another port with --port"),
            _ => None,
        }
    }
}

/// Errors from inspecting a source file with ffprobe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Not a media file: {0}")]
    Unsupported(PathBuf),

    #[error("ffprobe is not available (neither bundled nor on PATH)")]
    ToolUnavailable,

    #[error("ffprobe timed out after {0:?}")]
    Timeout(Duration),

    #[error("ffprobe exited with code {code:?}: {tail}")]
    ToolFailed { code: Option<i32>, tail: String },

    #[error("Could not parse ffprobe output: {0}")]
    MalformedOutput(String),
}

/// Errors from running ffmpeg for a derivation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{tool} is not available (neither bundled nor on PATH)")]
    ToolUnavailable { tool: &'static str },

    #[error("Failed to start {tool}: {reason}")]
    Spawn { tool: &'static str, reason: String },

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: &'static str, after: Duration },

    #[error("ffmpeg exited with code {code:?}: {tail}")]
    ToolFailed { code: Option<i32>, tail: String },

    #[error("ffmpeg produced no output")]
    EmptyOutput,

    #[error("Derivation kind {0} has no ffmpeg template")]
    NoTemplate(String),
}

/// Anything a cache producer can fail with
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Failed writing derived output: {0}")]
    Write(String),
}

impl DerivationError {
    /// Whether the failure comes from a missing tool rather than the file
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Probe(ProbeError::ToolUnavailable)
                | Self::Gateway(GatewayError::ToolUnavailable { .. })
        )
    }
}

/// Errors from the derived artifact cache
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Derivation failed: {0}")]
    ProducerFailed(#[from] DerivationError),

    #[error("Cache IO error: {context}: {reason}")]
    Io { context: String, reason: String },

    #[error("Source file vanished: {0}")]
    SourceVanished(PathBuf),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            reason: source.to_string(),
        }
    }
}

/// Errors from resolving a request against the served tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Path escapes the served root: {0}")]
    PathEscape(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Nothing to derive for {path} ({reason})")]
    NoDerivation { path: String, reason: &'static str },

    #[error("Derivation unavailable: {0}")]
    DerivationFailed(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(String),
}

impl OrchestratorError {
    /// HTTP status code and stable reason code for this error
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            Self::PathEscape(_) => (403, "path_escape"),
            Self::NotFound(_) => (404, "not_found"),
            Self::NoDerivation { .. } => (404, "no_derivation"),
            Self::DerivationFailed(_) => (502, "derivation_unavailable"),
            Self::Io(_) => (500, "io_error"),
        }
    }
}
