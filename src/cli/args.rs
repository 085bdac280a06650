//! CLI argument definitions using clap derive

use crate::config::StartupMode;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// webmedia - serve a directory of media over HTTP
///
/// Thumbnails, upright images and browser-friendly audio and video are
/// derived on demand with ffmpeg and cached.
#[derive(Parser, Debug)]
#[command(name = "webmedia")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "WEBMEDIA_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a directory over HTTP
    Serve(ServeArgs),

    /// Print what ffprobe reports for a file
    Probe(ProbeArgs),

    /// Report tool resolution and the effective mode
    Status,

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Inspect or clean derived artifacts
    Cache(CacheArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    /// Directory to serve (defaults to server.root, then the current directory)
    pub root: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Startup mode: 1-8, original-N, temporary-N or a legacy key
    #[arg(short, long, value_parser = parse_mode)]
    pub mode: Option<StartupMode>,

    /// Where derived files go in temporary mode
    #[arg(long)]
    pub derived_root: Option<PathBuf>,

    /// Directory holding bundled ffmpeg and ffprobe
    #[arg(long)]
    pub tools_dir: Option<PathBuf>,

    /// Pre-derive thumbnails in the background after startup
    #[arg(long)]
    pub warm: bool,
}

/// Arguments for the probe command
#[derive(Parser, Debug)]
pub struct ProbeArgs {
    /// File to inspect
    pub file: PathBuf,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List recorded artifacts
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove artifacts whose source changed or disappeared
    Sweep,

    /// Derive thumbnails for a tree ahead of serving it, smallest files first
    Warm {
        /// Directory to warm (defaults to server.root, then the current directory)
        root: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove every recorded artifact
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

fn parse_mode(s: &str) -> Result<StartupMode, String> {
    StartupMode::parse(s).map_err(|e| e.to_string())
}
