//! webmedia - CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use webmedia::cli::{Cli, Commands};
use webmedia::config::{Config, ConfigManager};
use webmedia::error::WebMediaResult;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> WebMediaResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &cli.command, &config);

    match cli.command {
        Commands::Serve(args) => webmedia::cli::commands::serve(args, &config).await,
        Commands::Probe(args) => webmedia::cli::commands::probe(args, &config).await,
        Commands::Status => webmedia::cli::commands::status(&config, &config_manager).await,
        Commands::Config(args) => {
            webmedia::cli::commands::config(args, &config, &config_manager).await
        }
        Commands::Cache(args) => webmedia::cli::commands::cache(args, &config).await,
    }
}

/// 0 = warn (info while serving), 1 = info, 2+ = debug; RUST_LOG wins
fn init_logging(verbose: u8, command: &Commands, config: &Config) {
    let serving = matches!(command, Commands::Serve(_));
    let level = match (verbose, serving || config.general.verbose) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("webmedia={level},tower_http={level}"))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}
