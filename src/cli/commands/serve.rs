//! Serve command - run the HTTP server

use crate::cli::args::ServeArgs;
use crate::config::{Config, ConfigManager, Destination};
use crate::error::{WebMediaError, WebMediaResult};
use crate::gateway::Toolchain;
use crate::orchestrator::Orchestrator;
use crate::server::{shutdown_signal, Server};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> WebMediaResult<()> {
    let warm = args.warm;
    let (config, root) = effective(args, config)?;

    let toolchain = Toolchain::from_config(&config);
    let orchestrator = Arc::new(Orchestrator::from_config(&config, &root, &toolchain)?);
    let layout = orchestrator.cache().layout().clone();

    println!("{}", style("webmedia").bold().cyan());
    println!("  Serving:  {}", orchestrator.root().display());
    println!("  Mode:     {}", config.mode.describe());
    if layout.destination() == Destination::Temporary {
        println!("  Derived:  {}", layout.mirror_root().display());
    }
    if layout.writes_under(orchestrator.root()) {
        println!(
            "  {} derived files are written into the served tree",
            style("Note:").yellow()
        );
    }
    if toolchain.tools.is_degraded() {
        println!(
            "  {} ffmpeg/ffprobe not found, serving originals only",
            style("Warning:").yellow().bold()
        );
    }

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let server = Server::bind(&addr, orchestrator.clone())
        .await?
        .with_sweep_interval(config.cache.sweep_interval_secs);
    println!("  Address:  http://{}", server.local_addr()?);
    println!();

    if warm {
        let concurrency = config.derive.worker_count();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.warm(concurrency).await {
                warn!("Thumbnail warm-up stopped: {}", e);
            }
        });
    }

    server.run(shutdown_signal()).await
}

/// Apply command-line overrides and pick the served root
fn effective(args: ServeArgs, config: &Config) -> WebMediaResult<(Config, PathBuf)> {
    let mut config = config.clone();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(derived_root) = args.derived_root {
        config.paths.derived_root = Some(derived_root);
    }
    if let Some(tools_dir) = args.tools_dir {
        config.paths.bundled_tools = Some(tools_dir);
    }

    let root = served_root(args.root, &config)?;

    // relative derived roots resolve against the working directory
    if let Some(derived) = &config.paths.derived_root {
        if derived.is_relative() {
            let cwd = std::env::current_dir()
                .map_err(|e| WebMediaError::io("getting current directory", e))?;
            config.paths.derived_root = Some(cwd.join(derived));
        }
    } else {
        config.paths.derived_root = Some(ConfigManager::derived_root(&config));
    }

    Ok((config, root))
}

/// The argument, then `server.root`, then the working directory
pub(crate) fn served_root(arg: Option<PathBuf>, config: &Config) -> WebMediaResult<PathBuf> {
    let root = match arg.or_else(|| config.server.root.clone()) {
        Some(root) => root,
        None => std::env::current_dir()
            .map_err(|e| WebMediaError::io("getting current directory", e))?,
    };
    if !root.is_dir() {
        return Err(WebMediaError::RootNotDirectory(root));
    }
    Ok(root)
}
