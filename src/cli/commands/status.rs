//! Status command - report tool resolution and the effective mode

use crate::cache::Layout;
use crate::cli::display::human_size;
use crate::config::{Config, ConfigManager};
use crate::error::WebMediaResult;
use crate::tools::{ResolvedTool, ToolPaths};
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");

/// Execute the status command
pub async fn execute(config: &Config, manager: &ConfigManager) -> WebMediaResult<()> {
    println!("{}", style("webmedia status").bold().cyan());
    println!();

    let bundled = config
        .paths
        .bundled_tools
        .clone()
        .or_else(ConfigManager::default_bundled_tools);
    let tools = ToolPaths::resolve(bundled.as_deref());

    println!("{}", style("Tools:").bold());
    print_tool("ffmpeg", tools.ffmpeg.as_ref(), "thumbnails and transcodes");
    print_tool("ffprobe", tools.ffprobe.as_ref(), "media traits and tags");
    if let Some(dir) = &bundled {
        println!("  Bundled directory: {}", dir.display());
    }

    println!();
    println!("{}", style("Mode:").bold());
    println!("  {}", config.mode.describe());

    let derived_root = ConfigManager::derived_root(config);
    let layout = Layout::new(config.mode.destination, derived_root.clone());
    let records = layout_records(&layout).await;

    println!();
    println!("{}", style("Paths:").bold());
    println!("  Config:       {}", manager.path().display());
    println!("  Derived root: {}", derived_root.display());
    println!("  Artifacts:    {}", records);

    println!();
    if tools.is_degraded() {
        println!(
            "{}",
            style("No tools found - the server will only serve originals")
                .yellow()
                .bold()
        );
    } else {
        println!("{}", style("Ready to serve").green().bold());
    }

    Ok(())
}

fn print_tool(name: &str, tool: Option<&ResolvedTool>, needed_for: &str) {
    match tool {
        Some(tool) => println!(
            "  {} {} {} ({})",
            CHECK,
            style(name).green(),
            tool.path.display(),
            tool.origin
        ),
        None => println!(
            "  {} {} - not found, no {}",
            CROSS,
            style(name).red(),
            needed_for
        ),
    }
}

async fn layout_records(layout: &Layout) -> String {
    let manifest = crate::cache::Manifest::new(layout.manifest_dir());
    match manifest.list().await {
        Ok(records) => {
            let bytes: u64 = records.iter().map(|r| r.size).sum();
            format!("{} ({})", records.len(), human_size(bytes))
        }
        Err(e) => format!("unreadable ({e})"),
    }
}
