//! Cache command - inspect or clean derived artifacts

use crate::cache::{Layout, Manifest, ManifestRecord};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::cli::commands::serve::served_root;
use crate::cli::display::human_size;
use crate::config::{Config, ConfigManager};
use crate::error::{WebMediaError, WebMediaResult};
use crate::gateway::Toolchain;
use crate::orchestrator::{Orchestrator, WarmReport};
use console::style;
use serde::Serialize;
use std::path::PathBuf;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> WebMediaResult<()> {
    let layout = Layout::new(config.mode.destination, ConfigManager::derived_root(config));
    let manifest = Manifest::new(layout.manifest_dir());

    match args.action {
        CacheAction::List { format } => list_artifacts(&manifest, format).await,
        CacheAction::Sweep => sweep(&manifest).await,
        CacheAction::Warm { root, format } => warm(root, format, config).await,
        CacheAction::Clear { yes } => clear(&manifest, yes).await,
    }
}

async fn list_artifacts(manifest: &Manifest, format: OutputFormat) -> WebMediaResult<()> {
    let records = manifest.list().await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table if records.is_empty() => println!("No derived artifacts recorded."),
        OutputFormat::Table => print_table(&records),
    }
    Ok(())
}

fn print_table(records: &[ManifestRecord]) {
    println!("{:<40} {:<14} {:>10} {:<17}", "SOURCE", "KIND", "SIZE", "CREATED");
    println!("{}", "-".repeat(84));

    let mut total = 0;
    for record in records {
        total += record.size;
        let kind = record.key.kind.tag();
        println!(
            "{:<40} {:<14} {:>10} {:<17}",
            truncate(&record.key.rel, 40),
            style(kind).cyan(),
            human_size(record.size),
            record.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("Total: {} artifact(s), {}", records.len(), human_size(total));
}

fn print_json(records: &[ManifestRecord]) -> WebMediaResult<()> {
    #[derive(Serialize)]
    struct ArtifactJson<'a> {
        source: &'a std::path::Path,
        kind: String,
        output: &'a std::path::Path,
        size: u64,
        created_at: String,
    }

    let rows: Vec<ArtifactJson<'_>> = records
        .iter()
        .map(|r| ArtifactJson {
            source: &r.key.source,
            kind: r.key.kind.tag(),
            output: &r.output,
            size: r.size,
            created_at: r.created_at.to_rfc3339(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn sweep(manifest: &Manifest) -> WebMediaResult<()> {
    let report = manifest.prune().await?;
    if report.total() == 0 {
        println!("{} Nothing to sweep", style("✓").green());
        return Ok(());
    }
    println!(
        "{} Removed {} artifact(s): {} vanished, {} stale, {} missing ({} freed)",
        style("✓").green(),
        report.total(),
        report.vanished,
        report.stale,
        report.missing,
        human_size(report.bytes_freed)
    );
    Ok(())
}

async fn warm(root: Option<PathBuf>, format: OutputFormat, config: &Config) -> WebMediaResult<()> {
    let root = served_root(root, config)?;
    let toolchain = Toolchain::from_config(config);
    if toolchain.tools.ffmpeg.is_none() {
        return Err(WebMediaError::User(
            "ffmpeg was not found; thumbnails cannot be warmed".to_string(),
        ));
    }

    let orchestrator = Orchestrator::from_config(config, &root, &toolchain)?;
    let report = orchestrator.warm(config.derive.worker_count()).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_warm(&report),
    }
    Ok(())
}

fn print_warm(report: &WarmReport) {
    if report.eligible == 0 {
        println!("{} Nothing to warm", style("✓").green());
        return;
    }
    println!(
        "{} Warmed {} of {} file(s)",
        style("✓").green(),
        report.derived,
        report.eligible
    );
    if report.skipped > 0 {
        println!("  {} without a thumbnail", report.skipped);
    }
    if report.fallback + report.failed > 0 {
        println!(
            "  {} {} failed, see the log for details",
            style("!").yellow(),
            report.fallback + report.failed
        );
    }
}

async fn clear(manifest: &Manifest, yes: bool) -> WebMediaResult<()> {
    if !yes {
        return Err(WebMediaError::User(
            "Refusing to delete every derived artifact without --yes".to_string(),
        ));
    }
    let (count, freed) = manifest.clear().await?;
    println!(
        "{} Removed {} artifact(s), {} freed",
        style("✓").green(),
        count,
        human_size(freed)
    );
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let tail: String = s.chars().rev().take(width - 3).collect::<Vec<_>>().into_iter().rev().collect();
    format!("...{tail}")
}
