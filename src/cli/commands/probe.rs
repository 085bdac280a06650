//! Probe command - show what the pipeline learns about a file

use crate::cli::args::ProbeArgs;
use crate::config::Config;
use crate::error::{WebMediaError, WebMediaResult};
use crate::gateway::Toolchain;
use crate::media::{self, MediaClass, Orientation, SourceFile};
use crate::probe::MediaInfo;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct ProbeReport {
    path: PathBuf,
    class: MediaClass,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    orientation: Option<Orientation>,
    info: MediaInfo,
}

/// Execute the probe command
pub async fn execute(args: ProbeArgs, config: &Config) -> WebMediaResult<()> {
    let path = args
        .file
        .canonicalize()
        .map_err(|e| WebMediaError::io(format!("opening {}", args.file.display()), e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let source = SourceFile::snapshot(path.clone(), name)
        .await
        .map_err(|e| WebMediaError::io(format!("reading {}", path.display()), e))?;

    let orientation = if source.class == MediaClass::Image {
        let path = path.clone();
        tokio::task::spawn_blocking(move || media::read_orientation(&path))
            .await
            .ok()
            .flatten()
    } else {
        None
    };

    let toolchain = Toolchain::from_config(config);
    let info = toolchain.prober.probe(&source).await?;

    let report = ProbeReport {
        path,
        class: source.class,
        size: source.stamp.size,
        orientation,
        info,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
