//! ffprobe-backed prober

use super::{AudioStream, MediaInfo, Prober, TagSet, VideoStream};
use crate::error::ProbeError;
use crate::media::SourceFile;
use crate::tools::process::{run_tool, RunError};
use crate::tools::ToolPaths;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs `ffprobe -print_format json -show_format -show_streams`
pub struct FfprobeProber {
    tools: Arc<ToolPaths>,
    timeout: Duration,
    tool_log: bool,
}

impl FfprobeProber {
    pub fn new(tools: Arc<ToolPaths>, timeout: Duration, tool_log: bool) -> Self {
        Self {
            tools,
            timeout,
            tool_log,
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, source: &SourceFile) -> Result<MediaInfo, ProbeError> {
        if !source.class.is_media() {
            return Err(ProbeError::Unsupported(source.path.clone()));
        }
        let ffprobe = self.tools.ffprobe().ok_or(ProbeError::ToolUnavailable)?;

        let args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-v".into(),
            "error".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            source.path.clone().into_os_string(),
        ];

        let output = run_tool(ffprobe, &args, self.timeout, self.tool_log)
            .await
            .map_err(|e| match e {
                RunError::TimedOut => ProbeError::Timeout(self.timeout),
                RunError::Spawn(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    ProbeError::ToolUnavailable
                }
                RunError::Spawn(e) => ProbeError::ToolFailed {
                    code: None,
                    tail: e.to_string(),
                },
            })?;

        if !output.success {
            warn!(
                "ffprobe failed on {} (code {:?}):\n{}",
                source.rel, output.code, output.tail
            );
            return Err(ProbeError::ToolFailed {
                code: output.code,
                tail: output.tail,
            });
        }

        let info = parse_ffprobe_json(&output.stdout)?;
        debug!(
            "Probed {}: container={:?} video={:?} audio={:?}",
            source.rel,
            info.container,
            info.video.as_ref().and_then(|v| v.codec.as_deref()),
            info.audio.as_ref().and_then(|a| a.codec.as_deref())
        );
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    #[serde(default)]
    disposition: Disposition,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Default, Deserialize)]
struct Disposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

impl FfprobeStream {
    fn is_type(&self, kind: &str) -> bool {
        self.codec_type.as_deref() == Some(kind)
    }

    fn is_attached_pic(&self) -> bool {
        self.disposition.attached_pic == 1
    }

    fn fps(&self) -> Option<f64> {
        [&self.avg_frame_rate, &self.r_frame_rate]
            .into_iter()
            .flatten()
            .find_map(|rate| parse_rate(rate))
    }

    fn rotation(&self) -> Option<i32> {
        self.side_data_list
            .iter()
            .find_map(|sd| sd.rotation)
            .map(|r| r.round() as i32)
            .or_else(|| self.tags.get("rotate").and_then(|r| r.trim().parse().ok()))
    }
}

/// Parse "30000/1001" or "25"; zero denominators and zero rates are unknown
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value > 0.0).then_some(value)
}

/// Parse the JSON document ffprobe prints
pub fn parse_ffprobe_json(bytes: &[u8]) -> Result<MediaInfo, ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_slice(bytes)
        .map_err(|e| ProbeError::MalformedOutput(e.to_string()))?;

    if parsed.format.is_none() && parsed.streams.is_empty() {
        return Err(ProbeError::MalformedOutput(
            "neither format nor streams reported".to_string(),
        ));
    }

    let video = parsed
        .streams
        .iter()
        .find(|s| s.is_type("video") && !s.is_attached_pic())
        .map(|s| VideoStream {
            codec: s.codec_name.clone(),
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            fps: s.fps(),
            rotation: s.rotation(),
        });

    let audio_stream = parsed.streams.iter().find(|s| s.is_type("audio"));
    let audio = audio_stream.map(|s| AudioStream {
        codec: s.codec_name.clone(),
        sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
        channels: s.channels,
    });

    let has_cover_art = parsed
        .streams
        .iter()
        .any(|s| s.is_type("video") && s.is_attached_pic());

    // Containers like Ogg and FLAC keep tags on the stream rather than the format
    let mut raw_tags = normalize_tags(
        parsed
            .format
            .as_ref()
            .map(|f| &f.tags)
            .into_iter()
            .flatten(),
    );
    if let Some(stream) = audio_stream {
        for (key, value) in normalize_tags(stream.tags.iter()) {
            raw_tags.entry(key).or_insert(value);
        }
    }

    let format = parsed.format.as_ref();
    Ok(MediaInfo {
        container: format.and_then(|f| f.format_name.clone()),
        duration: format
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse().ok()),
        video,
        audio,
        has_cover_art,
        tags: tag_set(&raw_tags),
    })
}

fn normalize_tags<'a>(tags: impl Iterator<Item = (&'a String, &'a String)>) -> HashMap<String, String> {
    tags.filter_map(|(key, value)| {
        let value = value.trim();
        (!value.is_empty()).then(|| (key.to_lowercase(), value.to_string()))
    })
    .collect()
}

fn tag_set(tags: &HashMap<String, String>) -> TagSet {
    let first = |keys: &[&str]| keys.iter().find_map(|k| tags.get(*k).cloned());
    TagSet {
        title: first(&["title"]),
        artist: first(&["artist", "album_artist", "album artist"]),
        album: first(&["album"]),
        album_artist: first(&["album_artist", "album artist"]),
        track: first(&["track", "tracknumber"]),
        genre: first(&["genre"]),
        date: first(&["date", "year"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaClass;
    use std::path::PathBuf;

    const MP3_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "mp3", "codec_type": "audio",
             "sample_rate": "44100", "channels": 2,
             "disposition": {"default": 0, "attached_pic": 0}},
            {"index": 1, "codec_name": "mjpeg", "codec_type": "video",
             "width": 500, "height": 500, "r_frame_rate": "90000/1",
             "disposition": {"default": 0, "attached_pic": 1}}
        ],
        "format": {
            "filename": "song.mp3", "format_name": "mp3", "duration": "215.3",
            "tags": {"TITLE": "Blue Train", "Album_Artist": "John Coltrane",
                     "album": "Blue Train", "YEAR": "1957", "genre": "  ",
                     "TRACKNUMBER": "1"}
        }
    }"#;

    #[test]
    fn parses_audio_with_cover_art() {
        let info = parse_ffprobe_json(MP3_JSON.as_bytes()).unwrap();

        assert_eq!(info.container.as_deref(), Some("mp3"));
        assert_eq!(info.duration, Some(215.3));
        assert!(info.video.is_none());
        assert!(info.has_cover_art);

        let audio = info.audio.unwrap();
        assert_eq!(audio.codec.as_deref(), Some("mp3"));
        assert_eq!(audio.sample_rate, Some(44100));

        assert_eq!(info.tags.title.as_deref(), Some("Blue Train"));
        assert_eq!(info.tags.artist.as_deref(), Some("John Coltrane"));
        assert_eq!(info.tags.album_artist.as_deref(), Some("John Coltrane"));
        assert_eq!(info.tags.date.as_deref(), Some("1957"));
        assert_eq!(info.tags.track.as_deref(), Some("1"));
        assert_eq!(info.tags.genre, None);
    }

    #[test]
    fn parses_rotated_video() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "hevc", "width": 1920, "height": 1080,
                 "avg_frame_rate": "60000/1001",
                 "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.5"}
        }"#;

        let info = parse_ffprobe_json(json.as_bytes()).unwrap();
        let video = info.video.unwrap();
        assert_eq!(video.codec.as_deref(), Some("hevc"));
        assert_eq!(video.rotation, Some(-90));
        assert!((video.fps.unwrap() - 59.94).abs() < 0.01);
        assert!(!info.has_cover_art);
    }

    #[test]
    fn legacy_rotate_tag_and_stream_tags() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 640, "height": 480,
                 "r_frame_rate": "0/0", "tags": {"rotate": "180"}},
                {"codec_type": "audio", "codec_name": "vorbis",
                 "tags": {"ARTIST": "Stream Artist", "TITLE": "Stream Title"}}
            ],
            "format": {"format_name": "ogg", "tags": {"title": "Format Title"}}
        }"#;

        let info = parse_ffprobe_json(json.as_bytes()).unwrap();
        let video = info.video.unwrap();
        assert_eq!(video.rotation, Some(180));
        assert_eq!(video.fps, None);
        assert_eq!(info.tags.title.as_deref(), Some("Format Title"));
        assert_eq!(info.tags.artist.as_deref(), Some("Stream Artist"));
    }

    #[test]
    fn malformed_output() {
        assert!(matches!(
            parse_ffprobe_json(b"not json"),
            Err(ProbeError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_ffprobe_json(b"{}"),
            Err(ProbeError::MalformedOutput(_))
        ));
    }

    #[test]
    fn rates() {
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[tokio::test]
    async fn non_media_is_unsupported_without_tool() {
        let prober = FfprobeProber::new(
            Arc::new(ToolPaths::explicit(None, None)),
            Duration::from_secs(1),
            false,
        );
        let source = SourceFile {
            path: PathBuf::from("/srv/notes.txt"),
            rel: "notes.txt".into(),
            stamp: crate::media::SourceStamp {
                size: 1,
                modified: chrono::Utc::now(),
            },
            class: MediaClass::Other,
        };
        assert_eq!(
            prober.probe(&source).await,
            Err(ProbeError::Unsupported(PathBuf::from("/srv/notes.txt")))
        );

        let song = SourceFile {
            class: MediaClass::Audio,
            ..source
        };
        assert_eq!(prober.probe(&song).await, Err(ProbeError::ToolUnavailable));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_stand_in_ffprobe() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let json_path = dir.path().join("out.json");
        std::fs::write(&json_path, MP3_JSON).unwrap();
        let tool = dir.path().join("ffprobe");
        std::fs::write(&tool, format!("#!/bin/sh\ncat '{}'\n", json_path.display())).unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let song_path = dir.path().join("song.mp3");
        std::fs::write(&song_path, b"ID3").unwrap();
        let song = SourceFile::snapshot(song_path, "song.mp3".into()).await.unwrap();

        let prober = FfprobeProber::new(
            Arc::new(ToolPaths::explicit(None, Some(tool))),
            Duration::from_secs(5),
            false,
        );
        let info = prober.probe(&song).await.unwrap();
        assert_eq!(info.tags.album.as_deref(), Some("Blue Train"));
    }
}
