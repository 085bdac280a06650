//! Extension and magic-byte classification

use super::{extension_of, MediaClass};
use std::path::Path;
use tokio::io::AsyncReadExt;

const IMAGE_EXT: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];
const VIDEO_EXT: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "wmv", "flv", "webm"];
const AUDIO_EXT: &[&str] = &["mp3", "wav", "flac", "ogg", "oga", "opus", "aac", "m4a", "wma"];

/// Bytes read from the head of a file for sniffing
const MAGIC_LEN: usize = 16;

/// Classify by extension only
pub fn classify_by_extension(path: &Path) -> Option<MediaClass> {
    let ext = extension_of(path)?;
    let ext = ext.as_str();
    if IMAGE_EXT.contains(&ext) {
        Some(MediaClass::Image)
    } else if VIDEO_EXT.contains(&ext) {
        Some(MediaClass::Video)
    } else if AUDIO_EXT.contains(&ext) {
        Some(MediaClass::Audio)
    } else {
        None
    }
}

/// Classify by the leading bytes of a file
pub fn classify_by_magic(head: &[u8]) -> Option<MediaClass> {
    let starts = |sig: &[u8]| head.starts_with(sig);

    if starts(&[0xFF, 0xD8, 0xFF])
        || starts(b"\x89PNG\r\n\x1a\n")
        || starts(b"GIF87a")
        || starts(b"GIF89a")
        || starts(b"BM")
        || starts(b"II*\0")
        || starts(b"MM\0*")
    {
        return Some(MediaClass::Image);
    }

    if head.len() >= 12 && starts(b"RIFF") {
        return match &head[8..12] {
            b"WEBP" => Some(MediaClass::Image),
            b"WAVE" => Some(MediaClass::Audio),
            b"AVI " => Some(MediaClass::Video),
            _ => None,
        };
    }

    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return match &head[8..12] {
            b"M4A " | b"M4B " => Some(MediaClass::Audio),
            _ => Some(MediaClass::Video),
        };
    }

    if starts(&[0x1A, 0x45, 0xDF, 0xA3]) || starts(b"FLV") {
        return Some(MediaClass::Video);
    }

    if starts(b"ID3")
        || starts(b"fLaC")
        || starts(b"OggS")
        || starts(&[0xFF, 0xFB])
        || starts(&[0xFF, 0xF3])
        || starts(&[0xFF, 0xF2])
        || starts(&[0xFF, 0xF1])
        || starts(&[0xFF, 0xF9])
    {
        return Some(MediaClass::Audio);
    }

    None
}

/// Classify a file, sniffing its contents when the extension is unknown
pub async fn classify(path: &Path) -> MediaClass {
    if let Some(class) = classify_by_extension(path) {
        return class;
    }

    let mut head = [0u8; MAGIC_LEN];
    let read = match tokio::fs::File::open(path).await {
        Ok(mut file) => read_head(&mut file, &mut head).await,
        Err(_) => 0,
    };

    classify_by_magic(&head[..read]).unwrap_or(MediaClass::Other)
}

async fn read_head(file: &mut tokio::fs::File, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    filled
}

/// Content type for serving a file, by extension
pub fn content_type_for(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("mp4") => "video/mp4",
        Some("mov") | Some("m4v") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("oga") | Some("opus") => "audio/ogg",
        Some("aac") | Some("m4a") => "audio/mp4",
        Some("wma") => "audio/x-ms-wma",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
