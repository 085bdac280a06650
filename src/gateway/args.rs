//! Fixed ffmpeg argument templates, one per derivation kind

use super::Job;
use crate::derivation::{AudioProfile, DerivationKind, VideoProfile};
use crate::error::GatewayError;
use crate::media::MediaClass;
use std::ffi::OsString;

/// Frame rate ceiling for transcoded video
pub const MAX_FPS: f64 = 30.0;

/// Bounding box for transcoded video: landscape width, portrait height
const VIDEO_LANDSCAPE_WIDTH: u32 = 1024;
const VIDEO_PORTRAIT_HEIGHT: u32 = 768;

/// Accumulates arguments without ever going through a shell
struct ArgList(Vec<OsString>);

impl ArgList {
    fn new(tool_log: bool) -> Self {
        let level = if tool_log { "info" } else { "error" };
        let mut list = Self(Vec::with_capacity(40));
        list.push_all(&["-hide_banner", "-nostdin", "-loglevel", level, "-y"]);
        list
    }

    fn push(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.0.push(arg.into());
        self
    }

    fn push_all(&mut self, args: &[&str]) -> &mut Self {
        self.0.extend(args.iter().map(OsString::from));
        self
    }

    fn input(&mut self, job: &Job) -> &mut Self {
        self.push("-i").push(job.source.path.clone().into_os_string())
    }

    fn output(&mut self, format: &str, job: &Job) -> Vec<OsString> {
        self.push_all(&["-f", format]);
        self.push(job.output.clone().into_os_string());
        std::mem::take(&mut self.0)
    }
}

/// Scale filter bounding both edges by `edge` without upscaling
fn bounded_scale(edge: u32) -> String {
    format!(
        "scale=w='min({edge},iw)':h='min({edge},ih)':force_original_aspect_ratio=decrease"
    )
}

/// Build the argument list for a derivation
pub fn build_args(
    kind: DerivationKind,
    job: &Job,
    tool_log: bool,
) -> Result<Vec<OsString>, GatewayError> {
    let mut args = ArgList::new(tool_log);

    match kind {
        DerivationKind::ThumbnailJpeg(edge) => {
            let upright = job.orientation.and_then(|o| o.filter());
            if upright.is_some() {
                args.push("-noautorotate");
            }
            args.input(job);

            let scale = bounded_scale(edge);
            let filter = match upright {
                Some(rotate) => format!("{rotate},{scale}"),
                None => scale,
            };
            if job.source.class == MediaClass::Audio {
                // cover art is the attached picture stream
                args.push_all(&["-map", "0:v:0", "-an"]);
            }
            args.push("-vf")
                .push(filter)
                .push_all(&["-frames:v", "1", "-q:v", "5", "-pix_fmt", "yuvj420p"]);
            Ok(args.output("mjpeg", job))
        }

        DerivationKind::FullJpeg(edge) => {
            let scale = bounded_scale(edge);
            let filter = match job.orientation.and_then(|o| o.filter()) {
                Some(rotate) => {
                    args.push("-noautorotate");
                    format!("{rotate},{scale}")
                }
                None => scale,
            };
            args.input(job)
                .push("-vf")
                .push(filter)
                .push_all(&["-frames:v", "1", "-q:v", "2", "-pix_fmt", "yuvj420p"]);
            Ok(args.output("mjpeg", job))
        }

        DerivationKind::Rotate(orientation) => {
            let filter = orientation
                .filter()
                .ok_or_else(|| GatewayError::NoTemplate(kind.tag()))?;
            args.push("-noautorotate")
                .input(job)
                .push("-vf")
                .push(filter)
                .push_all(&["-frames:v", "1", "-q:v", "2", "-pix_fmt", "yuvj420p"]);
            Ok(args.output("mjpeg", job))
        }

        DerivationKind::TranscodeMp4(VideoProfile::Baseline) => {
            let video = job.info.as_ref().and_then(|i| i.video.as_ref());
            let landscape = video.map(|v| v.width >= v.height).unwrap_or(true);
            let scale = if landscape {
                format!("scale={VIDEO_LANDSCAPE_WIDTH}:-2")
            } else {
                format!("scale=-2:{VIDEO_PORTRAIT_HEIGHT}")
            };

            args.push("-noautorotate")
                .input(job)
                .push_all(&["-map", "0:v:0", "-map", "0:a:0?"])
                .push("-vf")
                .push(scale);
            if video.and_then(|v| v.fps).is_some_and(|fps| fps > MAX_FPS) {
                args.push_all(&["-r", "30"]);
            }
            args.push_all(&[
                "-c:v", "libx264", "-profile:v", "baseline", "-level", "3.0",
                "-pix_fmt", "yuv420p", "-b:v", "4000k", "-maxrate", "4500k",
                "-bufsize", "9000k", "-c:a", "aac", "-b:a", "320k", "-ar", "48000",
                "-movflags", "+faststart",
            ]);
            Ok(args.output("mp4", job))
        }

        DerivationKind::TranscodeAudio(AudioProfile::Aac) => {
            args.input(job).push_all(&[
                "-map", "0:a:0", "-vn", "-c:a", "aac", "-b:a", "320k", "-ar", "48000",
                "-movflags", "+faststart",
            ]);
            Ok(args.output("ipod", job))
        }

        DerivationKind::Passthrough | DerivationKind::TagExtract => {
            Err(GatewayError::NoTemplate(kind.tag()))
        }
    }
}
