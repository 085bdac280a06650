//! Derivation policy
//!
//! A pure function of file traits, client intent and startup mode. No I/O
//! happens here; the orchestrator gathers traits first.

use crate::config::schema::DeriveConfig;
use crate::config::StartupMode;
use crate::derivation::{AudioProfile, DerivationKind, Intent, VideoProfile};
use crate::media::{MediaClass, Orientation};
use crate::probe::MediaInfo;

/// Image formats every client can display as-is
const DISPLAYABLE_IMAGES: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Containers that play natively
const PLAYABLE_VIDEO_CONTAINERS: &[&str] = &["mp4", "mov"];
const PLAYABLE_VIDEO_CODECS: &[&str] = &["h264"];
const PLAYABLE_AUDIO_IN_VIDEO: &[&str] = &["aac", "mp3"];

/// (codec, container) pairs that play natively as audio
const PLAYABLE_AUDIO: &[(&str, &str)] = &[
    ("mp3", "mp3"),
    ("aac", "mp4"),
    ("aac", "aac"),
    ("pcm_s16le", "wav"),
];

/// What the policy looks at
#[derive(Debug, Clone, Default)]
pub struct MediaTraits {
    pub class: Option<MediaClass>,
    pub extension: Option<String>,
    /// EXIF orientation, images only
    pub orientation: Option<Orientation>,
    /// Probe result, when one was needed and succeeded
    pub info: Option<MediaInfo>,
}

impl MediaTraits {
    pub fn new(class: MediaClass, extension: Option<String>) -> Self {
        Self {
            class: Some(class),
            extension,
            ..Self::default()
        }
    }

    fn class(&self) -> MediaClass {
        self.class.unwrap_or(MediaClass::Other)
    }
}

/// What to do for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationPlan {
    /// Serve the source as-is
    Passthrough,
    /// Serve (and if necessary produce) a derived artifact
    Derive(DerivationKind),
    /// The intent cannot be satisfied for this file
    Unavailable(&'static str),
}

/// Derivation policy for one startup mode
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub mode: StartupMode,
    pub thumbnail_edge: u32,
    pub full_image_edge: u32,
}

impl Policy {
    pub fn new(mode: StartupMode, derive: &DeriveConfig) -> Self {
        Self {
            mode,
            thumbnail_edge: derive.thumbnail_edge,
            full_image_edge: derive.full_image_edge,
        }
    }

    /// Whether `plan` depends on probe output for this class and intent
    pub fn needs_probe(&self, class: MediaClass, intent: Intent) -> bool {
        match intent {
            Intent::Thumbnail => class == MediaClass::Audio && self.mode.tag_extraction,
            Intent::FullView => matches!(class, MediaClass::Audio | MediaClass::Video),
            Intent::TagRead | Intent::Passthrough => false,
        }
    }

    /// Whether a warm-up pass pre-derives thumbnails for this class
    pub fn warms(&self, class: MediaClass) -> bool {
        match class {
            MediaClass::Image => true,
            MediaClass::Audio => self.mode.tag_extraction,
            MediaClass::Video | MediaClass::Other => false,
        }
    }

    /// Whether `plan` depends on EXIF orientation for this class and intent
    pub fn needs_orientation(&self, class: MediaClass, intent: Intent) -> bool {
        class == MediaClass::Image && matches!(intent, Intent::Thumbnail | Intent::FullView)
    }

    /// Decide how to answer `intent` for a file with `traits`
    pub fn plan(&self, traits: &MediaTraits, intent: Intent) -> DerivationPlan {
        let class = traits.class();
        match intent {
            Intent::Passthrough => DerivationPlan::Passthrough,
            Intent::Thumbnail => self.plan_thumbnail(class, traits),
            Intent::FullView => self.plan_full_view(class, traits),
            Intent::TagRead => {
                if class == MediaClass::Audio && self.mode.tag_extraction {
                    DerivationPlan::Derive(DerivationKind::TagExtract)
                } else {
                    DerivationPlan::Passthrough
                }
            }
        }
    }

    fn plan_thumbnail(&self, class: MediaClass, traits: &MediaTraits) -> DerivationPlan {
        let thumbnail = DerivationPlan::Derive(DerivationKind::ThumbnailJpeg(self.thumbnail_edge));
        match class {
            MediaClass::Image | MediaClass::Video => thumbnail,
            // cover art is shown only alongside tags
            MediaClass::Audio if !self.mode.tag_extraction => {
                DerivationPlan::Unavailable("no cover art")
            }
            MediaClass::Audio => {
                if traits.info.as_ref().is_some_and(|i| i.has_cover_art) {
                    thumbnail
                } else {
                    DerivationPlan::Unavailable("no cover art")
                }
            }
            MediaClass::Other => DerivationPlan::Passthrough,
        }
    }

    fn plan_full_view(&self, class: MediaClass, traits: &MediaTraits) -> DerivationPlan {
        match class {
            MediaClass::Image => {
                if let Some(orientation) = traits.orientation.filter(|o| !o.is_upright()) {
                    return DerivationPlan::Derive(DerivationKind::Rotate(orientation));
                }
                let displayable = traits
                    .extension
                    .as_deref()
                    .is_some_and(|ext| DISPLAYABLE_IMAGES.contains(&ext));
                if displayable {
                    DerivationPlan::Passthrough
                } else {
                    DerivationPlan::Derive(DerivationKind::FullJpeg(self.full_image_edge))
                }
            }
            MediaClass::Video => match &traits.info {
                Some(info) if !video_plays_natively(info) => {
                    DerivationPlan::Derive(DerivationKind::TranscodeMp4(VideoProfile::Baseline))
                }
                _ => DerivationPlan::Passthrough,
            },
            MediaClass::Audio => match &traits.info {
                Some(info) if !audio_plays_natively(info) => {
                    DerivationPlan::Derive(DerivationKind::TranscodeAudio(AudioProfile::Aac))
                }
                _ => DerivationPlan::Passthrough,
            },
            MediaClass::Other => DerivationPlan::Passthrough,
        }
    }
}

fn video_plays_natively(info: &MediaInfo) -> bool {
    let Some(video) = &info.video else {
        // audio-only file in a video container
        return info.audio.is_none() || audio_plays_natively(info);
    };
    let codec_ok = video
        .codec
        .as_deref()
        .is_some_and(|c| PLAYABLE_VIDEO_CODECS.contains(&c));
    let audio_ok = info.audio.as_ref().map_or(true, |a| {
        a.codec
            .as_deref()
            .is_some_and(|c| PLAYABLE_AUDIO_IN_VIDEO.contains(&c))
    });
    codec_ok && audio_ok && info.container_is(PLAYABLE_VIDEO_CONTAINERS)
}

fn audio_plays_natively(info: &MediaInfo) -> bool {
    let Some(codec) = info.audio.as_ref().and_then(|a| a.codec.as_deref()) else {
        return false;
    };
    PLAYABLE_AUDIO
        .iter()
        .any(|(c, container)| *c == codec && info.container_is(&[*container]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AudioStream, VideoStream};

    fn policy(mode: u8) -> Policy {
        Policy::new(StartupMode::from_number(mode).unwrap(), &DeriveConfig::default())
    }

    fn image(ext: &str, orientation: Option<Orientation>) -> MediaTraits {
        MediaTraits {
            orientation,
            ..MediaTraits::new(MediaClass::Image, Some(ext.into()))
        }
    }

    fn audio(codec: &str, container: &str, cover: bool) -> MediaTraits {
        MediaTraits {
            info: Some(MediaInfo {
                container: Some(container.into()),
                audio: Some(AudioStream {
                    codec: Some(codec.into()),
                    ..AudioStream::default()
                }),
                has_cover_art: cover,
                ..MediaInfo::default()
            }),
            ..MediaTraits::new(MediaClass::Audio, None)
        }
    }

    fn video(codec: &str, container: &str, audio_codec: Option<&str>) -> MediaTraits {
        MediaTraits {
            info: Some(MediaInfo {
                container: Some(container.into()),
                video: Some(VideoStream {
                    codec: Some(codec.into()),
                    width: 1920,
                    height: 1080,
                    ..VideoStream::default()
                }),
                audio: audio_codec.map(|c| AudioStream {
                    codec: Some(c.into()),
                    ..AudioStream::default()
                }),
                ..MediaInfo::default()
            }),
            ..MediaTraits::new(MediaClass::Video, None)
        }
    }

    #[test]
    fn thumbnails() {
        let p = policy(2);
        let thumb = DerivationPlan::Derive(DerivationKind::ThumbnailJpeg(256));

        assert_eq!(p.plan(&image("jpg", None), Intent::Thumbnail), thumb);
        assert_eq!(
            p.plan(&video("hevc", "matroska,webm", None), Intent::Thumbnail),
            thumb
        );
        assert_eq!(p.plan(&audio("mp3", "mp3", true), Intent::Thumbnail), thumb);
        assert_eq!(
            p.plan(&audio("mp3", "mp3", false), Intent::Thumbnail),
            DerivationPlan::Unavailable("no cover art")
        );
    }

    #[test]
    fn cover_art_follows_tag_extraction() {
        let song = audio("mp3", "mp3", true);
        for mode in [1, 3, 5, 7] {
            assert_eq!(
                policy(mode).plan(&song, Intent::Thumbnail),
                DerivationPlan::Unavailable("no cover art")
            );
            assert!(!policy(mode).needs_probe(MediaClass::Audio, Intent::Thumbnail));
        }
        assert_eq!(
            policy(8).plan(&song, Intent::Thumbnail),
            DerivationPlan::Derive(DerivationKind::ThumbnailJpeg(256))
        );
    }

    #[test]
    fn warm_up_covers_images_and_tagged_audio() {
        assert!(policy(1).warms(MediaClass::Image));
        assert!(!policy(1).warms(MediaClass::Audio));
        assert!(policy(4).warms(MediaClass::Audio));
        assert!(!policy(4).warms(MediaClass::Video));
        assert!(!policy(4).warms(MediaClass::Other));
    }

    #[test]
    fn rotated_photo_is_rotated_on_full_view() {
        let p = policy(1);
        let traits = image("jpg", Some(Orientation::Rotate90));

        let full = p.plan(&traits, Intent::FullView);
        let thumb = p.plan(&traits, Intent::Thumbnail);
        assert_eq!(
            full,
            DerivationPlan::Derive(DerivationKind::Rotate(Orientation::Rotate90))
        );
        assert_ne!(full, thumb);
    }

    #[test]
    fn upright_images() {
        let p = policy(5);
        assert_eq!(
            p.plan(&image("png", Some(Orientation::Normal)), Intent::FullView),
            DerivationPlan::Passthrough
        );
        assert_eq!(
            p.plan(&image("tiff", None), Intent::FullView),
            DerivationPlan::Derive(DerivationKind::FullJpeg(2048))
        );
        assert_eq!(
            p.plan(&image("bmp", None), Intent::FullView),
            DerivationPlan::Derive(DerivationKind::FullJpeg(2048))
        );
    }

    #[test]
    fn video_compatibility() {
        let p = policy(1);
        assert_eq!(
            p.plan(&video("h264", "mov,mp4,m4a,3gp,3g2,mj2", Some("aac")), Intent::FullView),
            DerivationPlan::Passthrough
        );
        let transcode = DerivationPlan::Derive(DerivationKind::TranscodeMp4(VideoProfile::Baseline));
        assert_eq!(
            p.plan(&video("hevc", "mov,mp4,m4a,3gp,3g2,mj2", Some("aac")), Intent::FullView),
            transcode
        );
        assert_eq!(
            p.plan(&video("h264", "matroska,webm", Some("aac")), Intent::FullView),
            transcode
        );
        assert_eq!(
            p.plan(&video("h264", "mov,mp4,m4a,3gp,3g2,mj2", Some("pcm_s24le")), Intent::FullView),
            transcode
        );
    }

    #[test]
    fn unprobed_media_fails_open() {
        let p = policy(1);
        let traits = MediaTraits::new(MediaClass::Video, Some("mkv".into()));
        assert_eq!(p.plan(&traits, Intent::FullView), DerivationPlan::Passthrough);
    }

    #[test]
    fn audio_compatibility() {
        let p = policy(1);
        assert_eq!(
            p.plan(&audio("mp3", "mp3", false), Intent::FullView),
            DerivationPlan::Passthrough
        );
        assert_eq!(
            p.plan(&audio("aac", "mov,mp4,m4a,3gp,3g2,mj2", false), Intent::FullView),
            DerivationPlan::Passthrough
        );
        assert_eq!(
            p.plan(&audio("flac", "flac", false), Intent::FullView),
            DerivationPlan::Derive(DerivationKind::TranscodeAudio(AudioProfile::Aac))
        );
    }

    #[test]
    fn tag_extraction_is_gated_by_mode() {
        let song = MediaTraits::new(MediaClass::Audio, Some("mp3".into()));
        for mode in [1, 3, 5, 7] {
            assert_eq!(policy(mode).plan(&song, Intent::TagRead), DerivationPlan::Passthrough);
        }
        for mode in [2, 4, 6, 8] {
            assert_eq!(
                policy(mode).plan(&song, Intent::TagRead),
                DerivationPlan::Derive(DerivationKind::TagExtract)
            );
        }
        assert_eq!(
            policy(2).plan(&image("jpg", None), Intent::TagRead),
            DerivationPlan::Passthrough
        );
    }

    #[test]
    fn raw_and_unmapped_fail_open() {
        let p = policy(1);
        assert_eq!(
            p.plan(&image("jpg", Some(Orientation::Rotate180)), Intent::Passthrough),
            DerivationPlan::Passthrough
        );
        let other = MediaTraits::new(MediaClass::Other, Some("txt".into()));
        assert_eq!(p.plan(&other, Intent::Thumbnail), DerivationPlan::Passthrough);
        assert_eq!(p.plan(&MediaTraits::default(), Intent::FullView), DerivationPlan::Passthrough);
    }

    #[test]
    fn probe_is_only_needed_where_traits_matter() {
        let p = policy(2);
        assert!(p.needs_probe(MediaClass::Audio, Intent::Thumbnail));
        assert!(!p.needs_probe(MediaClass::Video, Intent::Thumbnail));
        assert!(p.needs_probe(MediaClass::Video, Intent::FullView));
        assert!(!p.needs_probe(MediaClass::Audio, Intent::TagRead));
        assert!(p.needs_orientation(MediaClass::Image, Intent::FullView));
        assert!(!p.needs_orientation(MediaClass::Video, Intent::FullView));
    }
}
