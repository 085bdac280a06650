//! EXIF orientation of still images

use exif::{In, Reader, Tag};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::Path;

/// EXIF orientation (tag 0x0112), values 1-8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Map the raw EXIF value
    pub fn from_exif(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Normal,
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => return None,
        })
    }

    pub fn exif_value(&self) -> u32 {
        match self {
            Self::Normal => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
        }
    }

    /// Whether the stored pixels already display correctly
    pub fn is_upright(&self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Clockwise rotation needed to display the image, ignoring mirroring
    pub fn degrees(&self) -> u16 {
        match self {
            Self::Normal | Self::FlipHorizontal | Self::FlipVertical => 0,
            Self::Rotate90 | Self::Transpose => 90,
            Self::Rotate180 => 180,
            Self::Rotate270 | Self::Transverse => 270,
        }
    }

    /// ffmpeg filter chain that makes the image upright
    pub fn filter(&self) -> Option<&'static str> {
        match self {
            Self::Normal => None,
            Self::FlipHorizontal => Some("hflip"),
            Self::Rotate180 => Some("hflip,vflip"),
            Self::FlipVertical => Some("vflip"),
            Self::Transpose => Some("transpose=0"),
            Self::Rotate90 => Some("transpose=1"),
            Self::Transverse => Some("transpose=3"),
            Self::Rotate270 => Some("transpose=2"),
        }
    }

    /// Short tag used in derived file names
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Normal => "upright",
            Self::FlipHorizontal => "fliph",
            Self::Rotate180 => "rot180",
            Self::FlipVertical => "flipv",
            Self::Transpose => "transpose",
            Self::Rotate90 => "rot90",
            Self::Transverse => "transverse",
            Self::Rotate270 => "rot270",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Read the orientation of an image file
///
/// Blocking: call through `spawn_blocking` from async code. Files without
/// EXIF data, or with an out-of-range value, yield `None`.
pub fn read_orientation(path: &Path) -> Option<Orientation> {
    let file = File::open(path).ok()?;
    orientation_from_reader(&mut BufReader::new(file))
}

/// Read the orientation from any seekable container (JPEG, TIFF, PNG, WebP, HEIF)
pub fn orientation_from_reader<R: BufRead + Seek>(reader: &mut R) -> Option<Orientation> {
    let exif = Reader::new().read_from_container(reader).ok()?;
    let field = exif.get_field(Tag::Orientation, In::PRIMARY)?;
    field.value.get_uint(0).and_then(Orientation::from_exif)
}
