//! Audio format classification, codec inspection and loudness normalization.
//!
//! Both inspection and normalization are delegated to external tools behind
//! the [`CodecProbe`] and [`Normalizer`] traits.

mod normalize;
mod probe;

pub use normalize::{CommandNormalizer, Normalizer};
pub use probe::{parse_mp3info_output, parse_mp4info_output, CodecProbe, ToolProbe, TrackInfo};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Container/codec of a source track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Aac,
    Alac,
    Unknown,
}

impl AudioFormat {
    /// Whether the destination copy must go through loudness normalization.
    ///
    /// Apple Lossless is left untouched; everything else is normalized.
    pub fn requires_normalization(&self) -> bool {
        !matches!(self, AudioFormat::Alac)
    }

    /// Map a codec label reported by `mp4info`.
    pub fn from_mp4_codec(label: &str) -> Self {
        match label.trim() {
            "MPEG-4 AAC LC" => AudioFormat::Aac,
            "alac" => AudioFormat::Alac,
            _ => AudioFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Alac => "alac",
            AudioFormat::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container family, decided from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp3,
    Mp4,
}

impl Container {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "mp3" => Some(Container::Mp3),
            "m4a" => Some(Container::Mp4),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_alac_skips_normalization() {
        assert!(AudioFormat::Mp3.requires_normalization());
        assert!(AudioFormat::Aac.requires_normalization());
        assert!(AudioFormat::Unknown.requires_normalization());
        assert!(!AudioFormat::Alac.requires_normalization());
    }

    #[test]
    fn test_mp4_codec_labels() {
        assert_eq!(AudioFormat::from_mp4_codec("MPEG-4 AAC LC"), AudioFormat::Aac);
        assert_eq!(AudioFormat::from_mp4_codec("alac"), AudioFormat::Alac);
        assert_eq!(AudioFormat::from_mp4_codec("MPEG-4 AAC HE"), AudioFormat::Unknown);
    }

    #[test]
    fn test_container_from_extension() {
        assert_eq!(Container::from_path(Path::new("a/B.MP3")), Some(Container::Mp3));
        assert_eq!(Container::from_path(Path::new("a/b.m4a")), Some(Container::Mp4));
        assert_eq!(Container::from_path(Path::new("a/b.flac")), None);
        assert_eq!(Container::from_path(Path::new("a/noext")), None);
    }
}
