//! Track format descriptions.

use serde::{Deserialize, Serialize};

/// Kind of elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Audio,
    Video,
}

impl TrackType {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackType::Audio => "audio",
            TrackType::Video => "video",
        }
    }
}

/// Color description of a video track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorInfo {
    #[serde(default)]
    pub primaries: Option<String>,
    #[serde(default)]
    pub transfer: Option<String>,
    #[serde(default)]
    pub space: Option<String>,
    #[serde(default)]
    pub range: Option<String>,
}

impl ColorInfo {
    /// Whether the transfer characteristic is an HDR one (PQ or HLG).
    pub fn is_hdr(&self) -> bool {
        matches!(
            self.transfer.as_deref(),
            Some("smpte2084") | Some("arib-std-b67")
        )
    }
}

/// Negotiated format of one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub track_type: TrackType,

    /// Codec identifier, e.g. `video/avc` or `audio/mp4a-latm`.
    pub sample_mime: String,

    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,

    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channel_count: Option<u32>,

    #[serde(default)]
    pub color: Option<ColorInfo>,

    /// Codec-specific initialization data (SPS/PPS, AudioSpecificConfig, ...).
    /// Two tracks can share one container track only if this is identical.
    #[serde(default)]
    pub initialization_data: Vec<u8>,
}

impl Format {
    pub fn video(sample_mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            track_type: TrackType::Video,
            sample_mime: sample_mime.into(),
            width: Some(width),
            height: Some(height),
            sample_rate: None,
            channel_count: None,
            color: None,
            initialization_data: Vec::new(),
        }
    }

    pub fn audio(sample_mime: impl Into<String>, sample_rate: u32, channel_count: u32) -> Self {
        Self {
            track_type: TrackType::Audio,
            sample_mime: sample_mime.into(),
            width: None,
            height: None,
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            color: None,
            initialization_data: Vec::new(),
        }
    }

    pub fn with_initialization_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.initialization_data = data.into();
        self
    }

    pub fn with_color(mut self, color: ColorInfo) -> Self {
        self.color = Some(color);
        self
    }

    /// Whether samples encoded for `other` can be appended to a track that
    /// was started with `self`.
    pub fn initialization_data_matches(&self, other: &Format) -> bool {
        self.track_type == other.track_type
            && self.sample_mime == other.sample_mime
            && self.initialization_data == other.initialization_data
    }

    pub fn is_hdr(&self) -> bool {
        self.color.as_ref().is_some_and(ColorInfo::is_hdr)
    }
}

/// Map an ffprobe codec name to a sample mime type.
pub fn mime_for_codec(codec_name: &str) -> String {
    match codec_name {
        "h264" => "video/avc".to_string(),
        "hevc" => "video/hevc".to_string(),
        "av1" => "video/av01".to_string(),
        "vp9" => "video/x-vnd.on2.vp9".to_string(),
        "aac" => "audio/mp4a-latm".to_string(),
        "opus" => "audio/opus".to_string(),
        "mp3" => "audio/mpeg".to_string(),
        "ac3" => "audio/ac3".to_string(),
        "eac3" => "audio/eac3".to_string(),
        other => format!("application/x-{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_data_equality() {
        let a = Format::video("video/avc", 1920, 1080).with_initialization_data(vec![1, 2, 3]);
        let b = Format::video("video/avc", 1280, 720).with_initialization_data(vec![1, 2, 3]);
        let c = Format::video("video/avc", 1920, 1080).with_initialization_data(vec![1, 2, 4]);
        assert!(a.initialization_data_matches(&b));
        assert!(!a.initialization_data_matches(&c));
    }

    #[test]
    fn test_mime_mismatch_is_not_appendable() {
        let avc = Format::video("video/avc", 1920, 1080);
        let hevc = Format::video("video/hevc", 1920, 1080);
        assert!(!avc.initialization_data_matches(&hevc));
    }

    #[test]
    fn test_hdr_detection() {
        let format = Format::video("video/hevc", 3840, 2160).with_color(ColorInfo {
            transfer: Some("smpte2084".to_string()),
            ..ColorInfo::default()
        });
        assert!(format.is_hdr());
        assert!(!Format::audio("audio/mp4a-latm", 48_000, 2).is_hdr());
    }

    #[test]
    fn test_mime_for_codec() {
        assert_eq!(mime_for_codec("h264"), "video/avc");
        assert_eq!(mime_for_codec("aac"), "audio/mp4a-latm");
        assert_eq!(mime_for_codec("prores"), "application/x-prores");
    }
}
