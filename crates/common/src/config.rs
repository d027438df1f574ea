//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::time::AAC_LC_ACCESS_UNIT_SAMPLES;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Export job defaults.
    #[serde(default)]
    pub export: ExportDefaults,

    /// External ffmpeg tooling.
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default export job parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Try to transmux the bulk of a trimmed single-file export instead of
    /// re-encoding all of it.
    pub trim_optimization: bool,

    /// Size (in PCM frames) of one encoded audio access unit. A keyframe gap
    /// shorter than this after the trim start is not worth optimizing.
    pub audio_access_unit_samples: u32,

    /// Report blended progress for resumed exports instead of "unavailable".
    pub report_resume_progress: bool,

    /// Directory for staged muxer chunks. Defaults to a sibling directory of
    /// the output file.
    pub staging_dir: Option<PathBuf>,
}

/// ffmpeg / ffprobe invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_bin: String,

    /// Path or name of the ffprobe binary.
    pub ffprobe_bin: String,

    /// Video encoder used when a phase transcodes video.
    pub video_codec: String,

    /// Audio encoder used when a phase transcodes audio.
    pub audio_codec: String,

    /// Video bitrate in kbps (0 = encoder default).
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "splice=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            trim_optimization: false,
            audio_access_unit_samples: AAC_LC_ACCESS_UNIT_SAMPLES,
            report_resume_progress: false,
            staging_dir: None,
        }
    }
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate_kbps: 0,
            audio_bitrate_kbps: 192,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match Self::from_json(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Parse a config document. Missing sections take their defaults.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Standard config file location.
    pub fn path() -> PathBuf {
        config_file_path()
    }
}

fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("splice").join("config.json")
}
