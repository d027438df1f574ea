//! ffmpeg/ffprobe realization of every export collaborator.
//!
//! - [`FfprobeProbe`]: trim and resume probes from packet keyframe flags
//! - [`FfmpegTranscoder`]: one `ffmpeg` process per phase
//! - [`ChunkMuxerFactory`]: staged chunks joined with the concat demuxer
//!
//! File copies use [`FsCopier`](crate::copy::FsCopier).

pub mod muxer;
pub mod probe;
pub mod transcode;

use std::process::Command;
use std::sync::Arc;

use splice_common::config::AppConfig;
use splice_common::error::{SpliceError, SpliceResult};

use crate::copy::FsCopier;
use crate::orchestrator::Collaborators;

pub use muxer::{ChunkMuxer, ChunkMuxerFactory};
pub use probe::{FfprobeProbe, MediaSummary, PacketInfo, StreamSummary};
pub use transcode::FfmpegTranscoder;

/// Collaborators backed by the configured ffmpeg tools.
pub fn collaborators(config: &AppConfig) -> Collaborators {
    let probe = Arc::new(FfprobeProbe::new(&config.ffmpeg.ffprobe_bin));
    Collaborators {
        trim_probe: probe.clone(),
        resume_probe: probe.clone(),
        muxers: Arc::new(ChunkMuxerFactory::new(
            &config.ffmpeg.ffmpeg_bin,
            config.export.staging_dir.clone(),
        )),
        transcoder: Arc::new(FfmpegTranscoder::new(config.ffmpeg.clone(), (*probe).clone())),
        copier: Arc::new(FsCopier),
    }
}

/// Fail early when ffmpeg or ffprobe cannot be found.
pub fn check_tools(config: &AppConfig) -> SpliceResult<()> {
    for binary in [&config.ffmpeg.ffmpeg_bin, &config.ffmpeg.ffprobe_bin] {
        if !command_exists(binary) {
            return Err(SpliceError::config(format!(
                "{binary} not found. Install ffmpeg or set ffmpeg.ffmpeg_bin / ffmpeg.ffprobe_bin in {}",
                AppConfig::path().display()
            )));
        }
    }
    Ok(())
}

pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Accumulates `-progress pipe:1` key/value lines.
#[derive(Debug, Default)]
pub(crate) struct ProgressLines {
    out_time_us: u64,
    complete: bool,
}

impl ProgressLines {
    pub(crate) fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite its name ffmpeg reports this one in microseconds too.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time_us = us;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    pub(crate) fn percent(&self, expected_duration_us: u64) -> u8 {
        if self.complete {
            return 100;
        }
        if expected_duration_us == 0 {
            return 0;
        }
        ((self.out_time_us as f64 / expected_duration_us as f64) * 100.0)
            .clamp(0.0, 100.0)
            .floor() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_lines() {
        let mut lines = ProgressLines::default();
        lines.update("frame", "120");
        lines.update("out_time_us", "2500000");
        lines.update("progress", "continue");
        assert_eq!(lines.percent(10_000_000), 25);

        lines.update("out_time_ms", "12000000");
        assert_eq!(lines.percent(10_000_000), 100);

        lines.update("out_time_us", "N/A");
        assert_eq!(lines.out_time_us, 12_000_000);

        let mut done = ProgressLines::default();
        done.update("progress", "end");
        assert_eq!(done.percent(0), 100);
    }

    #[test]
    fn test_command_exists_for_shell() {
        assert!(command_exists("sh"));
        assert!(!command_exists("splice-definitely-not-a-binary"));
    }
}
