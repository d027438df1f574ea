//! Probes backed by `ffprobe`.

use std::path::Path;

use serde::Deserialize;
use splice_common::error::{SpliceError, SpliceResult};
use splice_common::time::secs_to_us;
use splice_composition::{mime_for_codec, ColorInfo, Composition, Format, TrackType};
use tokio::process::Command;

use crate::probe::{ResumeMetadata, ResumeProbe, SyncBoundary, TrimInfo, TrimProbe};

/// Top-level `ffprobe -print_format json` document.
#[derive(Debug, Clone, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    color_primaries: Option<String>,
    color_transfer: Option<String>,
    color_space: Option<String>,
    color_range: Option<String>,
    extradata_hash: Option<String>,
    nb_frames: Option<String>,
    bit_rate: Option<String>,
}

/// Formats and statistics of one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSummary {
    pub duration_us: u64,
    pub size_bytes: Option<u64>,
    pub video: Option<StreamSummary>,
    pub audio: Option<StreamSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub format: Format,
    pub frame_count: Option<u64>,
    pub bit_rate: Option<u32>,
}

/// One video packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    pub pts_us: u64,
    pub keyframe: bool,
}

/// Trim and resume probe running `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_bin: String,
}

impl FfprobeProbe {
    pub fn new(ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    /// Stream formats, duration and size of `path`.
    pub async fn summarize(&self, path: &Path) -> SpliceResult<MediaSummary> {
        let stdout = self
            .run(path, &[
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
                "-show_data_hash",
                "sha256",
            ])
            .await?;
        parse_summary(&stdout)
    }

    /// Video packets of `path` in presentation order.
    pub async fn video_packets(&self, path: &Path) -> SpliceResult<Vec<PacketInfo>> {
        let stdout = self
            .run(path, &[
                "-select_streams",
                "v:0",
                "-show_entries",
                "packet=pts_time,flags",
                "-of",
                "csv=p=0",
            ])
            .await?;
        Ok(parse_packets(&stdout))
    }

    async fn run(&self, path: &Path, args: &[&str]) -> SpliceResult<String> {
        if !path.exists() {
            return Err(SpliceError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let output = Command::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("error")
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| SpliceError::probe(format!("Failed to run {}: {e}", self.ffprobe_bin)))?;

        if !output.status.success() {
            return Err(SpliceError::probe(format!(
                "ffprobe failed for {} ({}): {}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| SpliceError::probe(format!("ffprobe produced invalid UTF-8: {e}")))
    }
}

#[async_trait::async_trait]
impl TrimProbe for FfprobeProbe {
    async fn probe_trim(&self, uri: &str, trim_start_us: u64) -> SpliceResult<TrimInfo> {
        let path = Path::new(uri);
        let summary = self.summarize(path).await?;
        let packets = self.video_packets(path).await?;
        let (next_sync, first_sample_after_start_is_sync) = sync_after(&packets, trim_start_us);
        tracing::debug!(uri, trim_start_us, ?next_sync, packets = packets.len(), "Probed trim boundary");
        Ok(TrimInfo {
            next_sync,
            duration_us: summary.duration_us,
            first_video_sample_us: packets.first().map(|p| p.pts_us),
            first_sample_after_start_is_sync,
            video_format: summary.video.map(|s| s.format),
            audio_format: summary.audio.map(|s| s.format),
        })
    }
}

#[async_trait::async_trait]
impl ResumeProbe for FfprobeProbe {
    async fn probe_resume(
        &self,
        previous_output: &Path,
        composition: &Composition,
    ) -> SpliceResult<ResumeMetadata> {
        let summary = self.summarize(previous_output).await?;
        let packets = self.video_packets(previous_output).await?;
        let last_sync_us = packets.iter().filter(|p| p.keyframe).map(|p| p.pts_us).max();
        tracing::debug!(
            previous = %previous_output.display(),
            sources = ?composition.uris(),
            ?last_sync_us,
            "Probed previous output"
        );
        Ok(ResumeMetadata {
            last_sync_us,
            video_format: summary.video.map(|s| s.format),
            audio_format: summary.audio.map(|s| s.format),
        })
    }
}

fn parse_summary(json: &str) -> SpliceResult<MediaSummary> {
    let output: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| SpliceError::probe(format!("Unparsable ffprobe output: {e}")))?;
    let format = output.format.as_ref();
    let duration_us = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .map(secs_to_us)
        .unwrap_or(0);
    let size_bytes = format
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse().ok());

    let mut video = None;
    let mut audio = None;
    for stream in &output.streams {
        let Some(summary) = stream_summary(stream) else {
            continue;
        };
        let slot = match summary.format.track_type {
            TrackType::Video => &mut video,
            TrackType::Audio => &mut audio,
        };
        if slot.is_none() {
            *slot = Some(summary);
        }
    }

    Ok(MediaSummary {
        duration_us,
        size_bytes,
        video,
        audio,
    })
}

fn stream_summary(stream: &ProbeStream) -> Option<StreamSummary> {
    let track_type = match stream.codec_type.as_deref()? {
        "video" => TrackType::Video,
        "audio" => TrackType::Audio,
        _ => return None,
    };
    let codec = stream.codec_name.as_deref().unwrap_or("unknown");
    let color = ColorInfo {
        primaries: stream.color_primaries.clone(),
        transfer: stream.color_transfer.clone(),
        space: stream.color_space.clone(),
        range: stream.color_range.clone(),
    };
    let has_color = color != ColorInfo::default();

    let format = Format {
        track_type,
        sample_mime: mime_for_codec(codec),
        width: stream.width,
        height: stream.height,
        sample_rate: stream.sample_rate.as_deref().and_then(|r| r.parse().ok()),
        channel_count: stream.channels,
        color: (track_type == TrackType::Video && has_color).then_some(color),
        initialization_data: stream
            .extradata_hash
            .as_deref()
            .map(|h| h.as_bytes().to_vec())
            .unwrap_or_default(),
    };
    Some(StreamSummary {
        format,
        frame_count: stream.nb_frames.as_deref().and_then(|n| n.parse().ok()),
        bit_rate: stream.bit_rate.as_deref().and_then(|b| b.parse().ok()),
    })
}

/// Parse `pts_time,flags` lines, sorted by presentation time.
pub fn parse_packets(csv: &str) -> Vec<PacketInfo> {
    let mut packets: Vec<PacketInfo> = csv
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim().split(',');
            let pts = fields.next()?.parse::<f64>().ok()?;
            let flags = fields.next().unwrap_or("");
            Some(PacketInfo {
                pts_us: secs_to_us(pts),
                keyframe: flags.starts_with('K'),
            })
        })
        .collect();
    packets.sort_by_key(|p| p.pts_us);
    packets
}

/// First sync sample at or after `start_us`, and whether the first sample
/// at or after it is one.
pub fn sync_after(packets: &[PacketInfo], start_us: u64) -> (SyncBoundary, bool) {
    let mut after = packets.iter().filter(|p| p.pts_us >= start_us).peekable();
    let Some(first) = after.peek().copied() else {
        return (SyncBoundary::None, false);
    };
    let boundary = after
        .find(|p| p.keyframe)
        .map(|p| SyncBoundary::At(p.pts_us))
        .unwrap_or(SyncBoundary::EndOfSource);
    (boundary, first.keyframe)
}
