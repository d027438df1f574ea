//! Show what the trim probe sees in a media file.

use std::path::PathBuf;

use serde::Serialize;
use splice_common::config::AppConfig;
use splice_common::time::{secs_to_us, us_to_secs};
use splice_export_engine::ffmpeg::{FfprobeProbe, StreamSummary};
use splice_export_engine::{SyncBoundary, TrimProbe};

#[derive(Serialize)]
struct StreamView {
    mime: String,
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<u32>,
    channel_count: Option<u32>,
    frame_count: Option<u64>,
    bit_rate: Option<u32>,
}

impl From<&StreamSummary> for StreamView {
    fn from(stream: &StreamSummary) -> Self {
        Self {
            mime: stream.format.sample_mime.clone(),
            width: stream.format.width,
            height: stream.format.height,
            sample_rate: stream.format.sample_rate,
            channel_count: stream.format.channel_count,
            frame_count: stream.frame_count,
            bit_rate: stream.bit_rate,
        }
    }
}

pub async fn run(config: &AppConfig, media: PathBuf, trim_start: f64) -> anyhow::Result<()> {
    let probe = FfprobeProbe::new(&config.ffmpeg.ffprobe_bin);
    let summary = probe.summarize(&media).await?;
    let packets = probe.video_packets(&media).await?;
    let trim_start_us = secs_to_us(trim_start);
    let info = probe
        .probe_trim(&media.to_string_lossy(), trim_start_us)
        .await?;

    println!("Media: {}", media.display());
    println!("  Duration: {:.3}s", us_to_secs(summary.duration_us));
    if let Some(size) = summary.size_bytes {
        println!("  Size: {size} bytes");
    }
    let keyframes = packets.iter().filter(|p| p.keyframe).count();
    println!("  Video packets: {} ({keyframes} keyframes)", packets.len());

    match info.next_sync {
        SyncBoundary::At(us) => println!(
            "  First keyframe at/after {:.3}s: {:.3}s (gap {:.3}s)",
            trim_start,
            us_to_secs(us),
            us_to_secs(us.saturating_sub(trim_start_us))
        ),
        SyncBoundary::EndOfSource => {
            println!("  No keyframe after {trim_start:.3}s")
        }
        SyncBoundary::None => println!("  No video after {trim_start:.3}s"),
    }
    println!();

    let streams = serde_json::json!({
        "video": summary.video.as_ref().map(StreamView::from),
        "audio": summary.audio.as_ref().map(StreamView::from),
    });
    println!("{}", serde_json::to_string_pretty(&streams)?);
    Ok(())
}
