//! Transcode sessions running one `ffmpeg` process per phase.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use splice_common::config::FfmpegConfig;
use splice_common::error::{SpliceError, SpliceResult};
use splice_common::time::us_to_ffmpeg_time;
use splice_composition::{Composition, EditedItem, Effect, TrackType};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::probe::{FfprobeProbe, StreamSummary};
use super::ProgressLines;
use crate::events::EventSink;
use crate::muxer::{ChunkInfo, ChunkTrack, MuxerSession};
use crate::progress::ProgressState;
use crate::result::{ProcessedInput, SessionReport};
use crate::transcode::{TranscodeFactory, TranscodeRequest, TranscodeSession};

/// Starts ffmpeg-backed transcode sessions.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    config: FfmpegConfig,
    probe: FfprobeProbe,
}

impl FfmpegTranscoder {
    pub fn new(config: FfmpegConfig, probe: FfprobeProbe) -> Self {
        Self { config, probe }
    }
}

impl TranscodeFactory for FfmpegTranscoder {
    fn start(
        &self,
        request: TranscodeRequest,
        muxer: Box<dyn MuxerSession>,
        sink: EventSink,
    ) -> Box<dyn TranscodeSession> {
        let progress = Arc::new(Mutex::new(ProgressState::NotStarted));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let run = SessionRun {
            config: self.config.clone(),
            probe: self.probe.clone(),
            progress: Arc::clone(&progress),
        };
        let task = tokio::spawn(run.execute(request, muxer, sink, cancel_rx));
        Box::new(FfmpegSession {
            progress,
            cancel_tx: Some(cancel_tx),
            task: Some(task),
        })
    }
}

struct FfmpegSession {
    progress: Arc<Mutex<ProgressState>>,
    cancel_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl TranscodeSession for FfmpegSession {
    fn progress(&self) -> ProgressState {
        self.progress
            .lock()
            .map(|p| *p)
            .unwrap_or(ProgressState::Unavailable)
    }

    async fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Transcode task ended abnormally: {e}");
            }
        }
    }
}

struct SessionRun {
    config: FfmpegConfig,
    probe: FfprobeProbe,
    progress: Arc<Mutex<ProgressState>>,
}

impl SessionRun {
    async fn execute(
        self,
        request: TranscodeRequest,
        mut muxer: Box<dyn MuxerSession>,
        sink: EventSink,
        cancel_rx: oneshot::Receiver<()>,
    ) {
        let plan = match muxer
            .next_chunk_path()
            .and_then(|chunk| build_plan(&request, &self.config, &chunk))
        {
            Ok(plan) => plan,
            Err(e) => {
                sink.session_failed(SessionReport::default(), Some(muxer), e);
                return;
            }
        };
        let report = plan.report();

        let outcome = match self.run_ffmpeg(&plan, cancel_rx).await {
            Ok(()) => match self.describe_chunk(&plan, request.timestamp_offset_us).await {
                Ok(chunk) => muxer.commit_chunk(chunk).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.set_progress(ProgressState::Available(100));
                sink.session_completed(report, muxer);
            }
            Err(e) => sink.session_failed(report, Some(muxer), e),
        }
    }

    async fn run_ffmpeg(
        &self,
        plan: &FfmpegPlan,
        mut cancel_rx: oneshot::Receiver<()>,
    ) -> SpliceResult<()> {
        tracing::debug!(args = ?plan.args, "Running ffmpeg");
        let mut child = Command::new(&self.config.ffmpeg_bin)
            .args(&plan.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpliceError::transcode(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            inputs = plan.inputs.len(),
            expected_duration_us = ?plan.expected_duration_us,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpliceError::transcode("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SpliceError::transcode("Failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks once the stderr pipe fills up.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match BufReader::new(stderr).read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let progress = Arc::clone(&self.progress);
        let expected = plan.expected_duration_us;
        if expected.is_none() {
            self.set_progress(ProgressState::Unavailable);
        }
        let progress_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut state = ProgressLines::default();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some((key, value)) = line.trim().split_once('=') {
                    state.update(key, value);
                    if key == "progress" {
                        if let (Some(expected), Ok(mut shared)) = (expected, progress.lock()) {
                            *shared = ProgressState::Available(state.percent(expected));
                        }
                    }
                }
            }
        });

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| SpliceError::transcode(format!("Failed to wait on ffmpeg: {e}")))?,
            Ok(()) = &mut cancel_rx => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill ffmpeg: {e}");
                }
                progress_task.abort();
                stderr_task.abort();
                tracing::info!("ffmpeg cancelled");
                return Err(SpliceError::Cancelled);
            }
        };

        let _ = progress_task.await;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(SpliceError::transcode(format!(
                "ffmpeg failed (status {status}): {}",
                stderr_output.trim()
            )));
        }
        Ok(())
    }

    async fn describe_chunk(&self, plan: &FfmpegPlan, offset_us: u64) -> SpliceResult<ChunkInfo> {
        let summary = self.probe.summarize(&plan.chunk_path).await?;
        let tracks = [summary.video, summary.audio]
            .into_iter()
            .flatten()
            .map(|stream: StreamSummary| ChunkTrack {
                format: stream.format,
                sample_count: stream.frame_count.unwrap_or(0),
                average_bitrate: stream.bit_rate,
            })
            .collect();
        Ok(ChunkInfo {
            path: plan.chunk_path.clone(),
            start_offset_us: offset_us,
            duration_us: summary.duration_us,
            tracks,
        })
    }

    fn set_progress(&self, state: ProgressState) {
        if let Ok(mut shared) = self.progress.lock() {
            *shared = state;
        }
    }
}

/// Command line and bookkeeping for one phase.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FfmpegPlan {
    pub args: Vec<String>,
    pub inputs: Vec<String>,
    pub chunk_path: std::path::PathBuf,
    pub expected_duration_us: Option<u64>,
    pub video_encoder: Option<String>,
    pub audio_encoder: Option<String>,
}

impl FfmpegPlan {
    fn report(&self) -> SessionReport {
        let mut uris: Vec<&String> = Vec::new();
        for input in &self.inputs {
            if !uris.contains(&input) {
                uris.push(input);
            }
        }
        SessionReport {
            processed_inputs: uris
                .into_iter()
                .map(|uri| ProcessedInput {
                    uri: uri.clone(),
                    audio_decoder: self.audio_encoder.as_ref().map(|_| "ffmpeg".to_string()),
                    video_decoder: self.video_encoder.as_ref().map(|_| "ffmpeg".to_string()),
                })
                .collect(),
            audio_encoder: self.audio_encoder.clone(),
            video_encoder: self.video_encoder.clone(),
        }
    }
}

/// Where one output track comes from.
struct TrackSource<'a> {
    track_type: TrackType,
    /// `(input index, item)` pairs in playback order.
    items: Vec<(usize, &'a EditedItem)>,
    effects: Vec<&'a Effect>,
}

impl TrackSource<'_> {
    fn stream_specifier(&self) -> &'static str {
        match self.track_type {
            TrackType::Video => "v",
            TrackType::Audio => "a",
        }
    }

    fn needs_filter(&self) -> bool {
        self.items.len() > 1 || !self.effects.is_empty()
    }

    fn duration_us(&self) -> Option<u64> {
        self.items
            .iter()
            .map(|(_, item)| {
                let clip = item.clip();
                clip.end_us
                    .or(item.duration_us)
                    .map(|end| end.saturating_sub(clip.start_us))
            })
            .sum()
    }

    /// Filter graph chain producing `[{label}]`.
    fn filter_chain(&self, label: &str) -> String {
        let kind = self.stream_specifier();
        let mut chain: String = self
            .items
            .iter()
            .map(|(input, _)| format!("[{input}:{kind}:0]"))
            .collect();
        let (v, a) = match self.track_type {
            TrackType::Video => (1, 0),
            TrackType::Audio => (0, 1),
        };
        chain.push_str(&format!("concat=n={}:v={v}:a={a}", self.items.len()));
        for effect in &self.effects {
            chain.push(',');
            chain.push_str(&effect_filter(effect));
        }
        chain.push_str(&format!("[{label}]"));
        chain
    }
}

fn track_source<'a>(composition: &'a Composition, track_type: TrackType) -> Option<TrackSource<'a>> {
    let mut input = 0;
    let mut found = None;
    for sequence in &composition.sequences {
        let start = input;
        input += sequence.items.len();
        if found.is_some() || !sequence.contributes(track_type) {
            continue;
        }
        let items: Vec<(usize, &EditedItem)> = sequence
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| match track_type {
                TrackType::Video => !item.remove_video,
                TrackType::Audio => !item.remove_audio,
            })
            .map(|(i, item)| (start + i, item))
            .collect();
        if items.is_empty() {
            continue;
        }
        let mut effects: Vec<&Effect> = Vec::new();
        for &(_, item) in &items {
            effects.extend(match track_type {
                TrackType::Video => item.effects.video.iter(),
                TrackType::Audio => item.effects.audio.iter(),
            });
        }
        effects.extend(match track_type {
            TrackType::Video => composition.effects.video.iter(),
            TrackType::Audio => composition.effects.audio.iter(),
        });
        found = Some(TrackSource {
            track_type,
            items,
            effects,
        });
    }
    found
}

/// Render an effect as an ffmpeg filter: the effect name is the filter name
/// and its params become the filter options.
fn effect_filter(effect: &Effect) -> String {
    match &effect.params {
        serde_json::Value::Null => effect.name.clone(),
        serde_json::Value::Object(options) => {
            let options: Vec<String> = options
                .iter()
                .map(|(key, value)| match value {
                    serde_json::Value::String(s) => format!("{key}={s}"),
                    other => format!("{key}={other}"),
                })
                .collect();
            if options.is_empty() {
                effect.name.clone()
            } else {
                format!("{}={}", effect.name, options.join(":"))
            }
        }
        serde_json::Value::String(s) => format!("{}={s}", effect.name),
        other => format!("{}={other}", effect.name),
    }
}

pub(crate) fn build_plan(
    request: &TranscodeRequest,
    config: &FfmpegConfig,
    chunk_path: &Path,
) -> SpliceResult<FfmpegPlan> {
    let composition = &request.composition;
    let mut args: Vec<String> = ["-hide_banner", "-nostats", "-loglevel", "error", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut inputs = Vec::new();
    for item in composition.sequences.iter().flat_map(|s| s.items.iter()) {
        let clip = item.clip();
        if clip.start_us > 0 {
            args.push("-ss".to_string());
            args.push(us_to_ffmpeg_time(clip.start_us));
        }
        if let Some(end) = clip.end_us {
            args.push("-t".to_string());
            args.push(us_to_ffmpeg_time(end.saturating_sub(clip.start_us)));
        }
        args.push("-i".to_string());
        args.push(item.source.uri.clone());
        inputs.push(item.source.uri.clone());
    }

    let video = track_source(composition, TrackType::Video);
    let audio = track_source(composition, TrackType::Audio);
    if video.is_none() && audio.is_none() {
        return Err(SpliceError::transcode(format!(
            "{} composition produces no tracks",
            request.phase
        )));
    }

    let mut filters = Vec::new();
    let mut video_encoder = None;
    let mut audio_encoder = None;
    for source in [&video, &audio].into_iter().flatten() {
        let (transmux, encoder, bitrate_kbps, codec_flag, label) = match source.track_type {
            TrackType::Video => (
                composition.transmux_video,
                &config.video_codec,
                config.video_bitrate_kbps,
                "-c:v",
                "vout",
            ),
            TrackType::Audio => (
                composition.transmux_audio,
                &config.audio_codec,
                config.audio_bitrate_kbps,
                "-c:a",
                "aout",
            ),
        };

        let copy = request.force_remux || (transmux && !source.needs_filter());
        if source.needs_filter() {
            if request.force_remux {
                return Err(SpliceError::transcode(format!(
                    "{} cannot copy {} samples that need filtering",
                    request.phase,
                    source.track_type.as_str()
                )));
            }
            filters.push(source.filter_chain(label));
            args.push("-map".to_string());
            args.push(format!("[{label}]"));
        } else {
            // Optional map: sources without this track type still export.
            let (input, _) = source.items[0];
            args.push("-map".to_string());
            args.push(format!("{input}:{}:0?", source.stream_specifier()));
        }

        args.push(codec_flag.to_string());
        if copy {
            args.push("copy".to_string());
        } else {
            args.push(encoder.clone());
            if bitrate_kbps > 0 {
                args.push(match source.track_type {
                    TrackType::Video => "-b:v".to_string(),
                    TrackType::Audio => "-b:a".to_string(),
                });
                args.push(format!("{bitrate_kbps}k"));
            }
            match source.track_type {
                TrackType::Video => video_encoder = Some(encoder.clone()),
                TrackType::Audio => audio_encoder = Some(encoder.clone()),
            }
        }
    }
    if !filters.is_empty() {
        // Filter graphs go before the output options they feed.
        let position = args.iter().rposition(|a| a == "-i").map_or(0, |i| i + 2);
        args.insert(position, filters.join(";"));
        args.insert(position, "-filter_complex".to_string());
    }

    args.extend(
        ["-avoid_negative_ts", "make_zero", "-progress", "pipe:1", "-f", "mp4"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(chunk_path.to_string_lossy().into_owned());

    let expected_duration_us = [&video, &audio]
        .into_iter()
        .flatten()
        .filter_map(|s| s.duration_us())
        .max();

    Ok(FfmpegPlan {
        args,
        inputs,
        chunk_path: chunk_path.to_path_buf(),
        expected_duration_us,
        video_encoder,
        audio_encoder,
    })
}
