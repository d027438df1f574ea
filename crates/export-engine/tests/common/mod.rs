//! Scripted in-memory collaborators for driving export jobs in tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use splice_common::error::{SpliceError, SpliceResult};
use splice_common::time::us_to_ms;
use splice_composition::{Composition, EditedItem, Format, TrackType};
use splice_export_engine::muxer::TrackLedger;
use splice_export_engine::{
    ChunkInfo, ChunkTrack, Collaborators, EventSink, ExportOptions, Exporter, FileCopier,
    FileEnded, MuxerFactory, MuxerMode, MuxerSession, ProcessedInput, ProgressState,
    ResumeMetadata, ResumeProbe, SessionReport, TranscodeFactory, TranscodeRequest,
    TranscodeSession, TrimInfo, TrimProbe,
};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

pub const SECOND: u64 = 1_000_000;

/// One 1024-sample access unit lasts exactly 100 ms at this rate.
pub const SAMPLE_RATE: u32 = 10_240;

pub fn avc(csd: u8) -> Format {
    Format::video("video/avc", 1920, 1080).with_initialization_data(vec![csd])
}

pub fn aac() -> Format {
    Format::audio("audio/mp4a-latm", SAMPLE_RATE, 2).with_initialization_data(vec![0x12, 0x10])
}

/// `/media/input.mp4` clipped to [2 s, 8 s).
pub fn trimmed_composition() -> Composition {
    Composition::single(EditedItem::new("/media/input.mp4").with_clip(2 * SECOND, Some(8 * SECOND)))
}

pub fn report(uri: &str, audio: Option<&str>, video: Option<&str>) -> SessionReport {
    SessionReport {
        processed_inputs: vec![ProcessedInput {
            uri: uri.to_string(),
            audio_decoder: None,
            video_decoder: None,
        }],
        audio_encoder: audio.map(str::to_string),
        video_encoder: video.map(str::to_string),
    }
}

/// Tracks how many job operations are outstanding at once.
#[derive(Debug, Default)]
pub struct Monitor {
    active: AtomicUsize,
    max: AtomicUsize,
}

impl Monitor {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

// --- probes ---

#[derive(Default)]
pub struct ScriptedProbe {
    pub trim: Mutex<Option<SpliceResult<TrimInfo>>>,
    pub resume: Mutex<Option<SpliceResult<ResumeMetadata>>>,
    /// Never answer; for cancellation tests.
    pub hold: bool,
    pub started: Notify,
    pub calls: Mutex<Vec<String>>,
    pub monitor: Arc<Monitor>,
}

impl ScriptedProbe {
    async fn answer<T>(&self, slot: &Mutex<Option<SpliceResult<T>>>, call: String) -> SpliceResult<T> {
        self.monitor.enter();
        self.calls.lock().unwrap().push(call);
        self.started.notify_one();
        if self.hold {
            std::future::pending::<()>().await;
        }
        let answer = slot
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(SpliceError::probe("unscripted probe")));
        self.monitor.exit();
        answer
    }
}

#[async_trait::async_trait]
impl TrimProbe for ScriptedProbe {
    async fn probe_trim(&self, uri: &str, trim_start_us: u64) -> SpliceResult<TrimInfo> {
        self.answer(&self.trim, format!("trim {uri} @{trim_start_us}")).await
    }
}

#[async_trait::async_trait]
impl ResumeProbe for ScriptedProbe {
    async fn probe_resume(
        &self,
        previous_output: &Path,
        _composition: &Composition,
    ) -> SpliceResult<ResumeMetadata> {
        self.answer(&self.resume, format!("resume {}", previous_output.display()))
            .await
    }
}

// --- muxer ---

#[derive(Default)]
pub struct MemoryMuxers {
    pub created: Mutex<Vec<(PathBuf, MuxerMode)>>,
    pub abandoned: Arc<Mutex<Vec<PathBuf>>>,
    pub finalized: Arc<Mutex<Vec<PathBuf>>>,
}

impl MuxerFactory for MemoryMuxers {
    fn create(
        &self,
        output: &Path,
        mode: MuxerMode,
        expected_video: Option<Format>,
        sink: EventSink,
    ) -> SpliceResult<Box<dyn MuxerSession>> {
        self.created
            .lock()
            .unwrap()
            .push((output.to_path_buf(), mode));
        Ok(Box::new(MemoryMuxer {
            output: output.to_path_buf(),
            mode,
            ledger: TrackLedger::new(expected_video),
            chunks: 0,
            sink,
            abandoned: Arc::clone(&self.abandoned),
            finalized: Arc::clone(&self.finalized),
        }))
    }
}

struct MemoryMuxer {
    output: PathBuf,
    mode: MuxerMode,
    ledger: TrackLedger,
    chunks: u64,
    sink: EventSink,
    abandoned: Arc<Mutex<Vec<PathBuf>>>,
    finalized: Arc<Mutex<Vec<PathBuf>>>,
}

#[async_trait::async_trait]
impl MuxerSession for MemoryMuxer {
    fn output_path(&self) -> &Path {
        &self.output
    }

    fn mode(&self) -> MuxerMode {
        self.mode
    }

    fn switch_to_append(&mut self) -> SpliceResult<()> {
        if self.mode != MuxerMode::Partial {
            return Err(SpliceError::muxer("not a partial muxer"));
        }
        self.mode = MuxerMode::Append;
        Ok(())
    }

    fn track_format(&self, track_type: TrackType) -> Option<Format> {
        self.ledger.format(track_type).cloned()
    }

    fn next_chunk_path(&mut self) -> SpliceResult<PathBuf> {
        Ok(PathBuf::from(format!(
            "{}.chunk{}",
            self.output.display(),
            self.chunks
        )))
    }

    async fn commit_chunk(&mut self, chunk: ChunkInfo) -> SpliceResult<()> {
        self.ledger.record(&chunk, self.mode)?;
        self.chunks += 1;
        if self.mode != MuxerMode::Partial {
            for track in self.ledger.track_ended() {
                self.sink.track_ended(track);
            }
            self.sink.file_ended(FileEnded {
                duration_ms: us_to_ms(self.ledger.duration_us()),
                file_size_bytes: 1_000 * self.chunks,
            });
            self.finalized.lock().unwrap().push(self.output.clone());
        }
        Ok(())
    }

    async fn abandon(self: Box<Self>) {
        self.abandoned.lock().unwrap().push(self.output.clone());
    }
}

// --- transcoder ---

pub enum Step {
    /// Commit one chunk carrying `tracks`, then complete.
    Complete {
        tracks: Vec<Format>,
        duration_us: u64,
        report: SessionReport,
    },
    /// Fail without committing.
    Fail(SpliceError),
    /// Report `progress` until cancelled, then hand the muxer back with a
    /// cancellation failure.
    Hang { progress: u8 },
    /// Complete like `Complete`, then report a late failure for the same
    /// session.
    CompleteThenFail { tracks: Vec<Format>, report: SessionReport },
}

impl Step {
    pub fn complete(tracks: Vec<Format>, report: SessionReport) -> Self {
        Step::Complete {
            tracks,
            duration_us: 2 * SECOND,
            report,
        }
    }
}

#[derive(Default)]
pub struct ScriptedTranscoder {
    pub steps: Mutex<VecDeque<Step>>,
    pub requests: Mutex<Vec<TranscodeRequest>>,
    pub started: Arc<Notify>,
    pub cancelled: Arc<AtomicUsize>,
    pub monitor: Arc<Monitor>,
}

impl ScriptedTranscoder {
    pub fn script(steps: Vec<Step>, monitor: Arc<Monitor>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            monitor,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<TranscodeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TranscodeFactory for ScriptedTranscoder {
    fn start(
        &self,
        request: TranscodeRequest,
        mut muxer: Box<dyn MuxerSession>,
        sink: EventSink,
    ) -> Box<dyn TranscodeSession> {
        self.monitor.enter();
        let offset = request.timestamp_offset_us;
        self.requests.lock().unwrap().push(request);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::Fail(SpliceError::transcode("unscripted session")));
        let monitor = Arc::clone(&self.monitor);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let (progress, task): (ProgressState, JoinHandle<()>) = match step {
            Step::Complete {
                tracks,
                duration_us,
                report,
            } => (
                ProgressState::NotStarted,
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    let chunk = ChunkInfo {
                        path: match muxer.next_chunk_path() {
                            Ok(path) => path,
                            Err(e) => {
                                monitor.exit();
                                sink.session_failed(report, Some(muxer), e);
                                return;
                            }
                        },
                        start_offset_us: offset,
                        duration_us,
                        tracks: tracks
                            .into_iter()
                            .map(|format| ChunkTrack {
                                sample_count: match format.track_type {
                                    TrackType::Video => 30,
                                    TrackType::Audio => 20,
                                },
                                average_bitrate: Some(1_000),
                                format,
                            })
                            .collect(),
                    };
                    let result = muxer.commit_chunk(chunk).await;
                    monitor.exit();
                    match result {
                        Ok(()) => sink.session_completed(report, muxer),
                        Err(e) => sink.session_failed(report, Some(muxer), e),
                    }
                }),
            ),
            Step::CompleteThenFail { tracks, report } => (
                ProgressState::NotStarted,
                tokio::spawn(async move {
                    let chunk = ChunkInfo {
                        path: PathBuf::from("late.chunk"),
                        start_offset_us: offset,
                        duration_us: SECOND,
                        tracks: tracks
                            .into_iter()
                            .map(|format| ChunkTrack {
                                format,
                                sample_count: 1,
                                average_bitrate: None,
                            })
                            .collect(),
                    };
                    let result = muxer.commit_chunk(chunk).await;
                    monitor.exit();
                    match result {
                        Ok(()) => sink.session_completed(report.clone(), muxer),
                        Err(e) => sink.session_failed(report.clone(), Some(muxer), e),
                    }
                    sink.session_failed(report, None, SpliceError::transcode("late failure"));
                }),
            ),
            Step::Fail(error) => (
                ProgressState::NotStarted,
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    monitor.exit();
                    sink.session_failed(SessionReport::default(), Some(muxer), error);
                }),
            ),
            Step::Hang { progress } => {
                let started = Arc::clone(&self.started);
                let cancelled = Arc::clone(&self.cancelled);
                (
                    ProgressState::Available(progress),
                    tokio::spawn(async move {
                        started.notify_one();
                        let _ = cancel_rx.await;
                        cancelled.fetch_add(1, Ordering::SeqCst);
                        monitor.exit();
                        sink.session_failed(
                            SessionReport::default(),
                            Some(muxer),
                            SpliceError::Cancelled,
                        );
                    }),
                )
            }
        };

        Box::new(FakeSession {
            progress,
            cancel_tx: Some(cancel_tx),
            task: Some(task),
        })
    }
}

struct FakeSession {
    progress: ProgressState,
    cancel_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl TranscodeSession for FakeSession {
    fn progress(&self) -> ProgressState {
        self.progress
    }

    async fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

// --- copier ---

#[derive(Default)]
pub struct RecordingCopier {
    pub fail: bool,
    /// Never finish; for cancellation tests.
    pub hold: bool,
    pub started: Notify,
    pub copies: Mutex<Vec<(PathBuf, PathBuf)>>,
    pub monitor: Arc<Monitor>,
}

#[async_trait::async_trait]
impl FileCopier for RecordingCopier {
    async fn copy(&self, src: &Path, dst: &Path) -> SpliceResult<()> {
        self.monitor.enter();
        self.copies
            .lock()
            .unwrap()
            .push((src.to_path_buf(), dst.to_path_buf()));
        self.started.notify_one();
        if self.hold {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        self.monitor.exit();
        if self.fail {
            Err(SpliceError::copy("disk full"))
        } else {
            Ok(())
        }
    }
}

// --- harness ---

/// Every fake wired into one exporter.
pub struct Harness {
    pub probe: Arc<ScriptedProbe>,
    pub muxers: Arc<MemoryMuxers>,
    pub transcoder: Arc<ScriptedTranscoder>,
    pub copier: Arc<RecordingCopier>,
    pub monitor: Arc<Monitor>,
    pub exporter: Exporter,
}

pub struct HarnessBuilder {
    options: ExportOptions,
    trim: Option<SpliceResult<TrimInfo>>,
    resume: Option<SpliceResult<ResumeMetadata>>,
    hold_probe: bool,
    steps: Vec<Step>,
    copy_fails: bool,
    hold_copy: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            options: ExportOptions::default(),
            trim: None,
            resume: None,
            hold_probe: false,
            steps: Vec::new(),
            copy_fails: false,
            hold_copy: false,
        }
    }

    pub fn options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn trim_optimization(mut self) -> Self {
        self.options.trim_optimization = true;
        self
    }

    pub fn trim_probe(mut self, result: SpliceResult<TrimInfo>) -> Self {
        self.trim = Some(result);
        self
    }

    pub fn resume_probe(mut self, result: SpliceResult<ResumeMetadata>) -> Self {
        self.resume = Some(result);
        self
    }

    pub fn hold_probe(mut self) -> Self {
        self.hold_probe = true;
        self
    }

    pub fn steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn copy_fails(mut self) -> Self {
        self.copy_fails = true;
        self
    }

    pub fn hold_copy(mut self) -> Self {
        self.hold_copy = true;
        self
    }

    pub fn build(self) -> Harness {
        let monitor = Arc::new(Monitor::default());
        let probe = Arc::new(ScriptedProbe {
            trim: Mutex::new(self.trim),
            resume: Mutex::new(self.resume),
            hold: self.hold_probe,
            monitor: Arc::clone(&monitor),
            ..ScriptedProbe::default()
        });
        let muxers = Arc::new(MemoryMuxers::default());
        let transcoder = Arc::new(ScriptedTranscoder::script(self.steps, Arc::clone(&monitor)));
        let copier = Arc::new(RecordingCopier {
            fail: self.copy_fails,
            hold: self.hold_copy,
            monitor: Arc::clone(&monitor),
            ..RecordingCopier::default()
        });
        let collaborators = Collaborators {
            trim_probe: probe.clone(),
            resume_probe: probe.clone(),
            muxers: muxers.clone(),
            transcoder: transcoder.clone(),
            copier: copier.clone(),
        };
        Harness {
            exporter: Exporter::new(collaborators, self.options),
            probe,
            muxers,
            transcoder,
            copier,
            monitor,
        }
    }
}

impl Harness {
    pub fn phases(&self) -> Vec<splice_export_engine::PhaseKind> {
        self.transcoder.requests().iter().map(|r| r.phase).collect()
    }

    pub fn abandoned(&self) -> Vec<PathBuf> {
        self.muxers.abandoned.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<(PathBuf, MuxerMode)> {
        self.muxers.created.lock().unwrap().clone()
    }
}
