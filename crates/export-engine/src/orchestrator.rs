//! Export orchestration.
//!
//! [`Exporter::start`] and [`Exporter::resume`] spawn one actor task per
//! job and return immediately. The actor owns every piece of job state;
//! probes, transcode sessions and the final copy run elsewhere and report
//! through the job's event channel, while the caller talks to it through
//! [`JobControl`] commands.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use splice_common::error::{SpliceError, SpliceResult};
use splice_composition::{Composition, Format};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::copy::FileCopier;
use crate::events::{EventSink, JobEvent};
use crate::muxer::{MuxerFactory, MuxerMode, MuxerSession};
use crate::options::ExportOptions;
use crate::phase::{ActiveOperation, Phase, PhaseKind};
use crate::probe::{ResumeMetadata, ResumeProbe, TrimInfo, TrimProbe};
use crate::progress::{
    blend, ProgressState, RESUME_AUDIO_WEIGHT, RESUME_REMUX_WEIGHT, RESUME_VIDEO_TAIL_WEIGHT,
};
use crate::result::{
    ExportResult, ExportStrategy, OptimizationResult, ResultAccumulator, SessionReport,
};
use crate::transcode::{TranscodeFactory, TranscodeRequest};
use crate::trim::{self, TrimDecision, TrimPlan};

/// External components a job drives.
#[derive(Clone)]
pub struct Collaborators {
    pub trim_probe: Arc<dyn TrimProbe>,
    pub resume_probe: Arc<dyn ResumeProbe>,
    pub muxers: Arc<dyn MuxerFactory>,
    pub transcoder: Arc<dyn TranscodeFactory>,
    pub copier: Arc<dyn FileCopier>,
}

/// Terminal failure of an export job.
#[derive(Debug, thiserror::Error)]
#[error("Export failed: {error}")]
pub struct ExportFailure {
    /// Everything accumulated before the failure.
    pub result: ExportResult,
    #[source]
    pub error: SpliceError,
}

type Outcome = Result<ExportResult, ExportFailure>;

enum Command {
    Progress(oneshot::Sender<ProgressState>),
    Cancel(oneshot::Sender<()>),
}

/// Cloneable control channel to a running job.
#[derive(Clone)]
pub struct JobControl {
    commands: mpsc::UnboundedSender<Command>,
}

impl JobControl {
    /// Current job progress. `NotStarted` once the job has ended.
    pub async fn progress(&self) -> ProgressState {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Progress(tx)).is_err() {
            return ProgressState::NotStarted;
        }
        rx.await.unwrap_or(ProgressState::NotStarted)
    }

    /// Cancel the job. Returns after any running transcode session has shut
    /// down. Has no effect on a job that already ended.
    pub async fn cancel(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Cancel(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Handle to one export job.
pub struct ExportHandle {
    control: JobControl,
    completion: oneshot::Receiver<Outcome>,
}

impl ExportHandle {
    pub fn control(&self) -> JobControl {
        self.control.clone()
    }

    pub async fn progress(&self) -> ProgressState {
        self.control.progress().await
    }

    pub async fn cancel(&self) {
        self.control.cancel().await
    }

    /// Wait for the job's single terminal notification.
    pub async fn wait(self) -> Outcome {
        match self.completion.await {
            Ok(outcome) => outcome,
            Err(_) => {
                let now = Utc::now();
                Err(ExportFailure {
                    result: ResultAccumulator::new(now).finish(now),
                    error: SpliceError::Other(anyhow::anyhow!(
                        "export job ended without reporting an outcome"
                    )),
                })
            }
        }
    }
}

/// Starts export jobs against a fixed set of collaborators.
#[derive(Clone)]
pub struct Exporter {
    collaborators: Collaborators,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(collaborators: Collaborators, options: ExportOptions) -> Self {
        Self {
            collaborators,
            options,
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export `composition` to `output_path`. Must be called from within a
    /// tokio runtime.
    pub fn start(
        &self,
        composition: Composition,
        output_path: impl Into<PathBuf>,
    ) -> SpliceResult<ExportHandle> {
        validate(&composition)?;
        let job = ExportJob::new(
            composition,
            output_path.into(),
            None,
            self.collaborators.clone(),
            self.options.clone(),
        );
        Ok(job.spawn(Entry::Start))
    }

    /// Finish an export that was interrupted while writing
    /// `previous_output_path`, reusing the video it already holds.
    pub fn resume(
        &self,
        composition: Composition,
        output_path: impl Into<PathBuf>,
        previous_output_path: impl Into<PathBuf>,
    ) -> SpliceResult<ExportHandle> {
        validate(&composition)?;
        if !composition.is_single_asset() {
            return Err(SpliceError::unsupported(
                "resume needs a composition with one sequence holding one item",
            ));
        }
        let output_path = output_path.into();
        let previous_output_path = previous_output_path.into();
        if output_path == previous_output_path {
            return Err(SpliceError::unsupported(
                "resume must write to a different path than the previous output",
            ));
        }
        let job = ExportJob::new(
            composition,
            output_path,
            Some(previous_output_path),
            self.collaborators.clone(),
            self.options.clone(),
        );
        Ok(job.spawn(Entry::Resume))
    }
}

/// Discard the staged output of a cancelled session. The session has already
/// stopped, so its final event is queued; everything else pending is dropped
/// with the job.
async fn reclaim_cancelled_muxer(op_id: u64, events: &mut mpsc::UnboundedReceiver<JobEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            JobEvent::SessionEnded {
                op_id: ended,
                muxer: Some(muxer),
                ..
            } if ended == op_id => {
                let path = muxer.output_path().display().to_string();
                muxer.abandon().await;
                tracing::debug!(output = %path, "Discarded staged output of cancelled session");
            }
            _ => {}
        }
    }
}

fn validate(composition: &Composition) -> SpliceResult<()> {
    let problems = composition.validate();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(SpliceError::composition(problems.join("; ")))
    }
}

enum Entry {
    Start,
    Resume,
}

struct ExportJob {
    composition: Composition,
    output_path: PathBuf,
    previous_output_path: Option<PathBuf>,
    collaborators: Collaborators,
    options: ExportOptions,

    phase: Phase,
    active: ActiveOperation,
    accumulator: ResultAccumulator,
    resumed: bool,

    events_tx: mpsc::UnboundedSender<JobEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<JobEvent>>,
    /// Bumped on every fallback; muxer events from older epochs are stale.
    epoch: u64,
    next_op_id: u64,
    completion: Option<oneshot::Sender<Outcome>>,
}

impl ExportJob {
    fn new(
        composition: Composition,
        output_path: PathBuf,
        previous_output_path: Option<PathBuf>,
        collaborators: Collaborators,
        options: ExportOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            composition,
            output_path,
            previous_output_path,
            collaborators,
            options,
            phase: Phase::Idle,
            active: ActiveOperation::None,
            accumulator: ResultAccumulator::new(Utc::now()),
            resumed: false,
            events_tx,
            events_rx: Some(events_rx),
            epoch: 0,
            next_op_id: 0,
            completion: None,
        }
    }

    fn spawn(mut self, entry: Entry) -> ExportHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = oneshot::channel();
        self.completion = Some(completion_tx);

        let span = tracing::info_span!("export", output = %self.output_path.display());
        tokio::spawn(self.run(entry, command_rx).instrument(span));

        ExportHandle {
            control: JobControl {
                commands: command_tx,
            },
            completion: completion_rx,
        }
    }

    async fn run(mut self, entry: Entry, mut commands: mpsc::UnboundedReceiver<Command>) {
        let Some(mut events) = self.events_rx.take() else {
            return;
        };

        match entry {
            Entry::Start => self.begin_start(),
            Entry::Resume => self.begin_resume(),
        }

        let mut commands_open = true;
        while !matches!(self.phase, Phase::Done) {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Progress(reply)) => {
                        let _ = reply.send(self.progress());
                    }
                    Some(Command::Cancel(reply)) => {
                        self.cancel(&mut events).await;
                        let _ = reply.send(());
                    }
                    None => commands_open = false,
                },
            }
        }
    }

    // --- entry points ---

    fn begin_start(&mut self) {
        tracing::info!(
            sequences = self.composition.sequence_count(),
            trim_optimization = self.options.trim_optimization,
            "Starting export"
        );
        if self.options.trim_optimization {
            if self.composition.is_single_asset() {
                self.start_trim_probe();
                return;
            }
            tracing::info!("Trim optimization needs a single media item; running full export");
            self.merge(|acc| acc.with_optimization(OptimizationResult::AbandonedOther));
        }
        let composition = self.composition.clone();
        self.start_full(composition);
    }

    fn begin_resume(&mut self) {
        self.resumed = true;
        let Some(previous) = self.previous_output_path.clone() else {
            self.finish(Err(SpliceError::unsupported("resume without a previous output")));
            return;
        };
        tracing::info!(previous = %previous.display(), "Resuming export");
        self.enter(Phase::ResumeRemuxVideo { boundary_us: None });

        let op_id = self.next_op_id();
        let sink = self.session_sink(op_id);
        let probe = Arc::clone(&self.collaborators.resume_probe);
        let composition = self.composition.clone();
        let task = tokio::spawn(async move {
            let result = probe.probe_resume(&previous, &composition).await;
            sink.resume_probed(result);
        });
        self.set_active(ActiveOperation::Probe { op_id, task });
    }

    // --- phase starts ---

    fn start_full(&mut self, composition: Composition) {
        self.enter(Phase::Full);
        let muxer = match self.collaborators.muxers.create(
            &self.output_path,
            MuxerMode::Default,
            None,
            self.muxer_sink(),
        ) {
            Ok(muxer) => muxer,
            Err(e) => {
                self.finish(Err(e));
                return;
            }
        };
        self.start_session(PhaseKind::Full, composition, 0, false, muxer);
    }

    fn start_trim_probe(&mut self) {
        let Some((uri, trim_start_us)) = self
            .composition
            .first_item()
            .map(|item| (item.source.uri.clone(), item.clip().start_us))
        else {
            let composition = self.composition.clone();
            self.start_full(composition);
            return;
        };
        self.enter(Phase::TrimHead { plan: None });

        let op_id = self.next_op_id();
        let sink = self.session_sink(op_id);
        let probe = Arc::clone(&self.collaborators.trim_probe);
        let task = tokio::spawn(async move {
            let result = probe.probe_trim(&uri, trim_start_us).await;
            sink.trim_probed(result);
        });
        self.set_active(ActiveOperation::Probe { op_id, task });
    }

    fn start_trim_head(&mut self, plan: TrimPlan) -> SpliceResult<()> {
        let composition = plan.head_composition(&self.composition)?;
        tracing::info!(
            trim_start_us = plan.trim_start_us,
            boundary_us = plan.boundary_us,
            "Transcoding trim head"
        );
        let muxer = self.collaborators.muxers.create(
            &self.output_path,
            MuxerMode::Partial,
            Some(plan.video_format.clone()),
            self.muxer_sink(),
        )?;
        self.enter(Phase::TrimHead { plan: Some(plan) });
        self.start_session(PhaseKind::TrimHead, composition, 0, false, muxer);
        Ok(())
    }

    async fn start_trim_tail(&mut self, plan: TrimPlan, mut muxer: Box<dyn MuxerSession>) {
        let prepared = plan
            .tail_composition(&self.composition)
            .and_then(|composition| muxer.switch_to_append().map(|()| composition));
        match prepared {
            Ok(composition) => {
                let offset = plan.tail_offset_us();
                self.enter(Phase::TrimTail { plan });
                self.start_session(PhaseKind::TrimTail, composition, offset, false, muxer);
            }
            Err(e) => {
                let original = self.composition.clone();
                self.fall_back(OptimizationResult::FailedPhaseError, Some(e), Some(muxer), original)
                    .await;
            }
        }
    }

    fn start_resume_remux(
        &mut self,
        boundary_us: u64,
        video_format: Option<Format>,
    ) -> SpliceResult<()> {
        let previous = self.previous_output()?;
        self.enter(Phase::ResumeRemuxVideo {
            boundary_us: Some(boundary_us),
        });
        let muxer = self.collaborators.muxers.create(
            &self.output_path,
            MuxerMode::Partial,
            video_format,
            self.muxer_sink(),
        )?;
        let composition =
            Composition::video_only_from_file(previous.to_string_lossy(), boundary_us);
        self.start_session(PhaseKind::ResumeRemuxVideo, composition, 0, true, muxer);
        Ok(())
    }

    async fn start_resume_video_tail(&mut self, boundary_us: u64, mut muxer: Box<dyn MuxerSession>) {
        let prepared = self
            .composition
            .resume_video_tail(boundary_us)
            .and_then(|composition| muxer.switch_to_append().map(|()| composition));
        match prepared {
            Ok(composition) => {
                self.enter(Phase::ResumeVideoTail { boundary_us });
                self.start_session(
                    PhaseKind::ResumeVideoTail,
                    composition,
                    boundary_us,
                    false,
                    muxer,
                );
            }
            Err(e) => {
                let original = self.composition.clone();
                self.fall_back(OptimizationResult::FailedPhaseError, Some(e), Some(muxer), original)
                    .await;
            }
        }
    }

    fn start_resume_audio(&mut self) -> SpliceResult<()> {
        let previous = self.previous_output()?;
        let composition = self
            .composition
            .audio_transcode_video_transmux(self.output_path.to_string_lossy())?;
        self.enter(Phase::ResumeAudio);
        let muxer =
            self.collaborators
                .muxers
                .create(&previous, MuxerMode::Default, None, self.muxer_sink())?;
        self.start_session(PhaseKind::ResumeAudio, composition, 0, false, muxer);
        Ok(())
    }

    fn start_copy(&mut self) -> SpliceResult<()> {
        let previous = self.previous_output()?;
        self.enter(Phase::ResumeCopy);

        let op_id = self.next_op_id();
        let sink = self.session_sink(op_id);
        let copier = Arc::clone(&self.collaborators.copier);
        let output = self.output_path.clone();
        let task = tokio::spawn(async move {
            let result = copier.copy(&previous, &output).await;
            sink.copied(result);
        });
        self.set_active(ActiveOperation::Copy { op_id, task });
        Ok(())
    }

    fn start_session(
        &mut self,
        phase: PhaseKind,
        composition: Composition,
        timestamp_offset_us: u64,
        force_remux: bool,
        muxer: Box<dyn MuxerSession>,
    ) {
        let op_id = self.next_op_id();
        tracing::debug!(
            %phase,
            op_id,
            timestamp_offset_us,
            force_remux,
            output = %muxer.output_path().display(),
            "Starting transcode session"
        );
        let request = TranscodeRequest {
            phase,
            composition,
            timestamp_offset_us,
            force_remux,
        };
        let sink = self.session_sink(op_id);
        let session = self.collaborators.transcoder.start(request, muxer, sink);
        self.set_active(ActiveOperation::Transcode { op_id, session });
    }

    // --- completions ---

    async fn handle_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::TrackEnded { epoch, track } => {
                if epoch == self.epoch {
                    self.merge(|acc| acc.with_track(track));
                }
            }
            JobEvent::FileEnded { epoch, file } => {
                if epoch == self.epoch {
                    self.merge(|acc| acc.with_file(file));
                }
            }
            JobEvent::TrimProbed { op_id, result } => {
                if self.take_active(op_id) {
                    self.on_trim_probed(result).await;
                }
            }
            JobEvent::ResumeProbed { op_id, result } => {
                if self.take_active(op_id) {
                    self.on_resume_probed(result).await;
                }
            }
            JobEvent::SessionEnded {
                op_id,
                report,
                muxer,
                result,
            } => {
                if self.take_active(op_id) {
                    self.on_session_ended(report, muxer, result).await;
                }
            }
            JobEvent::Copied { op_id, result } => {
                if self.take_active(op_id) {
                    self.on_copied(result);
                }
            }
        }
    }

    async fn on_trim_probed(&mut self, result: SpliceResult<TrimInfo>) {
        let original = self.composition.clone();
        let info = match result {
            Ok(info) => info,
            Err(e) => {
                self.fall_back(OptimizationResult::FailedExtractionFailed, Some(e), None, original)
                    .await;
                return;
            }
        };
        tracing::debug!(next_sync = ?info.next_sync, duration_us = info.duration_us, "Trim probe finished");

        match trim::decide(&self.composition, &info, &self.options) {
            Ok(TrimDecision::Optimize(plan)) => {
                if let Err(e) = self.start_trim_head(plan) {
                    self.fall_back(OptimizationResult::FailedPhaseError, Some(e), None, original)
                        .await;
                }
            }
            Ok(TrimDecision::Abandon {
                reason,
                composition,
            }) => self.fall_back(reason, None, None, composition).await,
            Err(e) => {
                self.fall_back(OptimizationResult::AbandonedOther, Some(e), None, original)
                    .await
            }
        }
    }

    async fn on_resume_probed(&mut self, result: SpliceResult<ResumeMetadata>) {
        let original = self.composition.clone();
        let metadata = match result {
            Ok(metadata) => metadata,
            Err(e) => {
                self.fall_back(OptimizationResult::FailedExtractionFailed, Some(e), None, original)
                    .await;
                return;
            }
        };
        let Some(boundary_us) = metadata.resumable_boundary_us() else {
            self.fall_back(OptimizationResult::AbandonedNothingToResume, None, None, original)
                .await;
            return;
        };
        tracing::info!(boundary_us, "Previous output is resumable");
        if let Err(e) = self.start_resume_remux(boundary_us, metadata.video_format) {
            self.fall_back(OptimizationResult::FailedPhaseError, Some(e), None, original)
                .await;
        }
    }

    async fn on_session_ended(
        &mut self,
        report: SessionReport,
        muxer: Option<Box<dyn MuxerSession>>,
        result: SpliceResult<()>,
    ) {
        let Some(kind) = self.phase.kind() else {
            return;
        };
        self.merge(|acc| acc.with_session(report));
        match result {
            Ok(()) => self.on_phase_completed(kind, muxer).await,
            Err(e) => self.on_phase_failed(kind, e, muxer).await,
        }
    }

    async fn on_phase_completed(&mut self, kind: PhaseKind, muxer: Option<Box<dyn MuxerSession>>) {
        tracing::info!(phase = %kind, "Phase completed");
        let original = self.composition.clone();
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Full => self.finish(Ok(())),
            Phase::TrimHead { plan: Some(plan) } => match muxer {
                Some(muxer) => self.start_trim_tail(plan, muxer).await,
                None => {
                    let error = SpliceError::muxer("trim head session returned no muxer");
                    self.fall_back(OptimizationResult::FailedPhaseError, Some(error), None, original)
                        .await
                }
            },
            Phase::TrimTail { .. } => {
                self.merge(|acc| {
                    acc.with_optimization(OptimizationResult::Succeeded)
                        .with_strategy(ExportStrategy::TrimOptimized)
                });
                self.finish(Ok(()));
            }
            Phase::ResumeRemuxVideo {
                boundary_us: Some(boundary_us),
            } => match muxer {
                Some(muxer) => self.start_resume_video_tail(boundary_us, muxer).await,
                None => {
                    let error = SpliceError::muxer("resume remux session returned no muxer");
                    self.fall_back(OptimizationResult::FailedPhaseError, Some(error), None, original)
                        .await
                }
            },
            Phase::ResumeVideoTail { .. } => {
                drop(muxer);
                if let Err(e) = self.start_resume_audio() {
                    self.fall_back(OptimizationResult::FailedPhaseError, Some(e), None, original)
                        .await;
                }
            }
            Phase::ResumeAudio => {
                drop(muxer);
                if let Err(e) = self.start_copy() {
                    self.finish(Err(e));
                }
            }
            other => {
                tracing::warn!(phase = ?other, "Session completed in a phase without a session");
                self.phase = other;
            }
        }
    }

    async fn on_phase_failed(
        &mut self,
        kind: PhaseKind,
        error: SpliceError,
        muxer: Option<Box<dyn MuxerSession>>,
    ) {
        if !kind.falls_back() {
            tracing::error!(phase = %kind, error = %error, "Phase failed");
            if let Some(muxer) = muxer {
                muxer.abandon().await;
            }
            self.finish(Err(error));
            return;
        }
        let reason = if error.is_append_mismatch() {
            OptimizationResult::FailedFormatMismatch
        } else {
            OptimizationResult::FailedPhaseError
        };
        tracing::warn!(phase = %kind, error = %error, "Optimized phase failed");
        let original = self.composition.clone();
        self.fall_back(reason, Some(error), muxer, original).await;
    }

    fn on_copied(&mut self, result: SpliceResult<()>) {
        match result {
            Ok(()) => {
                self.merge(|acc| {
                    acc.with_optimization(OptimizationResult::Succeeded)
                        .with_strategy(ExportStrategy::Resumed)
                });
                self.finish(Ok(()));
            }
            Err(e) => {
                tracing::error!(error = %e, "Copying the resumed output failed");
                self.finish(Err(e));
            }
        }
    }

    /// Drop all optimization state and export `composition` in one pass.
    async fn fall_back(
        &mut self,
        reason: OptimizationResult,
        error: Option<SpliceError>,
        muxer: Option<Box<dyn MuxerSession>>,
        composition: Composition,
    ) {
        if let Some(muxer) = muxer {
            let path = muxer.output_path().display().to_string();
            muxer.abandon().await;
            tracing::debug!(output = %path, "Abandoned partial output");
        }
        self.epoch += 1;

        let message = error.as_ref().map(ToString::to_string);
        match &error {
            Some(e) => tracing::warn!(
                optimization = %reason,
                error = %e,
                "Optimization abandoned; restarting as a full export"
            ),
            None => tracing::info!(optimization = %reason, "Optimization not applied; running full export"),
        }
        self.merge(|acc| acc.reset_for_fallback(reason, message));
        self.start_full(composition);
    }

    async fn cancel(&mut self, events: &mut mpsc::UnboundedReceiver<JobEvent>) {
        if matches!(self.phase, Phase::Done) {
            return;
        }
        let phase = self.phase.kind();
        let active = std::mem::replace(&mut self.active, ActiveOperation::None);
        tracing::info!(phase = ?phase, active = active.label(), "Cancelling export");
        match active {
            ActiveOperation::Transcode {
                op_id,
                mut session,
            } => {
                session.cancel().await;
                reclaim_cancelled_muxer(op_id, events).await;
            }
            ActiveOperation::Probe { task, .. } | ActiveOperation::Copy { task, .. } => {
                task.abort()
            }
            ActiveOperation::None => {}
        }
        self.finish(Err(SpliceError::Cancelled));
    }

    // --- progress ---

    fn progress(&self) -> ProgressState {
        if self.resumed && !self.options.report_resume_progress {
            return ProgressState::Unavailable;
        }
        let session = match &self.active {
            ActiveOperation::Transcode { session, .. } => Some(session.progress()),
            _ => None,
        };
        match &self.phase {
            Phase::Idle | Phase::Done => ProgressState::NotStarted,
            Phase::Full => session.unwrap_or(ProgressState::NotStarted),
            Phase::TrimHead { plan: None } => ProgressState::Waiting,
            Phase::TrimHead { plan: Some(plan) } => blend(0.0, plan.head_weight(), session),
            Phase::TrimTail { plan } => {
                let head = plan.head_weight();
                blend(head, 1.0 - head, session)
            }
            Phase::ResumeRemuxVideo { .. } => blend(0.0, RESUME_REMUX_WEIGHT, session),
            Phase::ResumeVideoTail { .. } => {
                blend(RESUME_REMUX_WEIGHT, RESUME_VIDEO_TAIL_WEIGHT, session)
            }
            Phase::ResumeAudio => blend(
                RESUME_REMUX_WEIGHT + RESUME_VIDEO_TAIL_WEIGHT,
                RESUME_AUDIO_WEIGHT,
                session,
            ),
            Phase::ResumeCopy => blend(
                RESUME_REMUX_WEIGHT + RESUME_VIDEO_TAIL_WEIGHT + RESUME_AUDIO_WEIGHT,
                0.0,
                None,
            ),
        }
    }

    // --- bookkeeping ---

    fn enter(&mut self, phase: Phase) {
        if let Some(kind) = phase.kind() {
            if self.phase.kind() != Some(kind) {
                tracing::info!(phase = %kind, "Entering phase");
            }
        }
        self.phase = phase;
    }

    fn set_active(&mut self, operation: ActiveOperation) {
        debug_assert!(
            self.active.op_id().is_none(),
            "operation {:?} issued while {} {:?} is outstanding",
            operation.op_id(),
            self.active.label(),
            self.active.op_id()
        );
        self.active = operation;
    }

    /// Clear the active operation if `op_id` is the one outstanding.
    fn take_active(&mut self, op_id: u64) -> bool {
        if self.active.op_id() == Some(op_id) {
            self.active = ActiveOperation::None;
            true
        } else {
            tracing::debug!(
                op_id,
                active = ?self.active.op_id(),
                "Ignoring completion of a stale operation"
            );
            false
        }
    }

    fn merge(&mut self, f: impl FnOnce(ResultAccumulator) -> ResultAccumulator) {
        let started = self.accumulator.snapshot().started_at;
        let current = std::mem::replace(&mut self.accumulator, ResultAccumulator::new(started));
        self.accumulator = f(current);
    }

    fn finish(&mut self, outcome: SpliceResult<()>) {
        self.phase = Phase::Done;
        let started = self.accumulator.snapshot().started_at;
        let accumulator = std::mem::replace(&mut self.accumulator, ResultAccumulator::new(started));
        let result = accumulator.finish(Utc::now());

        let outcome = match outcome {
            Ok(()) => {
                tracing::info!(
                    optimization = %result.optimization,
                    strategy = ?result.strategy,
                    duration_ms = ?result.duration_ms,
                    file_size_bytes = ?result.file_size_bytes,
                    "Export completed"
                );
                Ok(result)
            }
            Err(error) => {
                if error.is_cancelled() {
                    tracing::info!("Export cancelled");
                } else {
                    tracing::error!(error = %error, optimization = %result.optimization, "Export failed");
                }
                Err(ExportFailure { result, error })
            }
        };

        if let Some(tx) = self.completion.take() {
            if tx.send(outcome).is_err() {
                tracing::debug!("Export handle dropped before completion");
            }
        }
    }

    fn next_op_id(&mut self) -> u64 {
        self.next_op_id += 1;
        self.next_op_id
    }

    fn session_sink(&self, op_id: u64) -> EventSink {
        EventSink::new(self.events_tx.clone(), self.epoch, op_id)
    }

    fn muxer_sink(&self) -> EventSink {
        EventSink::new(self.events_tx.clone(), self.epoch, 0)
    }

    fn previous_output(&self) -> SpliceResult<PathBuf> {
        self.previous_output_path
            .clone()
            .ok_or_else(|| SpliceError::unsupported("resume without a previous output"))
    }
}
