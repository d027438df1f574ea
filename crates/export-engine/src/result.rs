//! Cumulative export results.
//!
//! Phases contribute increments to a [`ResultAccumulator`]; each method
//! consumes the accumulator and returns the merged value. The only way to
//! lose contributions is [`ResultAccumulator::reset_for_fallback`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use splice_composition::{ColorInfo, TrackType};

use crate::muxer::{FileEnded, TrackEnded};

/// Outcome of the optimization a job attempted, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationResult {
    NotRequested,
    Succeeded,
    /// The composition is not eligible (more than one sequence or item).
    AbandonedOther,
    AbandonedNoOptimalKeyframe,
    AbandonedKeyframePlacementOptimalForTrim,
    AbandonedTranscodingRequested,
    /// The previous output holds nothing worth keeping.
    AbandonedNothingToResume,
    FailedExtractionFailed,
    FailedFormatMismatch,
    /// An optimized phase's session failed for another reason.
    FailedPhaseError,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            OptimizationResult::NotRequested => "not requested",
            OptimizationResult::Succeeded => "optimized",
            OptimizationResult::AbandonedOther => "abandoned: other",
            OptimizationResult::AbandonedNoOptimalKeyframe => "abandoned: no optimal keyframe",
            OptimizationResult::AbandonedKeyframePlacementOptimalForTrim => {
                "abandoned: keyframe placement optimal for trim"
            }
            OptimizationResult::AbandonedTranscodingRequested => "abandoned: transcoding requested",
            OptimizationResult::AbandonedNothingToResume => "abandoned: nothing to resume",
            OptimizationResult::FailedExtractionFailed => "extraction failed",
            OptimizationResult::FailedFormatMismatch => "format mismatch",
            OptimizationResult::FailedPhaseError => "failed: optimized phase error",
        };
        f.write_str(tag)
    }
}

/// Which path produced the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStrategy {
    Full,
    TrimOptimized,
    Resumed,
}

/// An input a transcode session read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedInput {
    pub uri: String,
    pub audio_decoder: Option<String>,
    pub video_decoder: Option<String>,
}

/// What a completed transcode session reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub processed_inputs: Vec<ProcessedInput>,

    /// Set only when the session ran an audio encoder.
    pub audio_encoder: Option<String>,

    /// Set only when the session ran a video encoder.
    pub video_encoder: Option<String>,
}

/// Cumulative result of an export job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResult {
    pub processed_inputs: Vec<ProcessedInput>,

    pub duration_ms: Option<u64>,
    pub file_size_bytes: Option<u64>,

    pub average_audio_bitrate: Option<u32>,
    pub channel_count: Option<u32>,
    pub sample_rate: Option<u32>,
    pub audio_encoder: Option<String>,

    pub average_video_bitrate: Option<u32>,
    pub color: Option<ColorInfo>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_frame_count: Option<u64>,
    pub video_encoder: Option<String>,

    pub optimization: OptimizationResult,
    pub strategy: ExportStrategy,

    /// Error absorbed while an optimization was abandoned.
    pub optimization_error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExportResult {
    fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            processed_inputs: Vec::new(),
            duration_ms: None,
            file_size_bytes: None,
            average_audio_bitrate: None,
            channel_count: None,
            sample_rate: None,
            audio_encoder: None,
            average_video_bitrate: None,
            color: None,
            width: None,
            height: None,
            video_frame_count: None,
            video_encoder: None,
            optimization: OptimizationResult::NotRequested,
            strategy: ExportStrategy::Full,
            optimization_error: None,
            started_at,
            finished_at: None,
        }
    }
}

/// Builder for an [`ExportResult`], owned by one job.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultAccumulator {
    result: ExportResult,
}

impl ResultAccumulator {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            result: ExportResult::empty(started_at),
        }
    }

    /// Merge a completed session's report.
    pub fn with_session(mut self, report: SessionReport) -> Self {
        self.result.processed_inputs.extend(report.processed_inputs);
        if let Some(encoder) = report.audio_encoder {
            self.result.audio_encoder = Some(encoder);
        }
        if let Some(encoder) = report.video_encoder {
            self.result.video_encoder = Some(encoder);
        }
        self
    }

    pub fn with_track(mut self, track: TrackEnded) -> Self {
        let format = &track.format;
        match track.track_type {
            TrackType::Audio => {
                self.result.average_audio_bitrate =
                    track.average_bitrate.or(self.result.average_audio_bitrate);
                self.result.channel_count = format.channel_count.or(self.result.channel_count);
                self.result.sample_rate = format.sample_rate.or(self.result.sample_rate);
            }
            TrackType::Video => {
                self.result.average_video_bitrate =
                    track.average_bitrate.or(self.result.average_video_bitrate);
                self.result.color = format.color.clone().or(self.result.color.take());
                self.result.width = format.width.or(self.result.width);
                self.result.height = format.height.or(self.result.height);
                self.result.video_frame_count = Some(track.sample_count);
            }
        }
        self
    }

    pub fn with_file(mut self, file: FileEnded) -> Self {
        self.result.duration_ms = Some(file.duration_ms);
        self.result.file_size_bytes = Some(file.file_size_bytes);
        self
    }

    pub fn with_optimization(mut self, optimization: OptimizationResult) -> Self {
        self.result.optimization = optimization;
        self
    }

    pub fn with_strategy(mut self, strategy: ExportStrategy) -> Self {
        self.result.strategy = strategy;
        self
    }

    /// Discard everything contributed so far, keeping only the job start
    /// time, and record why the optimization was abandoned.
    pub fn reset_for_fallback(self, reason: OptimizationResult, error: Option<String>) -> Self {
        let mut reset = Self::new(self.result.started_at);
        reset.result.optimization = reason;
        reset.result.optimization_error = error;
        reset
    }

    pub fn optimization(&self) -> OptimizationResult {
        self.result.optimization
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> &ExportResult {
        &self.result
    }

    pub fn finish(mut self, finished_at: DateTime<Utc>) -> ExportResult {
        self.result.finished_at = Some(finished_at);
        self.result
    }
}
