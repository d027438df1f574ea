//! Probe collaborators: what the orchestrator learns about existing media
//! before it commits to an optimized phase.

use std::path::Path;

use splice_common::error::SpliceResult;
use splice_composition::{Composition, Format};

/// First sync sample at or after a requested position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncBoundary {
    /// Sync sample at this presentation time (microseconds).
    At(u64),
    /// Video samples follow the position but none of them is a sync sample.
    EndOfSource,
    /// No video samples at all after the position.
    None,
}

/// Trim probe result for one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimInfo {
    pub next_sync: SyncBoundary,

    /// Duration of the whole source.
    pub duration_us: u64,

    /// Presentation time of the first video sample in the file. A non-zero
    /// value usually means an edit list shifts the video.
    pub first_video_sample_us: Option<u64>,

    /// The first video sample at or after the trim start is a sync sample.
    pub first_sample_after_start_is_sync: bool,

    pub video_format: Option<Format>,
    pub audio_format: Option<Format>,
}

/// What a previous, interrupted export left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeMetadata {
    /// Last sync sample before which the previous output is known intact.
    /// `None` when no usable video was written.
    pub last_sync_us: Option<u64>,

    pub video_format: Option<Format>,
    pub audio_format: Option<Format>,
}

impl TrimInfo {
    pub fn boundary_us(&self) -> Option<u64> {
        match self.next_sync {
            SyncBoundary::At(us) => Some(us),
            SyncBoundary::EndOfSource | SyncBoundary::None => None,
        }
    }
}

impl ResumeMetadata {
    /// Resume boundary, if anything durable was written.
    pub fn resumable_boundary_us(&self) -> Option<u64> {
        self.last_sync_us.filter(|us| *us > 0)
    }
}

/// Finds the sync boundary after a trim start.
#[async_trait::async_trait]
pub trait TrimProbe: Send + Sync {
    async fn probe_trim(&self, uri: &str, trim_start_us: u64) -> SpliceResult<TrimInfo>;
}

/// Inspects the output of an interrupted export.
#[async_trait::async_trait]
pub trait ResumeProbe: Send + Sync {
    async fn probe_resume(
        &self,
        previous_output: &Path,
        composition: &Composition,
    ) -> SpliceResult<ResumeMetadata>;
}
