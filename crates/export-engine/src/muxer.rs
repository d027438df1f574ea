//! Muxer collaborator: the single writer of an export's output file.
//!
//! A muxer session is owned by exactly one phase at a time. Transcode
//! sessions write each phase's encoded media into a chunk and commit it; the
//! muxer decides, from its [`MuxerMode`], whether the output is finalized
//! on commit or kept open for a later phase to append to.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use splice_common::error::{SpliceError, SpliceResult};
use splice_composition::{Format, TrackType};

use crate::events::EventSink;

/// How a muxer session treats committed chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuxerMode {
    /// One chunk, finalized on commit.
    Default,
    /// Chunks are staged; the output stays open for appending.
    Partial,
    /// Chunks must match the tracks already written; finalized on commit.
    Append,
}

/// Statistics for one finished output track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEnded {
    pub track_type: TrackType,
    pub format: Format,
    pub sample_count: u64,
    pub average_bitrate: Option<u32>,
}

/// Statistics for the finished output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEnded {
    pub duration_ms: u64,
    pub file_size_bytes: u64,
}

/// One committed unit of encoded media.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkInfo {
    pub path: PathBuf,

    /// Output timeline position of the chunk's first sample.
    pub start_offset_us: u64,

    pub duration_us: u64,
    pub tracks: Vec<ChunkTrack>,
}

/// A track inside a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkTrack {
    pub format: Format,
    pub sample_count: u64,
    pub average_bitrate: Option<u32>,
}

/// An open output file.
#[async_trait::async_trait]
pub trait MuxerSession: Send {
    fn output_path(&self) -> &Path;

    fn mode(&self) -> MuxerMode;

    /// Switch a partial session to append mode. Track indices are kept.
    fn switch_to_append(&mut self) -> SpliceResult<()>;

    /// Format recorded for `track_type`, if a chunk carrying it was committed.
    fn track_format(&self, track_type: TrackType) -> Option<Format>;

    /// Where the current phase should write its chunk.
    fn next_chunk_path(&mut self) -> SpliceResult<PathBuf>;

    /// Commit a written chunk. Fails with [`SpliceError::MuxerAppend`] when a
    /// track does not match the one already recorded for its type.
    async fn commit_chunk(&mut self, chunk: ChunkInfo) -> SpliceResult<()>;

    /// Drop everything staged but not finalized.
    async fn abandon(self: Box<Self>);
}

/// Opens muxer sessions.
pub trait MuxerFactory: Send + Sync {
    /// `expected_video` is the probed video format that committed video must
    /// match, when the output will later be appended to with copied samples.
    fn create(
        &self,
        output: &Path,
        mode: MuxerMode,
        expected_video: Option<Format>,
        sink: EventSink,
    ) -> SpliceResult<Box<dyn MuxerSession>>;
}

/// Per-track bookkeeping shared by muxer implementations: assigns track
/// indices, validates appended formats and aggregates statistics.
#[derive(Debug, Clone, Default)]
pub struct TrackLedger {
    tracks: Vec<LedgerTrack>,
    expected_video: Option<Format>,
    duration_us: u64,
}

#[derive(Debug, Clone)]
struct LedgerTrack {
    format: Format,
    sample_count: u64,
    bitrate_weight: u128,
    bitrate_duration_us: u64,
}

impl TrackLedger {
    pub fn new(expected_video: Option<Format>) -> Self {
        Self {
            tracks: Vec::new(),
            expected_video,
            duration_us: 0,
        }
    }

    /// Validate and record a chunk. Nothing is recorded if any track fails.
    pub fn record(&mut self, chunk: &ChunkInfo, mode: MuxerMode) -> SpliceResult<()> {
        for track in &chunk.tracks {
            self.check(&track.format, mode)?;
        }

        for track in &chunk.tracks {
            let index = match self.index(track.format.track_type) {
                Some(index) => index,
                None => {
                    self.tracks.push(LedgerTrack {
                        format: track.format.clone(),
                        sample_count: 0,
                        bitrate_weight: 0,
                        bitrate_duration_us: 0,
                    });
                    self.tracks.len() - 1
                }
            };
            let entry = &mut self.tracks[index];
            entry.sample_count += track.sample_count;
            if let Some(bitrate) = track.average_bitrate {
                entry.bitrate_weight += bitrate as u128 * chunk.duration_us as u128;
                entry.bitrate_duration_us += chunk.duration_us;
            }
        }
        self.duration_us += chunk.duration_us;
        Ok(())
    }

    fn check(&self, format: &Format, mode: MuxerMode) -> SpliceResult<()> {
        if let Some(index) = self.index(format.track_type) {
            let existing = &self.tracks[index].format;
            if !existing.initialization_data_matches(format) {
                return Err(SpliceError::muxer_append(format!(
                    "{} track {index} was started as {} and cannot take {} samples with different initialization data",
                    format.track_type.as_str(),
                    existing.sample_mime,
                    format.sample_mime
                )));
            }
            return Ok(());
        }

        if mode == MuxerMode::Append {
            return Err(SpliceError::muxer_append(format!(
                "cannot add a new {} track while appending",
                format.track_type.as_str()
            )));
        }

        if format.track_type == TrackType::Video {
            if let Some(expected) = &self.expected_video {
                if !expected.initialization_data_matches(format) {
                    return Err(SpliceError::muxer_append(format!(
                        "video format {} does not match the probed source format {}",
                        format.sample_mime, expected.sample_mime
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn index(&self, track_type: TrackType) -> Option<usize> {
        self.tracks
            .iter()
            .position(|t| t.format.track_type == track_type)
    }

    pub fn format(&self, track_type: TrackType) -> Option<&Format> {
        self.index(track_type).map(|i| &self.tracks[i].format)
    }

    pub fn duration_us(&self) -> u64 {
        self.duration_us
    }

    /// Track statistics in track-index order.
    pub fn track_ended(&self) -> Vec<TrackEnded> {
        self.tracks
            .iter()
            .map(|t| TrackEnded {
                track_type: t.format.track_type,
                format: t.format.clone(),
                sample_count: t.sample_count,
                average_bitrate: (t.bitrate_duration_us > 0)
                    .then(|| (t.bitrate_weight / t.bitrate_duration_us as u128) as u32),
            })
            .collect()
    }
}
