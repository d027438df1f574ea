//! Splice Export Engine
//!
//! Drives one export job from a [`Composition`](splice_composition::Composition)
//! to a single output file. The hard part is not encoding (that is delegated
//! to a transcode collaborator) but deciding which phases to run and
//! recovering when an optimization turns out not to apply.
//!
//! # Phase Graph
//!
//! ```text
//!                 start()                           resume()
//!                    │                                  │
//!        trim opt.?  ├──────────┐                       ▼
//!                    │          ▼              RESUME_REMUX_VIDEO
//!                    │      TRIM_HEAD                   │
//!                    │          │                       ▼
//!                    │          ▼              RESUME_VIDEO_TAIL
//!                    │      TRIM_TAIL                   │
//!                    │          │                       ▼
//!                    ▼          │                 RESUME_AUDIO
//!        ┌────────► FULL        │                       │
//!        │           │          │                       ▼
//!   fallback         ▼          ▼                 RESUME_COPY
//!  (any TRIM_* /  success    success                    │
//!   RESUME_* but                                        ▼
//!   RESUME_COPY)                                     success
//! ```
//!
//! Every phase transition happens on a single actor task per job; probes,
//! transcode sessions and the final copy report back to it through a
//! channel. At most one such operation is outstanding at a time.

pub mod copy;
pub mod events;
pub mod ffmpeg;
pub mod muxer;
pub mod options;
pub mod orchestrator;
pub mod phase;
pub mod probe;
pub mod progress;
pub mod result;
pub mod transcode;
pub mod trim;

pub use copy::FileCopier;
pub use events::EventSink;
pub use muxer::{ChunkInfo, ChunkTrack, FileEnded, MuxerFactory, MuxerMode, MuxerSession, TrackEnded};
pub use options::{ExportOptions, TransformationRequest};
pub use orchestrator::{Collaborators, ExportFailure, ExportHandle, Exporter, JobControl};
pub use phase::PhaseKind;
pub use probe::{ResumeMetadata, ResumeProbe, SyncBoundary, TrimInfo, TrimProbe};
pub use progress::ProgressState;
pub use result::{
    ExportResult, ExportStrategy, OptimizationResult, ProcessedInput, ResultAccumulator,
    SessionReport,
};
pub use transcode::{TranscodeFactory, TranscodeRequest, TranscodeSession};
