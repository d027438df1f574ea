//! Transcode collaborator: turns a composition into encoded media inside a
//! muxer session.

use splice_composition::Composition;

use crate::events::EventSink;
use crate::muxer::MuxerSession;
use crate::phase::PhaseKind;
use crate::progress::ProgressState;

/// Work for one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub phase: PhaseKind,
    pub composition: Composition,

    /// Added to every output timestamp so this phase continues where the
    /// previous one stopped.
    pub timestamp_offset_us: u64,

    /// Copy samples for every track, whatever the composition asks for.
    pub force_remux: bool,
}

/// A running transcode.
#[async_trait::async_trait]
pub trait TranscodeSession: Send {
    fn progress(&self) -> ProgressState;

    /// Stop processing. Returns once the session has released the output.
    async fn cancel(&mut self);
}

/// Starts transcode sessions.
pub trait TranscodeFactory: Send + Sync {
    /// Start processing `request` into `muxer`.
    ///
    /// Exactly one of [`EventSink::session_completed`] or
    /// [`EventSink::session_failed`] must follow, including when the session
    /// cannot start at all. The muxer is handed back through that event.
    fn start(
        &self,
        request: TranscodeRequest,
        muxer: Box<dyn MuxerSession>,
        sink: EventSink,
    ) -> Box<dyn TranscodeSession>;
}
