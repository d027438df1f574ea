//! Completion events delivered to a job's actor task.
//!
//! Collaborators never touch job state. They report through an
//! [`EventSink`], which tags each event so the actor can drop stale
//! deliveries from operations it has already moved past.

use std::fmt;

use splice_common::error::{SpliceError, SpliceResult};
use tokio::sync::mpsc::UnboundedSender;

use crate::muxer::{FileEnded, MuxerSession, TrackEnded};
use crate::probe::{ResumeMetadata, TrimInfo};
use crate::result::SessionReport;

pub(crate) enum JobEvent {
    TrimProbed {
        op_id: u64,
        result: SpliceResult<TrimInfo>,
    },
    ResumeProbed {
        op_id: u64,
        result: SpliceResult<ResumeMetadata>,
    },
    SessionEnded {
        op_id: u64,
        report: SessionReport,
        muxer: Option<Box<dyn MuxerSession>>,
        result: SpliceResult<()>,
    },
    Copied {
        op_id: u64,
        result: SpliceResult<()>,
    },
    TrackEnded {
        epoch: u64,
        track: TrackEnded,
    },
    FileEnded {
        epoch: u64,
        file: FileEnded,
    },
}

/// Handle through which collaborators report back to a job.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<UnboundedSender<JobEvent>>,
    epoch: u64,
    op_id: u64,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.tx.is_some())
            .field("epoch", &self.epoch)
            .field("op_id", &self.op_id)
            .finish()
    }
}

impl EventSink {
    pub(crate) fn new(tx: UnboundedSender<JobEvent>, epoch: u64, op_id: u64) -> Self {
        Self {
            tx: Some(tx),
            epoch,
            op_id,
        }
    }

    /// A sink that discards everything, for using collaborators outside a job.
    pub fn detached() -> Self {
        Self {
            tx: None,
            epoch: 0,
            op_id: 0,
        }
    }

    pub fn track_ended(&self, track: TrackEnded) {
        self.send(JobEvent::TrackEnded {
            epoch: self.epoch,
            track,
        });
    }

    pub fn file_ended(&self, file: FileEnded) {
        self.send(JobEvent::FileEnded {
            epoch: self.epoch,
            file,
        });
    }

    /// Report a finished transcode session, handing the muxer back.
    pub fn session_completed(&self, report: SessionReport, muxer: Box<dyn MuxerSession>) {
        self.send(JobEvent::SessionEnded {
            op_id: self.op_id,
            report,
            muxer: Some(muxer),
            result: Ok(()),
        });
    }

    pub fn session_failed(
        &self,
        report: SessionReport,
        muxer: Option<Box<dyn MuxerSession>>,
        error: SpliceError,
    ) {
        self.send(JobEvent::SessionEnded {
            op_id: self.op_id,
            report,
            muxer,
            result: Err(error),
        });
    }

    pub(crate) fn trim_probed(&self, result: SpliceResult<TrimInfo>) {
        self.send(JobEvent::TrimProbed {
            op_id: self.op_id,
            result,
        });
    }

    pub(crate) fn resume_probed(&self, result: SpliceResult<ResumeMetadata>) {
        self.send(JobEvent::ResumeProbed {
            op_id: self.op_id,
            result,
        });
    }

    pub(crate) fn copied(&self, result: SpliceResult<()>) {
        self.send(JobEvent::Copied {
            op_id: self.op_id,
            result,
        });
    }

    fn send(&self, event: JobEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!(op_id = self.op_id, "Job finished; dropping late event");
            }
        }
    }
}
