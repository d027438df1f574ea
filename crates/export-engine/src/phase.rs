//! Export phases and the operation a job is waiting on.

use std::fmt;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::transcode::TranscodeSession;
use crate::trim::TrimPlan;

/// The seven export phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseKind {
    Full,
    TrimHead,
    TrimTail,
    ResumeRemuxVideo,
    ResumeVideoTail,
    ResumeAudio,
    ResumeCopy,
}

impl PhaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Full => "FULL",
            PhaseKind::TrimHead => "TRIM_HEAD",
            PhaseKind::TrimTail => "TRIM_TAIL",
            PhaseKind::ResumeRemuxVideo => "RESUME_REMUX_VIDEO",
            PhaseKind::ResumeVideoTail => "RESUME_VIDEO_TAIL",
            PhaseKind::ResumeAudio => "RESUME_AUDIO",
            PhaseKind::ResumeCopy => "RESUME_COPY",
        }
    }

    /// Failures in this phase fall back to [`PhaseKind::Full`] instead of
    /// ending the job.
    pub fn falls_back(self) -> bool {
        !matches!(self, PhaseKind::Full | PhaseKind::ResumeCopy)
    }

    pub fn is_resume(self) -> bool {
        matches!(
            self,
            PhaseKind::ResumeRemuxVideo
                | PhaseKind::ResumeVideoTail
                | PhaseKind::ResumeAudio
                | PhaseKind::ResumeCopy
        )
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase with the data it carries.
#[derive(Debug)]
pub(crate) enum Phase {
    /// Created, nothing issued yet.
    Idle,
    Full,
    /// `plan` is `None` while the trim probe runs.
    TrimHead {
        plan: Option<TrimPlan>,
    },
    TrimTail {
        plan: TrimPlan,
    },
    /// `boundary_us` is `None` while the resume probe runs.
    ResumeRemuxVideo {
        boundary_us: Option<u64>,
    },
    ResumeVideoTail {
        boundary_us: u64,
    },
    ResumeAudio,
    ResumeCopy,
    /// Terminal notification sent.
    Done,
}

impl Phase {
    pub(crate) fn kind(&self) -> Option<PhaseKind> {
        match self {
            Phase::Idle | Phase::Done => None,
            Phase::Full => Some(PhaseKind::Full),
            Phase::TrimHead { .. } => Some(PhaseKind::TrimHead),
            Phase::TrimTail { .. } => Some(PhaseKind::TrimTail),
            Phase::ResumeRemuxVideo { .. } => Some(PhaseKind::ResumeRemuxVideo),
            Phase::ResumeVideoTail { .. } => Some(PhaseKind::ResumeVideoTail),
            Phase::ResumeAudio => Some(PhaseKind::ResumeAudio),
            Phase::ResumeCopy => Some(PhaseKind::ResumeCopy),
        }
    }
}

/// The single asynchronous operation a job may have outstanding.
pub(crate) enum ActiveOperation {
    None,
    Probe {
        op_id: u64,
        task: JoinHandle<()>,
    },
    Transcode {
        op_id: u64,
        session: Box<dyn TranscodeSession>,
    },
    Copy {
        op_id: u64,
        task: JoinHandle<()>,
    },
}

impl ActiveOperation {
    pub(crate) fn op_id(&self) -> Option<u64> {
        match self {
            ActiveOperation::None => None,
            ActiveOperation::Probe { op_id, .. }
            | ActiveOperation::Transcode { op_id, .. }
            | ActiveOperation::Copy { op_id, .. } => Some(*op_id),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            ActiveOperation::None => "none",
            ActiveOperation::Probe { .. } => "probe",
            ActiveOperation::Transcode { .. } => "transcode",
            ActiveOperation::Copy { .. } => "copy",
        }
    }
}
